//! Surface elevation bootstrap.
//!
//! Written once per domain from the analysis step of a run: model
//! orography combined with the land-sea mask. Missing either record is
//! fatal, since the file gates location queries for the whole domain.

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;

use column_store::elevation::write_surface_elevation;
use grib_index::{FetchPolicy, GribIndexClient, Selector};
use models::{Domain, ProductFile};

/// File name of the per-domain elevation file.
pub const SURFACE_ELEVATION_FILE: &str = "surface_elevation.om";

/// Download orography and landmask from the run's analysis step and
/// write the elevation file, unless it already exists.
///
/// Ensemble subsets do not carry the fields; those domains are skipped.
pub async fn ensure_surface_elevation(
    domain: Domain,
    run: DateTime<Utc>,
    store_root: &Path,
    client: &GribIndexClient,
    policy: &FetchPolicy,
) -> Result<()> {
    let path = store_root.join(SURFACE_ELEVATION_FILE);
    if path.exists() {
        return Ok(());
    }
    if domain.ensemble_members() > 1 {
        return Ok(());
    }

    let url = domain.url(run, 0, 0, ProductFile::Surface);
    let grid = domain.grid();
    let selectors = [
        Selector {
            tag: "height",
            pattern: ":HGT:surface:".to_string(),
        },
        Selector {
            tag: "landmask",
            pattern: ":LAND:surface:".to_string(),
        },
    ];

    let messages = client
        .download_indexed(&url, &selectors, (grid.nx, grid.ny), policy)
        .await
        .context("downloading surface elevation")?;

    let mut height = None;
    let mut landmask = None;
    for message in messages {
        let mut frame = message.frame;
        if grid.is_global {
            frame.shift_180_longitude_and_flip_latitude();
        }
        match message.tag {
            "height" => height = Some(frame),
            "landmask" => landmask = Some(frame),
            _ => {}
        }
    }

    let (Some(height), Some(landmask)) = (height, landmask) else {
        bail!("elevation download for {} is missing height or landmask", domain);
    };

    write_surface_elevation(&path, &height, &landmask)?;
    info!(path = %path.display(), "Surface elevation written");
    Ok(())
}
