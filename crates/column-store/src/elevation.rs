//! Surface elevation file.
//!
//! Written once per domain from the model's orography and land-sea mask.
//! Sea cells carry the sentinel value -999 so the query layer can
//! distinguish ocean from low-lying land.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use grid::Array2D;

use crate::codec;
use crate::error::{Result, StoreError};

const MAGIC: &[u8; 4] = b"ELEV";

/// Elevation is quantised to whole meters.
const SCALEFACTOR: f32 = 1.0;

/// Sentinel stored for sea cells.
pub const SEA_LEVEL_SENTINEL: f32 = -999.0;

/// Combine orography and land-sea mask and write the elevation file.
///
/// Cells where `landmask` is below 0.5 are stored as [`SEA_LEVEL_SENTINEL`].
pub fn write_surface_elevation(
    path: &Path,
    elevation: &Array2D,
    landmask: &Array2D,
) -> Result<()> {
    if elevation.data.len() != landmask.data.len() {
        return Err(StoreError::ShapeMismatch {
            expected: elevation.data.len(),
            actual: landmask.data.len(),
        });
    }

    let merged: Vec<f32> = elevation
        .data
        .iter()
        .zip(&landmask.data)
        .map(|(&height, &land)| if land < 0.5 { SEA_LEVEL_SENTINEL } else { height })
        .collect();
    let block = codec::compress_chunk(&merged, SCALEFACTOR)?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("om.partial");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(MAGIC)?;
        file.write_all(&(elevation.nx as u64).to_le_bytes())?;
        file.write_all(&(elevation.ny as u64).to_le_bytes())?;
        file.write_all(&(block.len() as u64).to_le_bytes())?;
        file.write_all(&block)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;

    Ok(())
}

/// Read an elevation file back as a 2-D array.
pub fn read_surface_elevation(path: &Path) -> Result<Array2D> {
    let mut file = File::open(path)?;
    let corrupt = |reason: &str| StoreError::CorruptFile {
        path: path.display().to_string(),
        reason: reason.to_string(),
    };

    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(corrupt("bad magic"));
    }

    let mut buf = [0u8; 8];
    file.read_exact(&mut buf)?;
    let nx = u64::from_le_bytes(buf) as usize;
    file.read_exact(&mut buf)?;
    let ny = u64::from_le_bytes(buf) as usize;
    file.read_exact(&mut buf)?;
    let len = u64::from_le_bytes(buf) as usize;

    let mut block = vec![0u8; len];
    file.read_exact(&mut block)?;
    let data = codec::decompress_chunk(&block, SCALEFACTOR, nx * ny)?;

    Ok(Array2D::new(data, nx, ny))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sea_cells_get_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("surface_elevation.om");

        let elevation = Array2D::new(vec![120.0, 3.0, 850.0, 0.0], 2, 2);
        let landmask = Array2D::new(vec![1.0, 0.0, 1.0, 0.0], 2, 2);

        write_surface_elevation(&path, &elevation, &landmask).unwrap();
        let restored = read_surface_elevation(&path).unwrap();

        assert_eq!(restored.nx, 2);
        assert_eq!(restored.ny, 2);
        assert_eq!(restored.data, vec![120.0, SEA_LEVEL_SENTINEL, 850.0, SEA_LEVEL_SENTINEL]);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("surface_elevation.om");

        let elevation = Array2D::new(vec![1.0; 4], 2, 2);
        let landmask = Array2D::new(vec![1.0; 6], 3, 2);
        assert!(write_surface_elevation(&path, &elevation, &landmask).is_err());
    }
}
