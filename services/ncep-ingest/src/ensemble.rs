//! Ensemble precipitation probability.
//!
//! The 0.25° ensemble reports member precipitation as cumulative sums
//! over repeating windows that reset every six hours. For each forecast
//! hour the aggregator deaccumulates each member's three-hour segment,
//! counts the members at or above 0.3 mm and stores the member fraction
//! as a probability in percent.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use column_store::space::{self, space_file_name};
use grib_index::{FetchPolicy, GribIndexClient, Selector};
use models::{Domain, ProductFile, SurfaceVariable, Variable};

use crate::scheduler::SpaceFrameHandle;

/// Segment threshold in millimetres per 3 hours.
const WET_THRESHOLD: f32 = 0.3;

/// Width of one deaccumulation segment in minutes.
const SEGMENT_MINUTES: u32 = 180;

/// Per-member cumulative state: window start, window end (minutes) and
/// the cumulative frame.
struct MemberWindow {
    start: u32,
    end: u32,
    frame: Vec<f32>,
}

/// Aggregates member precipitation into a probability field, one forecast
/// hour at a time.
pub struct EnsembleProbability {
    domain: Domain,
    run: DateTime<Utc>,
    download_dir: PathBuf,
    client: GribIndexClient,
    policy: FetchPolicy,
    skip_existing: bool,
    previous: HashMap<usize, MemberWindow>,
}

impl EnsembleProbability {
    pub fn new(
        domain: Domain,
        run: DateTime<Utc>,
        download_dir: &Path,
        client: GribIndexClient,
        policy: FetchPolicy,
        skip_existing: bool,
    ) -> Self {
        Self {
            domain,
            run,
            download_dir: download_dir.to_path_buf(),
            client,
            policy,
            skip_existing,
            previous: HashMap::new(),
        }
    }

    /// Aggregate every forecast hour of the run.
    pub async fn run(&mut self, hours: &[u32]) -> Result<Vec<SpaceFrameHandle>> {
        let mut handles = Vec::new();
        info!(hours = hours.len(), "Aggregating precipitation probability");
        for &hour in hours {
            if let Some(handle) = self
                .process_hour(hour)
                .await
                .with_context(|| format!("probability at forecast hour {}", hour))?
            {
                handles.push(handle);
            }
        }
        Ok(handles)
    }

    /// One forecast hour: fetch APCP for all members, deaccumulate,
    /// threshold, persist. Hour 0 carries no accumulation.
    async fn process_hour(&mut self, hour: u32) -> Result<Option<SpaceFrameHandle>> {
        if hour == 0 {
            return Ok(None);
        }

        let variable = Variable::Surface(SurfaceVariable::PrecipitationProbability);
        let name = space_file_name(&variable.om_file_name(), hour, None);
        let path = self.download_dir.join(name);
        let handle = SpaceFrameHandle {
            variable,
            member: 0,
            valid_minutes: hour * 60,
            path: path.clone(),
        };

        // Resume: a window-complete hour can be skipped outright; a
        // window-start hour must still be fetched because the next hour
        // deaccumulates against its frames.
        if self.skip_existing && path.exists() && hour % 6 == 0 {
            debug!(hour, "Probability frame already staged, skipping");
            self.previous.clear();
            return Ok(Some(handle));
        }

        let members = self.domain.ensemble_members();
        let grid = self.domain.grid();
        let n = grid.count();
        let mut wet_count = vec![0u32; n];

        for member in 0..members {
            let url = self
                .domain
                .url(self.run, hour, member, ProductFile::Surface);
            let selectors = [Selector {
                tag: member,
                pattern: ":APCP:surface:".to_string(),
            }];
            let messages = self
                .client
                .download_indexed(&url, &selectors, (grid.nx, grid.ny), &self.policy)
                .await?;
            let Some(message) = messages.into_iter().next() else {
                bail!("no APCP message for member {}", member);
            };

            let mut frame = message.frame;
            if grid.is_global {
                frame.shift_180_longitude_and_flip_latitude();
            }
            let cumulative = frame.data;
            let (a, b) = message.attributes.step_range;

            // Chained window: subtract the member's previous cumulative
            // frame. A fresh window is its own segment.
            let previous = self.previous.insert(
                member,
                MemberWindow {
                    start: a,
                    end: b,
                    frame: cumulative.clone(),
                },
            );
            let chained = previous
                .as_ref()
                .is_some_and(|w| w.start == a && w.end + SEGMENT_MINUTES == b);

            for (i, &cum) in cumulative.iter().enumerate() {
                let segment = if chained {
                    cum - previous.as_ref().unwrap().frame[i]
                } else {
                    cum
                };
                if segment >= WET_THRESHOLD {
                    wet_count[i] += 1;
                }
            }
        }

        let probability: Vec<f32> = wet_count
            .iter()
            .map(|&count| (100.0 * count as f32 / members as f32).clamp(0.0, 100.0))
            .collect();

        space::write_space_frame(
            &path,
            &probability,
            variable.scalefactor(),
            self.domain.n_locations_per_chunk(),
        )?;

        debug!(hour, "Probability frame staged");
        Ok(Some(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probability_is_exact_member_fraction() {
        // 2 of 31 members wet: 100 * 2 / 31.
        let members = 31;
        let wet = 2u32;
        let probability = (100.0 * wet as f32 / members as f32).clamp(0.0, 100.0);
        assert!((probability - 6.4516).abs() < 1e-3);
    }

    #[test]
    fn test_probability_bounds() {
        for wet in 0..=31u32 {
            let p = (100.0 * wet as f32 / 31.0).clamp(0.0, 100.0);
            assert!((0.0..=100.0).contains(&p));
        }
    }
}
