//! Download scheduler.
//!
//! Drives one forecast run: forecast hours outer, members middle,
//! variables inner. Variables are fetched in catalogue order so that
//! pipeline prerequisites (temperature, pressure) are cached before their
//! consumers within one (hour, member) pass.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Timelike, Utc};
use tracing::{debug, info, instrument};

use column_store::space::{self, space_file_name};
use column_store::FpgReader;
use grib_index::{FetchPolicy, GribIndexClient, Selector};
use models::{catalogue, Domain, ProductFile, Variable, VariableFilter};

use crate::pipeline::{PassCache, SemanticPipeline};

/// A staged space frame on disk: one (variable, step, member).
#[derive(Debug, Clone)]
pub struct SpaceFrameHandle {
    pub variable: Variable,
    pub member: usize,
    /// Valid-time offset from the run in minutes.
    pub valid_minutes: u32,
    pub path: PathBuf,
}

impl SpaceFrameHandle {
    /// Open the staged frame for chunked reading.
    pub fn open(&self) -> column_store::Result<FpgReader> {
        FpgReader::open(&self.path)
    }
}

/// Per-run scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub domain: Domain,
    pub run: DateTime<Utc>,
    pub download_dir: PathBuf,
    pub filter: VariableFilter,
    pub skip_existing: bool,
    pub max_forecast_hour: Option<u32>,
    pub second_flush: bool,
}

/// Drives the download loop of one run and stages space frames.
pub struct Scheduler {
    config: SchedulerConfig,
    client: GribIndexClient,
    policy: FetchPolicy,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, client: GribIndexClient, policy: FetchPolicy) -> Self {
        Self {
            config,
            client,
            policy,
        }
    }

    /// Download, normalise and stage every scheduled frame of the run.
    #[instrument(skip(self), fields(domain = %self.config.domain, run = %self.config.run))]
    pub async fn run(&self) -> Result<Vec<SpaceFrameHandle>> {
        let domain = self.config.domain;
        let variables = catalogue::download_variables(domain, &self.config.filter);
        if variables.is_empty() {
            bail!("no variables selected for {}", domain);
        }

        let mut hours = domain.forecast_hours(self.config.run.hour(), self.config.second_flush);
        if let Some(max) = self.config.max_forecast_hour {
            hours.retain(|&h| h <= max);
        }

        tokio::fs::create_dir_all(&self.config.download_dir).await?;

        info!(
            hours = hours.len(),
            members = domain.ensemble_members(),
            variables = variables.len(),
            "Starting download cycle"
        );

        let mut pipeline = SemanticPipeline::new(domain, self.config.run);
        let mut handles = Vec::new();

        for &hour in &hours {
            for member in 0..domain.ensemble_members() {
                self.process_hour_member(&mut pipeline, hour, member, &variables, &mut handles)
                    .await
                    .with_context(|| format!("forecast hour {} member {}", hour, member))?;
            }
        }

        info!(frames = handles.len(), "Download cycle complete");
        Ok(handles)
    }

    /// One (hour, member) pass: resume check, indexed download per
    /// product file, semantic pipeline, space-frame write.
    async fn process_hour_member(
        &self,
        pipeline: &mut SemanticPipeline,
        hour: u32,
        member: usize,
        variables: &[Variable],
        handles: &mut Vec<SpaceFrameHandle>,
    ) -> Result<()> {
        let domain = self.config.domain;
        let steps = self.timesteps(hour);
        let member_suffix = (domain.ensemble_members() > 1).then_some(member as u32);

        let scheduled: Vec<Variable> = variables
            .iter()
            .filter(|v| !(hour == 0 && v.skip_hour_0(domain)))
            .copied()
            .collect();

        let staged_paths = |variable: &Variable| -> Vec<(u32, PathBuf)> {
            steps
                .iter()
                .map(|&(key, minutes)| {
                    let name = space_file_name(&variable.om_file_name(), key, member_suffix);
                    (minutes, self.config.download_dir.join(name))
                })
                .collect()
        };

        // Resume: variables whose space files all exist are registered
        // and not downloaded again. Cache-only prerequisites have no
        // files and are always fetched.
        let mut pending: Vec<Variable> = scheduled
            .iter()
            .filter(|v| {
                !v.written_to_disk(domain)
                    || !self.config.skip_existing
                    || !staged_paths(v).iter().all(|(_, p)| p.exists())
            })
            .copied()
            .collect();

        // A conversion that still runs needs its cached inputs even when
        // their own space files survive from an earlier attempt.
        let required: Vec<Variable> = pending
            .iter()
            .flat_map(|&v| catalogue::prerequisites(v, domain))
            .collect();
        for prerequisite in required {
            if scheduled.contains(&prerequisite) && !pending.contains(&prerequisite) {
                pending.push(prerequisite);
            }
        }

        for &variable in &scheduled {
            if pending.contains(&variable) || !variable.written_to_disk(domain) {
                continue;
            }
            debug!(variable = %variable.om_file_name(), hour, member, "Already staged, skipping");
            for (minutes, path) in staged_paths(&variable) {
                handles.push(SpaceFrameHandle {
                    variable,
                    member,
                    valid_minutes: minutes,
                    path,
                });
            }
        }

        if pending.is_empty() {
            return Ok(());
        }

        // Prerequisite resolution relies on catalogue order.
        let rank: HashMap<Variable, usize> = variables
            .iter()
            .enumerate()
            .map(|(i, &v)| (v, i))
            .collect();

        // One prerequisite cache per (hour, member) pass.
        let mut cache = PassCache::new();

        for file in [ProductFile::Surface, ProductFile::Pressure] {
            let selectors: Vec<Selector<Variable>> = pending
                .iter()
                .filter(|v| v.product_file() == file)
                .map(|&v| Selector {
                    tag: v,
                    pattern: v
                        .grib_index_name(domain)
                        .expect("catalogue only lists carried variables"),
                })
                .collect();
            if selectors.is_empty() {
                continue;
            }

            let url = domain.url(self.config.run, hour, member, file);
            let grid = domain.grid();
            let mut messages = self
                .client
                .download_indexed(&url, &selectors, (grid.nx, grid.ny), &self.policy)
                .await
                .with_context(|| format!("downloading {}", url))?;

            // The index may order records arbitrarily; restore catalogue
            // order (stable, so sub-hourly steps stay in index order).
            messages.sort_by_key(|m| rank[&m.tag]);

            for message in messages {
                let variable = message.tag;
                let attrs = message.attributes;
                let step_minutes = if domain.is_sub_hourly() {
                    attrs.step_minutes()
                } else {
                    hour * 60
                };

                let Some(data) = pipeline.process(variable, member, message.frame, &attrs, &mut cache)?
                else {
                    continue;
                };

                let key = if domain.is_sub_hourly() {
                    step_minutes / 15
                } else {
                    hour
                };
                let name = space_file_name(&variable.om_file_name(), key, member_suffix);
                let path = self.config.download_dir.join(name);
                space::write_space_frame(
                    &path,
                    &data,
                    variable.scalefactor(),
                    domain.n_locations_per_chunk(),
                )?;

                handles.push(SpaceFrameHandle {
                    variable,
                    member,
                    valid_minutes: step_minutes,
                    path,
                });
            }
        }

        Ok(())
    }

    /// File keys and valid-time offsets of one forecast hour.
    ///
    /// Sub-hourly products carry four 15-minute steps per hour, except
    /// hour 0, which is a single instantaneous step.
    fn timesteps(&self, hour: u32) -> Vec<(u32, u32)> {
        if !self.config.domain.is_sub_hourly() {
            return vec![(hour, hour * 60)];
        }
        if hour == 0 {
            return vec![(0, 0)];
        }
        (1..=4)
            .map(|k| {
                let minutes = (hour - 1) * 60 + k * 15;
                (minutes / 15, minutes)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(domain: Domain) -> Scheduler {
        let config = SchedulerConfig {
            domain,
            run: Utc::now(),
            download_dir: PathBuf::from("/tmp/unused"),
            filter: VariableFilter::default(),
            skip_existing: false,
            max_forecast_hour: None,
            second_flush: false,
        };
        let policy = FetchPolicy {
            deadline: Utc::now(),
            wait_after_last_modified: std::time::Duration::from_secs(1),
            retry_interval: std::time::Duration::from_secs(1),
        };
        Scheduler::new(config, GribIndexClient::new().unwrap(), policy)
    }

    #[test]
    fn test_hourly_timesteps() {
        let s = scheduler(Domain::Gfs025);
        assert_eq!(s.timesteps(0), vec![(0, 0)]);
        assert_eq!(s.timesteps(6), vec![(6, 360)]);
    }

    #[test]
    fn test_sub_hourly_timesteps() {
        let s = scheduler(Domain::HrrrConus15min);
        assert_eq!(s.timesteps(0), vec![(0, 0)]);
        // Hour 3 covers minutes 135..180: keys 9 through 12.
        assert_eq!(
            s.timesteps(3),
            vec![(9, 135), (10, 150), (11, 165), (12, 180)]
        );
    }
}
