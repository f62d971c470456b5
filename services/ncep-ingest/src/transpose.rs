//! Space-to-time transposition.
//!
//! Turns the per-hour space frames of one run into per-location time
//! series in the om store. Variables transpose independently and run
//! concurrently on a bounded worker pool; each worker owns a whole
//! variable so the store's per-variable file writes never interleave.

use std::collections::HashMap;
use std::ops::Range;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{info, instrument};

use column_store::{FpgReader, OmStore, StoreLayout};
use grid::interpolation::{self, InterpolationKind};
use grid::zensun::SolarPosition;
use grid::GridDef;
use models::{Domain, Variable};

use crate::scheduler::SpaceFrameHandle;

/// Transpose every staged variable of one run into the om store.
pub async fn transpose_run(
    domain: Domain,
    run: DateTime<Utc>,
    store: OmStore,
    handles: Vec<SpaceFrameHandle>,
    concurrency: usize,
) -> Result<()> {
    let mut by_variable: HashMap<Variable, Vec<SpaceFrameHandle>> = HashMap::new();
    for handle in handles {
        by_variable.entry(handle.variable).or_default().push(handle);
    }

    info!(
        variables = by_variable.len(),
        concurrency, "Starting transpose"
    );

    let results: Vec<Result<()>> = stream::iter(by_variable)
        .map(|(variable, handles)| {
            let store = store.clone();
            async move {
                tokio::task::spawn_blocking(move || {
                    transpose_variable(domain, run, &store, variable, handles)
                })
                .await
                .context("transpose worker panicked")?
                .with_context(|| format!("transposing {}", variable.om_file_name()))
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    for result in results {
        result?;
    }

    info!("Transpose complete");
    Ok(())
}

/// Transposition parameters of one variable in one run.
struct TransposeJob {
    grid: GridDef,
    members: usize,
    dt_seconds: i64,
    run_index: i64,
    layout: StoreLayout,
    /// Slots of the run start left untouched (hour-0 skip).
    skip: usize,
    kind: InterpolationKind,
    run: DateTime<Utc>,
}

#[instrument(skip_all, fields(variable = %variable.om_file_name()))]
fn transpose_variable(
    domain: Domain,
    run: DateTime<Utc>,
    store: &OmStore,
    variable: Variable,
    handles: Vec<SpaceFrameHandle>,
) -> Result<()> {
    let grid = domain.grid();
    let members = variable.n_members(domain);
    let dt = domain.dt_seconds() as i64;

    let job = TransposeJob {
        layout: StoreLayout {
            om_file_name: variable.om_file_name(),
            scalefactor: variable.scalefactor(),
            n_rows: grid.count() * members,
            n_rows_per_chunk: if members > 1 {
                members
            } else {
                Domain::SCALAR_LOCATIONS_PER_CHUNK
            },
            n_time_per_chunk: domain.n_time_per_chunk(),
        },
        grid,
        members,
        dt_seconds: dt,
        run_index: run.timestamp().div_euclid(dt),
        skip: usize::from(variable.skip_hour_0(domain)),
        kind: variable.interpolation(),
        run,
    };

    transpose_into(store, &job, &handles)?;
    Ok(())
}

/// Fill a (rows × time) cube per location chunk, interpolate scheduled
/// gaps, and splice the contiguous `[run, max step]` range into the store.
fn transpose_into(
    store: &OmStore,
    job: &TransposeJob,
    handles: &[SpaceFrameHandle],
) -> Result<()> {
    // One reader per (step offset, member).
    let mut readers: HashMap<(usize, usize), FpgReader> = HashMap::new();
    let mut n_steps = 0usize;
    for handle in handles {
        let offset = (handle.valid_minutes as i64 * 60 / job.dt_seconds) as usize;
        n_steps = n_steps.max(offset + 1);
        readers.insert((offset, handle.member), handle.open()?);
    }
    if n_steps == 0 {
        return Ok(());
    }

    // Solar interpolation needs the mean zenith cosine per step.
    let positions: Option<Vec<SolarPosition>> = job.kind.needs_solar_factors().then(|| {
        (0..n_steps)
            .map(|s| {
                SolarPosition::new(job.run + chrono::Duration::seconds(s as i64 * job.dt_seconds))
            })
            .collect()
    });

    let members = job.members;
    let run_index = job.run_index;

    let mut producer = |rows: Range<usize>, times: Range<i64>| -> column_store::Result<Vec<f32>> {
        // Assemble the full run range so gap interpolation always sees
        // its bracketing steps, then hand back the requested slice.
        let mut cube = vec![f32::NAN; rows.len() * n_steps];

        for (&(offset, member), reader) in readers.iter_mut() {
            for (r_local, row) in rows.clone().enumerate() {
                if row % members != member {
                    continue;
                }
                let gridpoint = row / members;
                cube[r_local * n_steps + offset] = reader.read_location(gridpoint)?;
            }
        }

        for (r_local, row) in rows.clone().enumerate() {
            let series = &mut cube[r_local * n_steps..(r_local + 1) * n_steps];
            match &positions {
                Some(positions) => {
                    let (lat, lon) = job.grid.coordinates(row / members);
                    let mean_cos_zenith: Vec<f32> = positions
                        .iter()
                        .map(|p| {
                            p.cos_zenith_backwards_mean(lat, lon, job.dt_seconds as u64) as f32
                        })
                        .collect();
                    interpolation::interpolate_solar_gaps(series, &mean_cos_zenith, job.skip);
                }
                None => interpolation::interpolate_gaps(job.kind, series, job.skip),
            }
        }

        let t0 = (times.start - run_index) as usize;
        let len = (times.end - times.start) as usize;
        let mut out = Vec::with_capacity(rows.len() * len);
        for r_local in 0..rows.len() {
            out.extend_from_slice(&cube[r_local * n_steps + t0..r_local * n_steps + t0 + len]);
        }
        Ok(out)
    };

    store.update_from_time_oriented_streaming(
        &job.layout,
        run_index..run_index + n_steps as i64,
        job.skip,
        &mut producer,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use column_store::space::{self, space_file_name};
    use models::SurfaceVariable;

    fn test_run() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn test_job(grid: GridDef, members: usize, skip: usize, kind: InterpolationKind) -> TransposeJob {
        let run = test_run();
        TransposeJob {
            layout: StoreLayout {
                om_file_name: "test_var".to_string(),
                scalefactor: 20.0,
                n_rows: grid.count() * members,
                n_rows_per_chunk: if members > 1 { members } else { 4 },
                n_time_per_chunk: 32,
            },
            grid,
            members,
            dt_seconds: 3600,
            run_index: run.timestamp() / 3600,
            skip,
            kind,
            run,
        }
    }

    fn stage_frame(
        dir: &std::path::Path,
        variable: Variable,
        hour: u32,
        member: usize,
        members: usize,
        values: &[f32],
    ) -> SpaceFrameHandle {
        let suffix = (members > 1).then_some(member as u32);
        let name = space_file_name("test_var", hour, suffix);
        let path = dir.join(name);
        space::write_space_frame(&path, values, 20.0, 4).unwrap();
        SpaceFrameHandle {
            variable,
            member,
            valid_minutes: hour * 60,
            path,
        }
    }

    #[test]
    fn test_transpose_fills_gaps_linearly() {
        let dir = tempfile::tempdir().unwrap();
        let store = OmStore::new(dir.path().join("om"));
        let grid = GridDef::global(10, 4, 1.0);
        let variable = Variable::Surface(SurfaceVariable::CloudCover);
        let n = grid.count();

        let handles = vec![
            stage_frame(dir.path(), variable, 0, 0, 1, &vec![10.0; n]),
            stage_frame(dir.path(), variable, 3, 0, 1, &vec![40.0; n]),
        ];

        let job = test_job(grid, 1, 0, InterpolationKind::Linear);
        transpose_into(&store, &job, &handles).unwrap();

        let series = store
            .read_location(&job.layout, 17, job.run_index..job.run_index + 4)
            .unwrap();
        assert_eq!(series.len(), 4);
        for (i, expected) in [10.0, 20.0, 30.0, 40.0].iter().enumerate() {
            assert!(
                (series[i] - expected).abs() <= 0.5,
                "slot {}: {} vs {}",
                i,
                series[i],
                expected
            );
        }
    }

    #[test]
    fn test_transpose_time_axis_is_contiguous() {
        let dir = tempfile::tempdir().unwrap();
        let store = OmStore::new(dir.path().join("om"));
        let grid = GridDef::global(8, 2, 1.0);
        let variable = Variable::Surface(SurfaceVariable::CloudCover);
        let n = grid.count();

        let handles = vec![
            stage_frame(dir.path(), variable, 0, 0, 1, &vec![1.0; n]),
            stage_frame(dir.path(), variable, 1, 0, 1, &vec![2.0; n]),
            stage_frame(dir.path(), variable, 2, 0, 1, &vec![3.0; n]),
        ];

        let job = test_job(grid, 1, 0, InterpolationKind::Linear);
        transpose_into(&store, &job, &handles).unwrap();

        let series = store
            .read_location(&job.layout, 0, job.run_index..job.run_index + 3)
            .unwrap();
        assert!(series.iter().all(|v| !v.is_nan()));
        assert!(series.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_transpose_skip_first_slot() {
        let dir = tempfile::tempdir().unwrap();
        let store = OmStore::new(dir.path().join("om"));
        let grid = GridDef::global(8, 2, 1.0);
        let variable = Variable::Surface(SurfaceVariable::Precipitation);
        let n = grid.count();

        let handles = vec![
            stage_frame(dir.path(), variable, 1, 0, 1, &vec![0.5; n]),
            stage_frame(dir.path(), variable, 2, 0, 1, &vec![0.7; n]),
        ];

        let job = test_job(grid, 1, 1, InterpolationKind::Linear);
        transpose_into(&store, &job, &handles).unwrap();

        let series = store
            .read_location(&job.layout, 3, job.run_index..job.run_index + 3)
            .unwrap();
        assert!(series[0].is_nan());
        assert!(!series[1].is_nan());
        assert!(!series[2].is_nan());
    }

    #[test]
    fn test_transpose_ensemble_member_fan() {
        let dir = tempfile::tempdir().unwrap();
        let store = OmStore::new(dir.path().join("om"));
        let grid = GridDef::global(6, 2, 1.0);
        let variable = Variable::Surface(SurfaceVariable::CloudCover);
        let members = 3;
        let n = grid.count();

        let mut handles = Vec::new();
        for member in 0..members {
            for hour in [0u32, 1] {
                handles.push(stage_frame(
                    dir.path(),
                    variable,
                    hour,
                    member,
                    members,
                    &vec![member as f32 * 10.0 + hour as f32; n],
                ));
            }
        }

        let job = test_job(grid, members, 0, InterpolationKind::Linear);
        transpose_into(&store, &job, &handles).unwrap();

        // Row = gridpoint * members + member.
        for member in 0..members {
            let row = 4 * members + member;
            let series = store
                .read_location(&job.layout, row, job.run_index..job.run_index + 2)
                .unwrap();
            assert!((series[0] - member as f32 * 10.0).abs() <= 0.5);
            assert!((series[1] - (member as f32 * 10.0 + 1.0)).abs() <= 0.5);
        }
    }

    /// For ensemble variables a time slot is either NaN for every member
    /// or finite for every member.
    #[test]
    fn test_transpose_ensemble_chunk_completeness() {
        let dir = tempfile::tempdir().unwrap();
        let store = OmStore::new(dir.path().join("om"));
        let grid = GridDef::global(6, 2, 1.0);
        let variable = Variable::Surface(SurfaceVariable::CloudCover);
        let members = 3;
        let n = grid.count();

        let mut handles = Vec::new();
        for member in 0..members {
            // Steps 0 and 2 staged, step 1 interpolated, steps beyond 2
            // absent for every member alike.
            for hour in [0u32, 2] {
                handles.push(stage_frame(
                    dir.path(),
                    variable,
                    hour,
                    member,
                    members,
                    &vec![5.0; n],
                ));
            }
        }

        let job = test_job(grid, members, 0, InterpolationKind::Linear);
        transpose_into(&store, &job, &handles).unwrap();

        for slot in 0..3i64 {
            let finite: Vec<bool> = (0..members)
                .map(|m| {
                    let series = store
                        .read_location(
                            &job.layout,
                            2 * members + m,
                            job.run_index + slot..job.run_index + slot + 1,
                        )
                        .unwrap();
                    !series[0].is_nan()
                })
                .collect();
            assert!(
                finite.iter().all(|&f| f) || finite.iter().all(|&f| !f),
                "slot {}: {:?}",
                slot,
                finite
            );
        }
    }
}
