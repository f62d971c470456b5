//! Semantic pipeline.
//!
//! Every decoded frame passes through a fixed sequence of normalisation
//! steps between decode and persist: projection normalisation,
//! deaveraging of running means, humidity and vertical-velocity
//! conversions, solar-flux averaging, unit rescale and the per-pass
//! prerequisite cache.
//!
//! Deaverage state lives for one run per (variable, member). The
//! prerequisite cache lives for one (hour, member) pass; the scheduler
//! creates a fresh one per pass.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};

use grib_index::{MessageAttributes, StepType};
use grid::{meteorology, zensun, Array2D};
use models::{Domain, PressureVariable, PressureVariableKind, SurfaceVariable, Variable};

/// Frames cached within one (hour, member) pass for downstream
/// conversions, stored post-rescale (°C, hPa).
#[derive(Debug, Default)]
pub struct PassCache {
    frames: HashMap<Variable, Vec<f32>>,
}

impl PassCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, variable: &Variable) -> Option<&Vec<f32>> {
        self.frames.get(variable)
    }
}

/// Running-mean state per (variable, member): step range and cumulative
/// frame of the previously seen average.
struct DeaverageState {
    start: u32,
    end: u32,
    frame: Vec<f32>,
}

/// Stateful per-run semantic pipeline.
pub struct SemanticPipeline {
    domain: Domain,
    run: DateTime<Utc>,
    deaverage: HashMap<(Variable, usize), DeaverageState>,
}

impl SemanticPipeline {
    pub fn new(domain: Domain, run: DateTime<Utc>) -> Self {
        Self {
            domain,
            run,
            deaverage: HashMap::new(),
        }
    }

    /// Run one decoded frame through the pipeline.
    ///
    /// Returns the values to persist, or `None` for cache-only
    /// prerequisites that are never written.
    pub fn process(
        &mut self,
        variable: Variable,
        member: usize,
        mut frame: Array2D,
        attrs: &MessageAttributes,
        cache: &mut PassCache,
    ) -> Result<Option<Vec<f32>>> {
        // 1. Projection normalisation.
        if self.domain.grid().is_global {
            frame.shift_180_longitude_and_flip_latitude();
        }
        let mut data = frame.data;

        // 2. Running means become per-interval means.
        if attrs.step_type == StepType::Avg {
            self.deaverage(variable, member, attrs.step_range, &mut data);
        }

        // 3. Accumulated fields are a catalogue mis-declaration.
        if attrs.step_type == StepType::Acc {
            bail!(
                "unsupported accumulated stepType for {} ({})",
                variable.om_file_name(),
                attrs.short_name
            );
        }

        // 4. Specific to relative humidity.
        if variable == Variable::Surface(SurfaceVariable::RelativeHumidity2m)
            && attrs.short_name == "SPFH"
        {
            self.specific_to_relative_humidity(&mut data, cache)?;
        }

        // 5. Pressure vertical velocity to geometric.
        if let Variable::Pressure(p) = variable {
            if p.kind == PressureVariableKind::VerticalVelocity && attrs.short_name == "VVEL" {
                self.omega_to_w(p, &mut data, cache)?;
            }
        }

        // 6. Instantaneous solar flux to backward averages.
        if self.wants_solar_averaging(variable) && attrs.step_type == StepType::Instant {
            self.average_solar_flux(&mut data, attrs.step_minutes());
        }

        // 7. Unit rescale.
        if let Some((a, b)) = variable.multiply_add(self.domain) {
            for x in &mut data {
                *x = *x * a + b;
            }
        }

        // 8. Cache update for downstream conversions in this pass.
        if variable.keep_in_memory(self.domain) {
            cache.frames.insert(variable, data.clone());
        }

        // 9. Cache-only frames are not persisted.
        if !variable.written_to_disk(self.domain) {
            return Ok(None);
        }

        Ok(Some(data))
    }

    /// Deaverage state machine.
    ///
    /// A fresh section (no prior, or the prior ended where this range
    /// starts) is emitted as-is. A continuation of the same section is
    /// replaced by the mean over the new sub-interval.
    fn deaverage(&mut self, variable: Variable, member: usize, range: (u32, u32), data: &mut [f32]) {
        let (a, b) = range;
        let prior = self.deaverage.insert(
            (variable, member),
            DeaverageState {
                start: a,
                end: b,
                frame: data.to_vec(),
            },
        );

        if let Some(prior) = prior {
            let p = prior.end;
            if p != a && p > a {
                let cur_weight = (b - a) as f32;
                let prev_weight = (p - a) as f32;
                let interval = (b - p) as f32;
                for (x, prev) in data.iter_mut().zip(&prior.frame) {
                    *x = (*x * cur_weight - prev * prev_weight) / interval;
                }
            }
        }
    }

    fn specific_to_relative_humidity(
        &self,
        data: &mut [f32],
        cache: &PassCache,
    ) -> Result<()> {
        let temperature = cache
            .get(&Variable::Surface(SurfaceVariable::Temperature2m))
            .context("relative_humidity_2m requires cached temperature_2m")?;
        let pressure = cache
            .get(&Variable::Surface(SurfaceVariable::PressureMsl))
            .context("relative_humidity_2m requires cached pressure_msl")?;

        for ((q, &t_c), &p_hpa) in data.iter_mut().zip(temperature).zip(pressure) {
            // kg/kg to g/kg, then Magnus-based conversion.
            let q_gkg = *q * 1000.0;
            *q = meteorology::specific_to_relative_humidity(q_gkg, t_c, p_hpa);
        }
        Ok(())
    }

    fn omega_to_w(
        &self,
        level: PressureVariable,
        data: &mut [f32],
        cache: &PassCache,
    ) -> Result<()> {
        let temperature = cache
            .get(&Variable::Pressure(PressureVariable {
                kind: PressureVariableKind::Temperature,
                level: level.level,
            }))
            .with_context(|| {
                format!(
                    "vertical_velocity at {} hPa requires cached temperature",
                    level.level
                )
            })?;

        let pressure_pa = level.level as f32 * 100.0;
        for (omega, &t_c) in data.iter_mut().zip(temperature) {
            *omega = meteorology::omega_to_vertical_velocity(*omega, t_c + 273.15, pressure_pa);
        }
        Ok(())
    }

    /// Domains and variables whose radiation arrives instantaneous.
    fn wants_solar_averaging(&self, variable: Variable) -> bool {
        matches!(
            (self.domain, variable),
            (
                Domain::HrrrConus,
                Variable::Surface(
                    SurfaceVariable::ShortwaveRadiation | SurfaceVariable::DiffuseRadiation
                ),
            ) | (
                Domain::HrrrConus15min,
                Variable::Surface(SurfaceVariable::DiffuseRadiation),
            )
        )
    }

    /// Scale instantaneous radiation by the interval-mean to instant
    /// zenith-cosine ratio. Cells with a factor below 0.05 are left
    /// unchanged to avoid blowing up around sunrise and sunset.
    fn average_solar_flux(&self, data: &mut [f32], step_minutes: u32) {
        let valid = self.run + chrono::Duration::minutes(step_minutes as i64);
        let factors = zensun::backwards_factors(
            &self.domain.grid(),
            valid,
            self.domain.dt_seconds(),
        );
        for (x, factor) in data.iter_mut().zip(factors) {
            if factor >= 0.05 && factor.is_finite() {
                *x *= factor;
            }
        }
    }
}
