//! Ordered download lists.
//!
//! The semantic pipeline resolves prerequisites (cached temperature and
//! pressure) within one (hour, member) pass, so the selector list must be
//! emitted in dependency order: plain fields first, converted fields after
//! the fields they consume.

use crate::domain::Domain;
use crate::variable::{
    PressureVariable, PressureVariableKind, SurfaceVariable, Variable,
};

/// CLI-driven restriction of the variable set.
#[derive(Debug, Clone, Default)]
pub struct VariableFilter {
    /// Only these variables (om file names, or pressure base names to
    /// select all levels). `None` selects everything.
    pub only: Option<Vec<String>>,
    /// Drop pressure-level variables.
    pub surface_only: bool,
    /// Drop surface variables.
    pub upper_only: bool,
}

impl VariableFilter {
    fn selects(&self, variable: &Variable) -> bool {
        match variable {
            Variable::Surface(_) if self.upper_only => return false,
            Variable::Pressure(_) if self.surface_only => return false,
            _ => {}
        }
        match &self.only {
            None => true,
            Some(names) => names.iter().any(|n| {
                *n == variable.om_file_name()
                    || matches!(variable, Variable::Pressure(p) if p.kind.base_name() == n)
            }),
        }
    }
}

/// The ordered variable list to download for one run.
///
/// Variables the domain does not carry are dropped; prerequisites of
/// selected variables are pulled in even when the filter excludes them,
/// and everything is returned in dependency order.
pub fn download_variables(domain: Domain, filter: &VariableFilter) -> Vec<Variable> {
    let candidates = ordered_candidates(domain);

    let selected: Vec<Variable> = candidates
        .iter()
        .filter(|v| filter.selects(v))
        .copied()
        .collect();

    let mut needed: Vec<Variable> = Vec::new();
    for variable in &selected {
        for prerequisite in prerequisites(*variable, domain) {
            if !needed.contains(&prerequisite) {
                needed.push(prerequisite);
            }
        }
        if !needed.contains(variable) {
            needed.push(*variable);
        }
    }

    candidates
        .into_iter()
        .filter(|v| needed.contains(v))
        .collect()
}

/// Variables another variable's conversion reads from the pass cache.
pub fn prerequisites(variable: Variable, domain: Domain) -> Vec<Variable> {
    match (variable, domain) {
        // Specific-to-relative humidity needs temperature and pressure.
        (Variable::Surface(SurfaceVariable::RelativeHumidity2m), Domain::Gfs013) => vec![
            Variable::Surface(SurfaceVariable::Temperature2m),
            Variable::Surface(SurfaceVariable::PressureMsl),
        ],
        // ω to w needs temperature at the same level.
        (Variable::Pressure(p), Domain::HrrrConus | Domain::Gfs05Ens)
            if p.kind == PressureVariableKind::VerticalVelocity =>
        {
            vec![Variable::Pressure(PressureVariable {
                kind: PressureVariableKind::Temperature,
                level: p.level,
            })]
        }
        _ => vec![],
    }
}

/// All variables the domain carries, in dependency order: cache sources
/// before their consumers, per-level temperature before the level's
/// vertical velocity.
fn ordered_candidates(domain: Domain) -> Vec<Variable> {
    let mut out = Vec::new();

    let surface_head = [
        SurfaceVariable::Temperature2m,
        SurfaceVariable::PressureMsl,
        SurfaceVariable::RelativeHumidity2m,
    ];
    for v in surface_head {
        push_if_carried(&mut out, Variable::Surface(v), domain);
    }
    for v in SurfaceVariable::ALL {
        if !surface_head.contains(&v) {
            push_if_carried(&mut out, Variable::Surface(v), domain);
        }
    }

    for &level in domain.pressure_levels() {
        let kinds = [
            PressureVariableKind::Temperature,
            PressureVariableKind::WindU,
            PressureVariableKind::WindV,
            PressureVariableKind::GeopotentialHeight,
            PressureVariableKind::CloudCover,
            PressureVariableKind::RelativeHumidity,
            PressureVariableKind::VerticalVelocity,
        ];
        for kind in kinds {
            push_if_carried(
                &mut out,
                Variable::Pressure(PressureVariable { kind, level }),
                domain,
            );
        }
    }

    out
}

fn push_if_carried(out: &mut Vec<Variable>, variable: Variable, domain: Domain) {
    if variable.grib_index_name(domain).is_some() {
        out.push(variable);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prerequisites_come_first() {
        let filter = VariableFilter::default();
        let variables = download_variables(Domain::Gfs013, &filter);

        let pos = |v: &Variable| variables.iter().position(|x| x == v).unwrap();
        let t = Variable::Surface(SurfaceVariable::Temperature2m);
        let p = Variable::Surface(SurfaceVariable::PressureMsl);
        let rh = Variable::Surface(SurfaceVariable::RelativeHumidity2m);

        assert!(pos(&t) < pos(&rh));
        assert!(pos(&p) < pos(&rh));
    }

    #[test]
    fn test_only_filter_pulls_prerequisites() {
        let filter = VariableFilter {
            only: Some(vec!["relative_humidity_2m".to_string()]),
            ..Default::default()
        };
        let variables = download_variables(Domain::Gfs013, &filter);

        assert!(variables.contains(&Variable::Surface(SurfaceVariable::Temperature2m)));
        assert!(variables.contains(&Variable::Surface(SurfaceVariable::PressureMsl)));
        assert!(variables.contains(&Variable::Surface(SurfaceVariable::RelativeHumidity2m)));
        assert_eq!(variables.len(), 3);
    }

    #[test]
    fn test_only_filter_single_variable() {
        let filter = VariableFilter {
            only: Some(vec!["temperature_2m".to_string()]),
            ..Default::default()
        };
        let variables = download_variables(Domain::Gfs025, &filter);
        assert_eq!(
            variables,
            vec![Variable::Surface(SurfaceVariable::Temperature2m)]
        );
    }

    #[test]
    fn test_temperature_before_vertical_velocity_per_level() {
        let filter = VariableFilter::default();
        let variables = download_variables(Domain::HrrrConus, &filter);

        for &level in Domain::HrrrConus.pressure_levels() {
            let t = Variable::Pressure(PressureVariable {
                kind: PressureVariableKind::Temperature,
                level,
            });
            let w = Variable::Pressure(PressureVariable {
                kind: PressureVariableKind::VerticalVelocity,
                level,
            });
            let pos = |v: &Variable| variables.iter().position(|x| x == v).unwrap();
            assert!(pos(&t) < pos(&w), "level {}", level);
        }
    }

    #[test]
    fn test_surface_only_filter() {
        let filter = VariableFilter {
            surface_only: true,
            ..Default::default()
        };
        let variables = download_variables(Domain::HrrrConus, &filter);
        assert!(variables
            .iter()
            .all(|v| matches!(v, Variable::Surface(_))));
        assert!(!variables.is_empty());
    }

    #[test]
    fn test_pressure_base_name_selects_all_levels() {
        let filter = VariableFilter {
            only: Some(vec!["geopotential_height".to_string()]),
            ..Default::default()
        };
        let variables = download_variables(Domain::Gfs025, &filter);
        assert_eq!(variables.len(), Domain::Gfs025.pressure_levels().len());
        assert!(variables
            .iter()
            .all(|v| matches!(v, Variable::Pressure(p) if p.kind == PressureVariableKind::GeopotentialHeight)));
    }

    #[test]
    fn test_probability_never_downloaded() {
        let filter = VariableFilter::default();
        let variables = download_variables(Domain::Gfs025Ens, &filter);
        assert!(!variables
            .contains(&Variable::Surface(SurfaceVariable::PrecipitationProbability)));
    }
}
