//! Static catalogue of NCEP forecast products.
//!
//! Describes each supported domain (grid, run cadence, forecast-hour
//! schedule, ensemble members, source URLs) and each variable (GRIB
//! selector, scale factor, unit conversion, interpolation, hour-0 rule).
//! Everything here is a static table; nothing performs I/O.

pub mod catalogue;
pub mod domain;
pub mod variable;

pub use catalogue::{download_variables, VariableFilter};
pub use domain::{Domain, ProductFile};
pub use variable::{PressureVariable, PressureVariableKind, SurfaceVariable, Variable};
