//! One assimilation cycle of the land-surface model with the sequential
//! finite-difference Kalman filter: staging of the ensemble inputs, the
//! update itself and publication of the analysis.

extern crate chrono;
#[macro_use]
extern crate ndarray as nd;
extern crate rand;
extern crate serde;
extern crate serde_json;
extern crate na_core;
extern crate na_regrid;
extern crate na_sekf;
extern crate util;
extern crate diagnostics;
#[macro_use]
extern crate log;

#[cfg(test)]
extern crate tempfile;

pub use config::SekfConfig;
pub use driver::{CycleDriver, CycleState};
pub use engine::{run_sekf, CycleContext};

pub mod config;
pub mod driver;
pub mod engine;
pub mod perturb;

#[cfg(test)]
mod testing;
