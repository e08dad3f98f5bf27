//! Shared I/O plumbing of the assimilation cycle: netCDF field access,
//! observation, land-surface and first-guess loaders, and run-directory
//! layout.

extern crate chrono;
#[macro_use]
extern crate ndarray as nd;
extern crate netcdf;
extern crate pbr;
extern crate rstar;
extern crate serde;
extern crate na_core;
extern crate na_regrid;
#[macro_use]
extern crate log;

#[cfg(test)]
extern crate serde_json;
#[cfg(test)]
extern crate tempfile;

pub use field::{FieldFile, FieldPatch, FieldWriter};

pub mod atmos;
pub mod field;
pub mod land;
pub mod layout;
pub mod obs;
pub mod progress;
