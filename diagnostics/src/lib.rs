//! Audit artifacts of an assimilation cycle.

extern crate ndarray as nd;
extern crate na_core;
extern crate na_sekf;
#[macro_use]
extern crate log;

#[cfg(test)]
extern crate tempfile;

pub use xdmf::{Coordinates, Dim, DiagnosticsWriter};

pub mod xdmf;
