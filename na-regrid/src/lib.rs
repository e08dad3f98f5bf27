//! Reprojection of fields between two non-aligned horizontal grids: the
//! rotated-pole grid of the atmosphere model and the geographic columns of
//! the land-surface model.

extern crate ndarray as nd;
extern crate na_core;
#[macro_use]
extern crate log;

pub use interp::{reproject, Regridder, RotatedGrid};
pub use rotated::RotatedPole;

pub mod interp;
pub mod rotated;
