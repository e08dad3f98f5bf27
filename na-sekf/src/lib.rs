//! Sequential finite-difference Kalman filter (SEKF) for soil moisture.
//!
//! A perturbation ensemble of `N + 1` members, member 0 being the control and
//! every other member perturbing one soil level, gives a finite-difference
//! Jacobian of the observed quantity per level. Each level then gets a scalar
//! Kalman gain and the control is corrected by the resulting increment. Every
//! horizontal cell is treated independently.

#[macro_use]
extern crate ndarray as nd;
extern crate num_traits;
extern crate rand;
extern crate rand_distr;
extern crate na_core;
#[macro_use]
extern crate log;

pub use analysis::{build_analysis, Analysis};
pub use ensemble::{LevelIndex, MemberId, MemberLevels, PerturbationEnsemble};
pub use filter::{Assimilation, Sekf};
pub use jacobian::{estimate_jacobian, DegenerateReason, DegenerateSensitivity, Jacobian,
                   SensitivityLimits};
pub use kalman::{build_increment, estimate_gain, Gain, Increment};
pub use moisture::SoilProperties;
pub use perturb::{perturb_level, PerturbationDesign, PerturbedLevel};

pub mod analysis;
pub mod ensemble;
pub mod filter;
pub mod jacobian;
pub mod kalman;
pub mod moisture;
pub mod perturb;
