//! The scalar-per-level Kalman update: gain from the masked Jacobian, then the
//! increment from the innovations.

pub use self::gain::{estimate_gain, usable_variance, Gain};
pub use self::increment::{build_increment, Increment};

pub mod gain;
pub mod increment;
