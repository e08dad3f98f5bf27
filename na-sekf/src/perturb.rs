//! Finite perturbations of single soil levels, producing the members of the
//! perturbation ensemble from the control state.

use nd::{Array1, Array2, ArrayView2};
use rand::Rng;
use rand_distr::{Distribution, Normal};

use na_core::{Error, Result};

use crate::ensemble::LevelIndex;
use crate::moisture::SoilProperties;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PerturbationDesign {
  /// The same offset in every cell.
  Fixed(f64),
  /// Independent normal offsets with standard deviation `scale`.
  Random { scale: f64 },
}

impl PerturbationDesign {
  pub fn new(scale: f64, random: bool) -> Result<PerturbationDesign> {
    if !scale.is_finite() || scale == 0.0 {
      return Err(Error::Config(format!("perturbation scale must be finite and non-zero, got {}",
                                       scale)));
    }
    if random {
      if scale < 0.0 {
        return Err(Error::Config(format!("random perturbation scale must be positive, got {}",
                                         scale)));
      }
      Ok(PerturbationDesign::Random { scale: scale })
    } else {
      Ok(PerturbationDesign::Fixed(scale))
    }
  }

  /// Offsets for `cells` columns, drawn from `rng` for the random design.
  pub fn sample<R>(&self, cells: usize, rng: &mut R) -> Result<Array1<f64>>
    where R: Rng,
  {
    match self {
      &PerturbationDesign::Fixed(v) => Ok(Array1::from_elem(cells, v)),
      &PerturbationDesign::Random { scale } => {
        let dist = Normal::new(0.0, scale)
          .map_err(|e| Error::Config(format!("perturbation scale {}: {}", scale, e)) )?;
        Ok(Array1::from_shape_fn(cells, |_| dist.sample(&mut *rng) ))
      },
    }
  }
}

/// One perturbed member's new soil water at `level`.
#[derive(Clone, Debug)]
pub struct PerturbedLevel {
  pub level: LevelIndex,
  /// Absolute soil water of every cell at `level`, bounded by saturation.
  pub values: Array1<f64>,
  /// Volumetric offset that was added before clipping.
  pub offset: Array1<f64>,
}

/// Adds the design's offset to the volumetric water of `level` and converts
/// back, clipping against the saturation point. `control` is the absolute
/// soil water, (cell, level).
pub fn perturb_level<R>(control: ArrayView2<f64>,
                        soil: &SoilProperties,
                        level: LevelIndex,
                        design: &PerturbationDesign,
                        rng: &mut R) -> Result<PerturbedLevel>
  where R: Rng,
{
  let (cells, levels) = control.dim();
  if level.0 >= levels {
    return Err(Error::Config(format!("cannot perturb {}, the state has {} levels",
                                     level, levels)));
  }

  let mut vol: Array2<f64> = soil.to_volumetric(control)?;
  let offset = design.sample(cells, rng)?;
  {
    let mut column = vol.column_mut(level.0);
    column += &offset;
  }
  let abs = soil.to_absolute(vol.view())?;

  debug!("perturbed {} of {} cells", level, cells);

  Ok(PerturbedLevel {
    level: level,
    values: abs.column(level.0).to_owned(),
    offset: offset,
  })
}
