//! Conversion between the land model's absolute soil water (kg m⁻²) and the
//! volumetric water content the filter works in.

use nd::{Array2, ArrayView2, Zip};

use na_core::{Error, Result};

/// Density of liquid water, kg m⁻³.
pub const DENSITY: f64 = 1000.0;

/// `vol = abs / depth / density`
pub fn volumetric(abs: f64, depth: f64, density: f64) -> f64 {
  abs / depth / density
}

/// Soil-moisture index clipped to `[0, 1]`, converted back to absolute water.
pub fn absolute(vol: f64, depth: f64, saturation: f64, density: f64) -> f64 {
  let smi = (vol / saturation).max(0.0).min(1.0);
  smi * saturation * depth * density
}

/// Layer thickness and saturation point of every (cell, level).
#[derive(Clone, Debug)]
pub struct SoilProperties {
  pub depth: Array2<f64>,
  pub saturation: Array2<f64>,
  pub density: f64,
}

impl SoilProperties {
  pub fn new(depth: Array2<f64>, saturation: Array2<f64>, density: f64) -> Result<SoilProperties> {
    if depth.dim() != saturation.dim() {
      return Err(Error::Config(format!("soil depth is {:?} but saturation is {:?}",
                                       depth.dim(), saturation.dim())));
    }
    if !(density > 0.0) {
      return Err(Error::Config(format!("density must be positive, got {}", density)));
    }
    Ok(SoilProperties {
      depth: depth,
      saturation: saturation,
      density: density,
    })
  }

  /// (cell, level)
  pub fn dim(&self) -> (usize, usize) { self.depth.dim() }

  fn check(&self, field: (usize, usize)) -> Result<()> {
    if field.0 != self.dim().0 || field.1 > self.dim().1 {
      return Err(Error::Config(format!("soil water field is {:?}, soil properties only cover {:?}",
                                       field, self.dim())));
    }
    Ok(())
  }

  /// `abs` is (cell, level), with levels counted from the first soil level.
  pub fn to_volumetric(&self, abs: ArrayView2<f64>) -> Result<Array2<f64>> {
    self.check(abs.dim())?;
    let n = abs.dim().1;
    let mut out = Array2::zeros(abs.dim());
    Zip::from(&mut out)
      .and(&abs)
      .and(self.depth.slice(s![.., ..n]))
      .for_each(|out, &abs, &dz| {
        *out = volumetric(abs, dz, self.density);
      });
    Ok(out)
  }

  pub fn to_absolute(&self, vol: ArrayView2<f64>) -> Result<Array2<f64>> {
    self.check(vol.dim())?;
    let n = vol.dim().1;
    let mut out = Array2::zeros(vol.dim());
    Zip::from(&mut out)
      .and(&vol)
      .and(self.depth.slice(s![.., ..n]))
      .and(self.saturation.slice(s![.., ..n]))
      .for_each(|out, &vol, &dz, &sat| {
        *out = absolute(vol, dz, sat, self.density);
      });
    Ok(out)
  }
}
