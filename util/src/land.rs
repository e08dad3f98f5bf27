//! Land-surface model inputs: the column geometry and soil properties of the
//! analysis grid, and the members' restart states.

use nd::{Array1, Array2};

use std::path::Path;

use na_core::{Error, Result};

use crate::field::FieldFile;

pub const AUX_FILE: &str = "clm_aux.nc";

/// Columns of the land-surface grid with their soil properties.
#[derive(Clone, Debug)]
pub struct LandSurface {
  pub lat: Array1<f64>,
  pub lon: Array1<f64>,
  /// Layer thickness, (column, levsoi).
  pub depth: Array2<f64>,
  /// Saturation point, (column, levsoi).
  pub saturation: Array2<f64>,
}

impl LandSurface {
  pub fn columns(&self) -> usize { self.lat.len() }
  pub fn soil_levels(&self) -> usize { self.depth.dim().1 }
}

/// Reads `<utils_path>/clm_aux.nc`.
pub fn load_auxiliary(utils_path: &Path) -> Result<LandSurface> {
  let path = utils_path.join(AUX_FILE);
  let file = FieldFile::open("land-surface auxiliary data", &path)?;
  let lat = file.read1("lat")?;
  let lon = file.read1("lon")?;
  let depth = file.read2("DZSOI")?;
  let saturation = file.read2("WATSAT")?;

  if lon.len() != lat.len() || depth.dim().0 != lat.len() || saturation.dim() != depth.dim() {
    return Err(Error::format(&path, format!("inconsistent shapes: lat {}, lon {}, DZSOI {:?}, WATSAT {:?}",
                                            lat.len(), lon.len(), depth.dim(),
                                            saturation.dim())));
  }
  debug!("{} land columns with {} soil levels", lat.len(), depth.dim().1);

  Ok(LandSurface {
    lat: lat,
    lon: lon,
    depth: depth,
    saturation: saturation,
  })
}

/// A member's restart state of `variable`, (column, level), with the first
/// `level_offset` entries of the level axis (snow layers) removed.
pub fn load_soil_state(file: &FieldFile, variable: &str, level_offset: usize) -> Result<Array2<f64>> {
  let full = file.read2(variable)?;
  if full.dim().1 <= level_offset {
    return Err(Error::format(file.path(), format!("`{}` has {} levels, expected more than {}",
                                                  variable, full.dim().1, level_offset)));
  }
  Ok(full.slice(s![.., level_offset..]).to_owned())
}
