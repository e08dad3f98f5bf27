//! The finite perturbation step: derives the perturbed members from the
//! control restart file, one soil level per member.

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;

use std::path::{Path, PathBuf};

use na_core::Result;
use na_sekf::moisture::SoilProperties;
use na_sekf::{perturb_level, MemberId};
use util::land::{load_auxiliary, load_soil_state};
use util::layout::{analysis_file_name, member_dir_name, replace_symlink};
use util::{FieldFile, FieldPatch};

use crate::config::SekfConfig;

/// Writes `<out_dir>/ensNNN/clm_ana<analysis>.nc` for every member and
/// returns the paths, control first. The control is a link to `control`;
/// every other member is a copy with its level of `moisture_var` perturbed.
pub fn generate_perturbations(config: &SekfConfig,
                              control: &Path,
                              out_dir: &Path,
                              analysis_time: &DateTime<Utc>) -> Result<Vec<PathBuf>> {
  config.validate()?;
  let mapping = config.member_levels()?;
  let design = config.perturbation_design()?;
  let land = load_auxiliary(&config.utils_path)?;
  let soil = SoilProperties::new(land.depth.clone(), land.saturation.clone(), config.density)?;

  let file = FieldFile::open("control restart", control)?;
  let state = load_soil_state(&file, &config.moisture_var, config.soil_level_offset)?;
  let name = analysis_file_name(analysis_time);
  let member_path = |m: MemberId| out_dir.join(member_dir_name(m.0)).join(&name);

  let mut rng = StdRng::seed_from_u64(config.perturbation.seed);
  let mut written = Vec::with_capacity(mapping.member_count());

  let control_out = member_path(MemberId::CONTROL);
  replace_symlink(control, &control_out)?;
  written.push(control_out);

  for &(member, level) in mapping.iter() {
    let perturbed = perturb_level(state.view(), &soil, level, &design, &mut rng)?;
    let mut patch = FieldPatch::new();
    for (cell, &v) in perturbed.values.iter().enumerate() {
      patch.set(&config.moisture_var, &[cell, level.0 + config.soil_level_offset], v);
    }
    let path = member_path(member);
    patch.commit(&file, &path)?;
    info!("{} perturbed at {} -> {}", member, level, path.display());
    written.push(path);
  }
  Ok(written)
}
