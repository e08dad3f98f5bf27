//! `run_sekf`: loads the staged ensemble, assimilates the observations and
//! commits the corrected control state.

use chrono::{DateTime, Utc};
use nd::{Array2, Array3, Axis};

use std::path::PathBuf;

use diagnostics::{Coordinates, DiagnosticsWriter};
use na_core::{Error, Result};
use na_regrid::{Regridder, RotatedGrid};
use na_sekf::moisture::{self, SoilProperties};
use na_sekf::{Analysis, MemberId, MemberLevels, PerturbationEnsemble};
use util::atmos::{find_first_guess_files, load_first_guess};
use util::land::{load_auxiliary, load_soil_state, LandSurface};
use util::layout::{analysis_file_name, restart_file_name, RunDirs};
use util::obs::{grid_observations, load_observations, GriddedObservations};
use util::progress::ReportingIterator;
use util::{FieldFile, FieldPatch};

use crate::config::SekfConfig;

/// Everything one invocation of the update needs.
#[derive(Clone, Debug)]
pub struct CycleContext {
  pub config: SekfConfig,
  /// Holds `input/ensNNN` with the staged members and receives `output/`.
  pub run_dir: PathBuf,
  pub start_time: DateTime<Utc>,
  pub analysis_time: DateTime<Utc>,
}

impl CycleContext {
  pub fn run_dirs(&self) -> RunDirs { RunDirs::new(&self.run_dir) }

  /// Path of the committed analysis.
  pub fn analysis_path(&self) -> PathBuf {
    self.run_dirs()
      .output(MemberId::CONTROL.0)
      .join(analysis_file_name(&self.analysis_time))
  }

  fn background_path(&self, member: MemberId) -> PathBuf {
    self.run_dirs()
      .input(member.0)
      .join(restart_file_name(&self.analysis_time))
  }
}

/// Members' restart states of every assimilated variable.
struct Backgrounds {
  control: FieldFile,
  /// Per variable (member, level, cell); volumetric for the moisture variable.
  states: Vec<Array3<f64>>,
}

fn members(mapping: &MemberLevels, what: &'static str, progress: bool)
  -> ReportingIterator<::std::vec::IntoIter<MemberId>>
{
  let members: Vec<_> = mapping.members().collect();
  ReportingIterator::new(members.into_iter(), what.into(), progress)
}

fn load_backgrounds(ctx: &CycleContext, mapping: &MemberLevels,
                    soil: &SoilProperties) -> Result<Backgrounds> {
  let config = &ctx.config;
  let mut control = None;
  let mut per_var: Vec<Vec<Array2<f64>>> = vec![Vec::new(); config.assim_vars.len()];

  for member in members(mapping, "background", config.progress) {
    let path = ctx.background_path(member);
    let file = FieldFile::open(&format!("background of {}", member), &path)?;
    for (var, states) in config.assim_vars.iter().zip(per_var.iter_mut()) {
      let state = load_soil_state(&file, var, config.soil_level_offset)?;
      let state = if var == &config.moisture_var {
        soil.to_volumetric(state.view())?
      } else {
        state
      };
      // (column, level) -> (level, column)
      states.push(state.reversed_axes());
    }
    debug!("loaded background of {} from {}", member, path.display());
    if member.is_control() {
      control = Some(file);
    }
  }

  let control = control
    .ok_or_else(|| Error::missing_input("control background", ctx.background_path(MemberId::CONTROL),
                                        "not loaded") )?;
  let mut states = Vec::with_capacity(per_var.len());
  for member_states in per_var.iter() {
    let views: Vec<_> = member_states.iter().map(|s| s.view() ).collect();
    states.push(nd::stack(Axis(0), &views)?);
  }
  Ok(Backgrounds {
    control: control,
    states: states,
  })
}

/// Model equivalents of the observations, (member, time, cell).
fn load_first_guesses(ctx: &CycleContext, mapping: &MemberLevels,
                      land: &LandSurface, times: &[i64]) -> Result<Array3<f64>> {
  let config = &ctx.config;
  let pole = config.pole();
  // every member is interpolated with the weights of the first one's grid
  let mut regridder: Option<(RotatedGrid, Regridder)> = None;
  let mut regridded = Vec::with_capacity(mapping.member_count());

  for member in members(mapping, "first guess", config.progress) {
    let dir = ctx.run_dirs().input(member.0);
    let files = find_first_guess_files(&dir, &config.fg_prefix)?;
    let fg = load_first_guess(&files, &config.observed_var)?;
    match regridder {
      Some((ref grid, _)) => {
        if grid != &fg.grid {
          return Err(Error::format(&files[0], format!("rotated grid of {} differs from the {}'s",
                                                      member, MemberId::CONTROL)));
        }
      },
      None => {
        let r = Regridder::new(&pole, &fg.grid, land.lat.view(), land.lon.view())?;
        regridder = Some((fg.grid.clone(), r));
      },
    }
    let selected = fg.select_times(times)?;
    if let Some((_, ref r)) = regridder {
      regridded.push(r.regrid(selected.view())?);
    }
  }

  let views: Vec<_> = regridded.iter().map(|r| r.view() ).collect();
  Ok(nd::stack(Axis(0), &views)?)
}

fn load_observation_grid(ctx: &CycleContext, land: &LandSurface) -> Result<GriddedObservations> {
  let config = &ctx.config;
  let set = load_observations(&config.obs_path)?;
  if let Some(ref v) = set.variable {
    if v != &config.observed_var {
      warn!("observations are of `{}`, the first guess is read from `{}`",
            v, config.observed_var);
    }
  }

  let analysis = ctx.analysis_time.timestamp();
  let (start, end) = (analysis + config.obs_time_window[0],
                      analysis + config.obs_time_window[1]);
  let times = set.times_in_window(start, end);
  if times.is_empty() {
    warn!("no observations between {} and {}, the analysis equals the background",
          start, end);
  }
  let gridded = grid_observations(&set.in_window(start, end), &times,
                                  land.lat.view(), land.lon.view(),
                                  config.obs_match_tolerance);
  info!("{} observations at {} times matched to {} cells",
        gridded.count(), times.len(), land.columns());
  Ok(gridded)
}

/// Runs one SEKF update and returns the path of the committed analysis.
pub fn run_sekf(ctx: &CycleContext) -> Result<PathBuf> {
  let config = &ctx.config;
  config.validate()?;
  let mapping = config.member_levels()?;
  info!("SEKF update for {} with {} members, analysis at {}",
        ctx.run_dir.display(), mapping.member_count(), ctx.analysis_time);

  let land = load_auxiliary(&config.utils_path)?;
  let soil = SoilProperties::new(land.depth.clone(), land.saturation.clone(), config.density)?;

  let backgrounds = load_backgrounds(ctx, &mapping, &soil)?;
  info!("loaded background");

  let observations = load_observation_grid(ctx, &land)?;
  let first_guess = load_first_guesses(ctx, &mapping, &land, &observations.times)?;
  info!("loaded first guess");

  let writer = DiagnosticsWriter::new(ctx.run_dirs().diagnostics());
  let coords = Coordinates {
    time: observations.times.clone(),
    level: mapping.levels(),
    lat: land.lat.to_vec(),
    lon: land.lon.to_vec(),
  };
  let filter = config.filter();

  let mut patch = FieldPatch::new();
  for (var, background) in config.assim_vars.iter().zip(backgrounds.states.into_iter()) {
    let ensemble = PerturbationEnsemble::new(mapping.clone(), background, first_guess.clone())?;
    let assimilation = filter.assimilate(&ensemble,
                                         observations.values.view(),
                                         observations.variance.view())?;
    info!("`{}`: increment estimated, {} masked sensitivities",
          var, assimilation.degenerate.len());

    let var_writer = if config.assim_vars.len() > 1 {
      writer.for_variable(var)
    } else {
      writer.clone()
    };
    let written = var_writer.write_assimilation(&assimilation, &coords);
    debug!("{} diagnostics written for `{}`", written, var);

    let analysis = Analysis::new(ensemble.control_background(),
                                 assimilation.increment.view(),
                                 &assimilation.levels)?;
    let is_moisture = var == &config.moisture_var;
    let mut updated = 0;
    for (level, cell) in analysis.updated() {
      let v = analysis.values[[level, cell]];
      let value = if is_moisture {
        moisture::absolute(v, land.depth[[cell, level]], land.saturation[[cell, level]],
                           config.density)
      } else {
        v
      };
      patch.set(var, &[cell, level + config.soil_level_offset], value);
      updated += 1;
    }
    info!("`{}`: {} elements updated", var, updated);
  }

  let path = ctx.analysis_path();
  let written = patch.commit(&backgrounds.control, &path)?;
  info!("analysis with {} changed elements committed to {}", written, path.display());
  Ok(path)
}

#[cfg(test)]
mod test {
  use super::*;
  use nd::Array1;
  use std::fs;

  use na_core::PartialEqWithinTol;
  use na_regrid::reproject;

  use crate::testing::{self, Synthetic};

  fn soil_block(file: &FieldFile, var: &str) -> Array2<f64> {
    file.read2(var).expect("state")
  }

  #[test]
  fn update_moves_perturbed_levels_only() {
    let s = Synthetic::new();
    s.stage_run_dir();
    let path = run_sekf(&s.context()).expect("run");
    assert_eq!(path, s.context().analysis_path());

    let control = FieldFile::open("control", s.background_in_run_dir(0)).expect("control");
    let analysis = FieldFile::open("analysis", &path).expect("analysis");
    let before = soil_block(&control, "H2OSOI_LIQ");
    let after = soil_block(&analysis, "H2OSOI_LIQ");

    for c in 0..testing::CELLS {
      // snow layers and the unperturbed level 2
      for l in (0..testing::OFFSET).chain(Some(testing::OFFSET + 2)) {
        assert_eq!(after[[c, l]].to_bits(), before[[c, l]].to_bits());
      }
      // J = -20 and -5, two observations with d = 0.5, R = 0.25, B = 0.01
      let vol0 = after[[c, testing::OFFSET]] / testing::DZ[0] / 1000.0;
      let vol1 = after[[c, testing::OFFSET + 1]] / testing::DZ[1] / 1000.0;
      assert!(vol0.partial_eq_within_tol(&(0.3 - 80.0 / 3300.0), 1.0e-9), "vol0 = {}", vol0);
      assert!(vol1.partial_eq_within_tol(&(0.3 - 20.0 / 300.0), 1.0e-9), "vol1 = {}", vol1);
    }

    let out = s.context().run_dirs().diagnostics();
    for name in ["innovation", "jacobian", "gain", "increment"].iter() {
      assert!(out.join(format!("{}.bin", name)).exists(), "{} missing", name);
      assert!(out.join(format!("{}.xdmf", name)).exists(), "{} missing", name);
    }
  }

  #[test]
  fn zero_innovation_is_a_byte_copy() {
    let s = Synthetic::new();
    s.stage_run_dir();

    // observe exactly what the control predicts
    let (lat, lon) = testing::cell_coordinates();
    let fg = testing::first_guess(0);
    let hx = reproject(&testing::pole(), &testing::grid(), fg.view(), lat.view(), lon.view())
      .expect("reproject");
    s.write_observations(|t, c| Some(hx[[t, c]]));

    let path = run_sekf(&s.context()).expect("run");
    assert_eq!(fs::read(&path).expect("analysis"),
               fs::read(s.background_in_run_dir(0)).expect("control"));
  }

  #[test]
  fn analysis_is_clipped_at_saturation() {
    let mut s = Synthetic::new();
    s.config.b_scale = 10.0;
    s.stage_run_dir();
    // far colder than the first guess, so soil water has to rise a lot
    s.write_observations(|t, _| Some(testing::control_t2m(t) - 50.0));

    let path = run_sekf(&s.context()).expect("run");
    let after = soil_block(&FieldFile::open("analysis", &path).expect("analysis"), "H2OSOI_LIQ");
    for c in 0..testing::CELLS {
      for k in 0..2 {
        let max = testing::WATSAT * testing::DZ[k] * 1000.0;
        assert!(after[[c, testing::OFFSET + k]].partial_eq_within_tol(&max, 1.0e-9),
                "cell {}, level {}: {}", c, k, after[[c, testing::OFFSET + k]]);
      }
    }
  }

  #[test]
  fn missing_member_fails_fast() {
    let s = Synthetic::new();
    s.stage_run_dir();
    fs::remove_file(s.background_in_run_dir(2)).expect("remove");
    match run_sekf(&s.context()) {
      Err(Error::MissingInput { .. }) => {},
      other => panic!("expected a missing input, got {:?}", other),
    }
    assert!(!s.context().analysis_path().exists());
  }

  #[test]
  fn cells_outside_the_atmosphere_grid() {
    let s = Synthetic::new();
    s.stage_run_dir();
    testing::write_aux(&s.config.utils_path,
                       &Array1::from(vec![10.0, 11.0, 12.0]),
                       &Array1::from(vec![-60.0, -60.0, -60.0]));
    match run_sekf(&s.context()) {
      Err(Error::Domain { .. }) => {},
      other => panic!("expected a domain error, got {:?}", other),
    }
  }

  #[test]
  fn several_variables_get_suffixed_diagnostics() {
    let mut s = Synthetic::new();
    s.config.assim_vars = vec!["H2OSOI_LIQ".into(), "T_SOISNO".into()];
    s.stage_run_dir();
    let path = run_sekf(&s.context()).expect("run");

    let out = s.context().run_dirs().diagnostics();
    assert!(out.join("increment_H2OSOI_LIQ.bin").exists());
    assert!(out.join("increment_T_SOISNO.xdmf").exists());

    // the second variable is updated without moisture conversion
    let control = soil_block(&FieldFile::open("c", s.background_in_run_dir(0)).expect("c"),
                             "T_SOISNO");
    let after = soil_block(&FieldFile::open("a", &path).expect("a"), "T_SOISNO");
    assert!(after[[0, testing::OFFSET]] != control[[0, testing::OFFSET]]);
    assert_eq!(after[[0, testing::OFFSET + 2]], control[[0, testing::OFFSET + 2]]);
  }

  #[test]
  fn member_on_another_grid() {
    let s = Synthetic::new();
    s.stage_run_dir();
    let dir = s.context().run_dirs().input(2);
    let shifted = RotatedGrid::new(Array1::linspace(-1.0, 1.0, 5),
                                   Array1::linspace(-0.9, 1.1, 5)).expect("grid");
    testing::write_first_guess_on(&dir, 2, &shifted);

    match run_sekf(&s.context()) {
      Err(Error::Format { path, reason }) => {
        assert_eq!(path.parent(), Some(dir.as_path()));
        assert!(reason.contains("ens003"), "{}", reason);
      },
      other => panic!("expected a format error, got {:?}", other),
    }
    assert!(!s.context().analysis_path().exists());
  }

  #[test]
  fn no_observations_in_window() {
    let mut s = Synthetic::new();
    s.config.obs_time_window = [86400, 90000];
    s.stage_run_dir();
    let path = run_sekf(&s.context()).expect("run");
    assert_eq!(fs::read(&path).expect("analysis"),
               fs::read(s.background_in_run_dir(0)).expect("control"));
  }
}
