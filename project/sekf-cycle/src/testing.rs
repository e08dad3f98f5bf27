//! A small synthetic experiment: three land columns inside a 5x5 rotated
//! atmosphere grid, three soil levels of which two are perturbed.

use chrono::{DateTime, Duration, TimeZone, Utc};
use nd::{Array1, Array2, Array3};
use tempfile::TempDir;

use std::path::{Path, PathBuf};

use na_regrid::{RotatedGrid, RotatedPole};
use util::layout::{analysis_file_name, restart_file_name, ExperimentLayout, RunDirs};
use util::land::AUX_FILE;
use util::FieldWriter;

use crate::config::{PerturbationConfig, PoleConfig, SekfConfig};
use crate::engine::CycleContext;

pub const CELLS: usize = 3;
pub const OFFSET: usize = 5;
pub const LEVELS: usize = 3;
pub const DZ: [f64; LEVELS] = [0.02, 0.04, 0.06];
pub const WATSAT: f64 = 0.45;
pub const VOL: f64 = 0.3;
/// Volumetric perturbation of the perturbed level.
pub const PERT: f64 = 0.05;
/// Change of the first guess caused by each member's perturbation.
pub const FG_DELTA: [f64; 3] = [0.0, -1.0, -0.25];
/// First-guess times relative to the analysis, hours.
pub const FG_HOURS: [i64; 4] = [-1, 0, 1, 2];

pub fn pole() -> RotatedPole { RotatedPole::new(-171.0, 41.5) }

pub fn grid() -> RotatedGrid {
  RotatedGrid::new(Array1::linspace(-1.0, 1.0, 5), Array1::linspace(-1.0, 1.0, 5))
    .expect("grid")
}

pub fn cell_coordinates() -> (Array1<f64>, Array1<f64>) {
  let rotated = [(0.0, 0.0), (0.5, -0.5), (-0.25, 0.75)];
  let mut lat = Array1::zeros(CELLS);
  let mut lon = Array1::zeros(CELLS);
  for (c, &(rlat, rlon)) in rotated.iter().enumerate() {
    let (a, b) = pole().to_geographic(rlat, rlon);
    lat[c] = a;
    lon[c] = b;
  }
  (lat, lon)
}

pub fn analysis_time() -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2015, 7, 31, 12, 0, 0).unwrap()
}
pub fn start_time() -> DateTime<Utc> {
  analysis_time() - Duration::hours(3)
}

pub fn fg_times() -> Vec<i64> {
  FG_HOURS.iter()
    .map(|h| analysis_time().timestamp() + h * 3600)
    .collect()
}

/// Spatially uniform control 2 m temperature at first-guess index `t`.
pub fn control_t2m(t: usize) -> f64 { 285.0 + t as f64 }

/// (time, rlat, rlon)
pub fn first_guess(member: usize) -> Array3<f64> {
  Array3::from_shape_fn((FG_HOURS.len(), 5, 5), |(t, _, _)| control_t2m(t) + FG_DELTA[member] )
}

/// Restart state of `member` for `variable`, (column, levtot).
pub fn background(member: usize, variable: &str) -> Array2<f64> {
  Array2::from_shape_fn((CELLS, OFFSET + LEVELS), |(c, l)| {
    let perturbed = member > 0 && l == OFFSET + member - 1;
    if variable == "H2OSOI_LIQ" {
      if l < OFFSET {
        0.5 + 0.1 * l as f64 + c as f64
      } else {
        let dz = DZ[l - OFFSET];
        let vol = if perturbed { VOL + PERT } else { VOL };
        vol * dz * 1000.0
      }
    } else {
      270.0 + l as f64 + 0.1 * c as f64 + if perturbed { 0.5 } else { 0.0 }
    }
  })
}

pub fn write_aux(utils: &Path, lat: &Array1<f64>, lon: &Array1<f64>) {
  let depth = Array2::from_shape_fn((CELLS, LEVELS), |(_, k)| DZ[k] );
  let sat = Array2::from_elem((CELLS, LEVELS), WATSAT);
  FieldWriter::new()
    .variable("lat", &["column"], lat).expect("lat")
    .variable("lon", &["column"], lon).expect("lon")
    .variable("DZSOI", &["column", "levsoi"], &depth).expect("dz")
    .variable("WATSAT", &["column", "levsoi"], &sat).expect("sat")
    .write(&utils.join(AUX_FILE))
    .expect("aux");
}

pub fn write_background(path: &Path, member: usize) {
  FieldWriter::new()
    .variable("H2OSOI_LIQ", &["column", "levtot"], &background(member, "H2OSOI_LIQ"))
    .expect("water")
    .variable("T_SOISNO", &["column", "levtot"], &background(member, "T_SOISNO"))
    .expect("temperature")
    .write(path)
    .expect("background");
}

/// Two files per member so the loader has to concatenate.
pub fn write_first_guess(dir: &Path, member: usize) {
  write_first_guess_on(dir, member, &grid());
}

pub fn write_first_guess_on(dir: &Path, member: usize, grid: &RotatedGrid) {
  let fg = first_guess(member);
  let times = fg_times();
  for (name, range) in vec![("lffd2015073109.nc", 0..2), ("lffd2015073112.nc", 2..4)] {
    let t = Array1::from(times[range.clone()].iter().map(|&t| t as f64 ).collect::<Vec<_>>());
    FieldWriter::new()
      .variable("time", &["time"], &t).expect("time")
      .variable("rlat", &["rlat"], &grid.rlat).expect("rlat")
      .variable("rlon", &["rlon"], &grid.rlon).expect("rlon")
      .variable("T_2M", &["time", "rlat", "rlon"], &fg.slice(s![range.clone(), .., ..]))
      .expect("t2m")
      .write(&dir.join(name))
      .expect("first guess");
  }
}

pub struct Synthetic {
  pub dir: TempDir,
  pub config: SekfConfig,
}

impl Synthetic {
  pub fn new() -> Synthetic {
    let dir = tempfile::tempdir().expect("tempdir");
    let utils = dir.path().join("utils");
    let (lat, lon) = cell_coordinates();
    write_aux(&utils, &lat, &lon);

    let config = SekfConfig {
      upper_limit: 100.0,
      b_scale: 0.1,
      perturbation_levels: vec![0, 1],
      assim_vars: vec!["H2OSOI_LIQ".into()],
      obs_time_window: [0, 7200],
      rotated_pole: PoleConfig { lon: -171.0, lat: 41.5 },
      obs_path: dir.path().join("obs").join("t2m.nc"),
      utils_path: utils,
      observed_var: "T_2M".into(),
      fg_prefix: "lffd".into(),
      moisture_var: "H2OSOI_LIQ".into(),
      soil_level_offset: OFFSET,
      density: 1000.0,
      obs_match_tolerance: 0.05,
      perturbation_band: None,
      progress: false,
      layout: Some(ExperimentLayout::new(dir.path().join("experiment"))),
      perturbation: PerturbationConfig::default(),
      atmos_analysis: None,
    };
    let s = Synthetic {
      dir: dir,
      config: config,
    };
    // two observations per cell inside the default window
    s.write_observations(|t, _| if t == 1 { None } else { Some(control_t2m(t) + 0.5) } );
    s
  }

  pub fn layout(&self) -> &ExperimentLayout {
    self.config.layout.as_ref().expect("layout")
  }

  pub fn run_dir(&self) -> PathBuf { self.layout().run_dir(&start_time()) }

  pub fn context(&self) -> CycleContext {
    CycleContext {
      config: self.config.clone(),
      run_dir: self.run_dir(),
      start_time: start_time(),
      analysis_time: analysis_time(),
    }
  }

  pub fn background_in_run_dir(&self, member: usize) -> PathBuf {
    RunDirs::new(self.run_dir())
      .input(member)
      .join(restart_file_name(&analysis_time()))
  }

  /// Observations at every first-guess time and cell for which `value`
  /// gives one, plus one far outside the domain before the window.
  pub fn write_observations<F>(&self, value: F)
    where F: Fn(usize, usize) -> Option<f64>,
  {
    let (lat, lon) = cell_coordinates();
    let times = fg_times();
    let mut rows = vec![(times[0], 0.0, 0.0, 280.0)];
    for t in 0..times.len() {
      for c in 0..CELLS {
        if let Some(v) = value(t, c) {
          rows.push((times[t], lat[c], lon[c], v));
        }
      }
    }
    let col = |f: &dyn Fn(&(i64, f64, f64, f64)) -> f64| {
      Array1::from(rows.iter().map(f).collect::<Vec<_>>())
    };
    FieldWriter::new()
      .attribute("variable", "T_2M")
      .variable("time", &["obs"], &col(&|r| r.0 as f64 )).expect("time")
      .variable("lat", &["obs"], &col(&|r| r.1 )).expect("lat")
      .variable("lon", &["obs"], &col(&|r| r.2 )).expect("lon")
      .variable("observations", &["obs"], &col(&|r| r.3 )).expect("obs")
      .variable("covariance", &["obs"], &Array1::from_elem(rows.len(), 0.25)).expect("cov")
      .write(&self.config.obs_path)
      .expect("observations");
  }

  /// Members as `run_sekf` expects them below the run directory.
  pub fn stage_run_dir(&self) {
    let dirs = RunDirs::new(self.run_dir());
    for m in 0..self.config.members() {
      write_background(&self.background_in_run_dir(m), m);
      write_first_guess(&dirs.input(m), m);
    }
  }

  /// An atmosphere background named `name` in the control's forecast
  /// output.
  pub fn stage_atmosphere_background(&self, name: &str) -> PathBuf {
    let path = self.layout().parent_output(&start_time(), 0).join(name);
    let fg = first_guess(0);
    FieldWriter::new()
      .variable("rlat", &["rlat"], &grid().rlat).expect("rlat")
      .variable("rlon", &["rlon"], &grid().rlon).expect("rlon")
      .variable("T", &["rlat", "rlon"], &fg.index_axis(nd::Axis(0), 1)).expect("t")
      .write(&path)
      .expect("atmosphere background");
    path
  }

  /// Members where the forecast and the finite perturbation steps leave them.
  pub fn stage_experiment(&self) {
    let layout = self.layout();
    for m in 0..self.config.members() {
      let pert = layout.finite_pert_output(&start_time(), m);
      write_background(&pert.join(analysis_file_name(&analysis_time())), m);
      let parent = layout.parent_output(&start_time(), m);
      util::layout::ensure_dir(&parent).expect("parent output");
      write_first_guess(&parent, m);
    }
  }
}
