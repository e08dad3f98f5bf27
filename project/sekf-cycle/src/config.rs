//! Configuration of the SEKF cycle, read from JSON.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use std::collections::HashSet;
use std::fmt::Write;
use std::fs;
use std::path::{Path, PathBuf};

use na_core::{Error, Result};
use na_regrid::RotatedPole;
use na_sekf::{MemberLevels, PerturbationDesign, Sekf};
use util::layout::ExperimentLayout;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoleConfig {
  pub lon: f64,
  pub lat: f64,
}

fn default_scale() -> f64 { 0.05 }

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PerturbationConfig {
  #[serde(default = "default_scale")]
  pub scale: f64,
  #[serde(default)]
  pub random: bool,
  #[serde(default)]
  pub seed: u64,
}

impl Default for PerturbationConfig {
  fn default() -> PerturbationConfig {
    PerturbationConfig {
      scale: default_scale(),
      random: false,
      seed: 0,
    }
  }
}

fn default_atmos_analysis_file() -> String { "laf%Y%m%d%H%M%S.nc".into() }

/// File name from a strftime pattern. Invalid patterns are an error instead
/// of a panic.
fn render_pattern(key: &str, pattern: &str, time: &DateTime<Utc>) -> Result<String> {
  let mut name = String::new();
  write!(name, "{}", time.format(pattern))
    .map_err(|_| Error::Config(format!("`{}` is not a valid time pattern: `{}`", key, pattern)) )?;
  if name.is_empty() || name.contains('/') {
    return Err(Error::Config(format!("`{}` must give a plain file name, got `{}`", key, name)));
  }
  Ok(name)
}

/// Publication of the atmosphere model's background as its analysis, for
/// cycles where only the land surface is assimilated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AtmosAnalysisConfig {
  /// strftime pattern of the background below the parent model's output,
  /// expanded at the analysis time.
  pub bg_files: String,
  #[serde(default = "default_atmos_analysis_file")]
  pub analysis_file: String,
}

impl AtmosAnalysisConfig {
  pub fn background_name(&self, analysis: &DateTime<Utc>) -> Result<String> {
    render_pattern("atmos_analysis.bg_files", &self.bg_files, analysis)
  }

  pub fn analysis_name(&self, analysis: &DateTime<Utc>) -> Result<String> {
    render_pattern("atmos_analysis.analysis_file", &self.analysis_file, analysis)
  }

  fn validate(&self) -> Result<()> {
    let t = Utc.timestamp_opt(0, 0)
      .single()
      .ok_or_else(|| Error::Config("no reference time".into()) )?;
    self.background_name(&t)?;
    self.analysis_name(&t)?;
    Ok(())
  }
}

fn default_observed_var() -> String { "T_2M".into() }
fn default_fg_prefix() -> String { "lffd".into() }
fn default_moisture_var() -> String { "H2OSOI_LIQ".into() }
fn default_soil_level_offset() -> usize { 5 }
fn default_density() -> f64 { na_sekf::moisture::DENSITY }
fn default_obs_match_tolerance() -> f64 { 0.05 }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SekfConfig {
  /// Sensitivities with `|J| >= upper_limit` are discarded.
  pub upper_limit: f64,
  /// Prior standard deviation of each perturbed level.
  pub b_scale: f64,
  /// Level perturbed by member `m` is `perturbation_levels[m - 1]`.
  pub perturbation_levels: Vec<usize>,
  pub assim_vars: Vec<String>,
  /// Seconds relative to the analysis time, inclusive.
  pub obs_time_window: [i64; 2],
  pub rotated_pole: PoleConfig,
  pub obs_path: PathBuf,
  pub utils_path: PathBuf,

  #[serde(default = "default_observed_var")]
  pub observed_var: String,
  #[serde(default = "default_fg_prefix")]
  pub fg_prefix: String,
  /// Variable converted to volumetric water content for the update.
  #[serde(default = "default_moisture_var")]
  pub moisture_var: String,
  /// Snow layers in front of the soil levels in the restart files.
  #[serde(default = "default_soil_level_offset")]
  pub soil_level_offset: usize,
  #[serde(default = "default_density")]
  pub density: f64,
  /// Degrees.
  #[serde(default = "default_obs_match_tolerance")]
  pub obs_match_tolerance: f64,
  /// Accepted `[min, max]` of `|Δ_state|`.
  #[serde(default)]
  pub perturbation_band: Option<[f64; 2]>,
  #[serde(default)]
  pub progress: bool,

  /// Needed by the driver, not by `run_sekf`.
  #[serde(default)]
  pub layout: Option<ExperimentLayout>,
  #[serde(default)]
  pub perturbation: PerturbationConfig,
  /// Links the atmosphere analysis when set.
  #[serde(default)]
  pub atmos_analysis: Option<AtmosAnalysisConfig>,
}

impl SekfConfig {
  pub fn load(path: &Path) -> Result<SekfConfig> {
    let text = fs::read_to_string(path)
      .map_err(|e| Error::missing_input("configuration", path, e) )?;
    let config = SekfConfig::from_json(&text)
      .map_err(|e| match e {
        Error::Config(msg) => Error::Config(format!("{}: {}", path.display(), msg)),
        e => e,
      })?;
    info!("configuration loaded from {}", path.display());
    Ok(config)
  }

  pub fn from_json(text: &str) -> Result<SekfConfig> {
    let config: SekfConfig = serde_json::from_str(text)
      .map_err(|e| Error::Config(e.to_string()) )?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<()> {
    let positive = |name: &str, v: f64| {
      if v.is_finite() && v > 0.0 {
        Ok(())
      } else {
        Err(Error::Config(format!("`{}` must be finite and positive, got {}", name, v)))
      }
    };
    positive("upper_limit", self.upper_limit)?;
    positive("b_scale", self.b_scale)?;
    positive("density", self.density)?;
    positive("obs_match_tolerance", self.obs_match_tolerance)?;

    MemberLevels::from_levels(&self.perturbation_levels)?;

    if self.assim_vars.is_empty() {
      return Err(Error::Config("`assim_vars` is empty".into()));
    }
    let mut seen = HashSet::new();
    if let Some(v) = self.assim_vars.iter().find(|v| !seen.insert(v.as_str()) ) {
      return Err(Error::Config(format!("`{}` is assimilated twice", v)));
    }
    if self.obs_time_window[0] > self.obs_time_window[1] {
      return Err(Error::Config(format!("observation window starts at {} s but ends at {} s",
                                       self.obs_time_window[0], self.obs_time_window[1])));
    }
    if !(self.rotated_pole.lat >= -90.0 && self.rotated_pole.lat <= 90.0) ||
      !self.rotated_pole.lon.is_finite()
    {
      return Err(Error::Config(format!("invalid rotated pole ({}, {})",
                                       self.rotated_pole.lon, self.rotated_pole.lat)));
    }
    if let Some([lo, hi]) = self.perturbation_band {
      if !(lo >= 0.0 && lo <= hi && hi.is_finite()) {
        return Err(Error::Config(format!("invalid perturbation band [{}, {}]", lo, hi)));
      }
    }
    self.perturbation_design()?;
    if let Some(ref atmos) = self.atmos_analysis {
      atmos.validate()?;
    }
    Ok(())
  }

  pub fn pole(&self) -> RotatedPole {
    RotatedPole::new(self.rotated_pole.lon, self.rotated_pole.lat)
  }

  pub fn member_levels(&self) -> Result<MemberLevels> {
    MemberLevels::from_levels(&self.perturbation_levels)
  }

  pub fn members(&self) -> usize { self.perturbation_levels.len() + 1 }

  pub fn filter(&self) -> Sekf<f64> {
    Sekf {
      upper_limit: self.upper_limit,
      b_scale: self.b_scale,
      perturbation_band: self.perturbation_band.map(|[lo, hi]| (lo, hi) ),
    }
  }

  pub fn perturbation_design(&self) -> Result<PerturbationDesign> {
    PerturbationDesign::new(self.perturbation.scale, self.perturbation.random)
  }

  pub fn layout(&self) -> Result<&ExperimentLayout> {
    self.layout.as_ref()
      .ok_or_else(|| Error::Config("`layout` is required to drive a cycle".into()) )
  }
}

#[cfg(test)]
mod test {
  use super::*;

  const MINIMAL: &str = r#"{
    "upper_limit": 100.0,
    "b_scale": 0.1,
    "perturbation_levels": [0, 1, 2],
    "assim_vars": ["H2OSOI_LIQ"],
    "obs_time_window": [0, 10800],
    "rotated_pole": { "lon": -171.0, "lat": 41.5 },
    "obs_path": "/obs/t2m.nc",
    "utils_path": "/utils"
  }"#;

  #[test]
  fn defaults() {
    let c = SekfConfig::from_json(MINIMAL).expect("valid");
    assert_eq!(c.observed_var, "T_2M");
    assert_eq!(c.fg_prefix, "lffd");
    assert_eq!(c.moisture_var, "H2OSOI_LIQ");
    assert_eq!(c.soil_level_offset, 5);
    assert_eq!(c.density, 1000.0);
    assert_eq!(c.obs_match_tolerance, 0.05);
    assert_eq!(c.perturbation_band, None);
    assert_eq!(c.perturbation, PerturbationConfig::default());
    assert_eq!(c.members(), 4);
    assert!(c.layout().is_err());
    assert_eq!(c.atmos_analysis, None);
    assert_eq!(c.filter(), Sekf { upper_limit: 100.0, b_scale: 0.1, perturbation_band: None });
  }

  fn with(key: &str, value: &str) -> String {
    let mut v: serde_json::Value = serde_json::from_str(MINIMAL).expect("json");
    v[key] = serde_json::from_str(value).expect("json");
    v.to_string()
  }

  #[test]
  fn invalid_values_are_rejected() {
    for &(key, value) in [("upper_limit", "0.0"),
                          ("b_scale", "-1.0"),
                          ("perturbation_levels", "[]"),
                          ("perturbation_levels", "[1, 1]"),
                          ("assim_vars", "[]"),
                          ("obs_time_window", "[10, 0]"),
                          ("rotated_pole", r#"{"lon": 0.0, "lat": 95.0}"#),
                          ("perturbation_band", "[0.1, 0.01]"),
                          ("perturbation", r#"{"scale": 0.0}"#),
                          ("atmos_analysis", r#"{"analysis_file": "laf.nc"}"#),
                          ("atmos_analysis", r#"{"bg_files": "lbff%Y%Q.nc"}"#),
                          ("atmos_analysis", r#"{"bg_files": "../lbff%Y.nc"}"#),
                          ("unknown_key", "1")].iter() {
      match SekfConfig::from_json(&with(key, value)) {
        Err(Error::Config(_)) => {},
        other => panic!("{} = {} should be rejected, got {:?}", key, value, other),
      }
    }
  }

  #[test]
  fn nested_sections() {
    let mut text = with("layout", r#"{"experiment_path": "/exp", "parent_model": "cosmo"}"#);
    text = {
      let mut v: serde_json::Value = serde_json::from_str(&text).expect("json");
      v["perturbation"] = serde_json::from_str(r#"{"scale": 0.02, "random": true, "seed": 7}"#)
        .expect("json");
      v["perturbation_band"] = serde_json::from_str("[0.01, 0.1]").expect("json");
      v.to_string()
    };
    let c = SekfConfig::from_json(&text).expect("valid");
    let layout = c.layout().expect("layout");
    assert_eq!(layout.parent_model, "cosmo");
    assert_eq!(layout.finite_pert, "finite_pert");
    assert_eq!(c.perturbation_design().expect("design"),
               PerturbationDesign::Random { scale: 0.02 });
    assert_eq!(c.filter().perturbation_band, Some((0.01, 0.1)));
  }

  #[test]
  fn atmosphere_analysis_names() {
    let c = SekfConfig::from_json(&with("atmos_analysis", r#"{"bg_files": "lbff%Y%m%d%H.nc"}"#))
      .expect("valid");
    let atmos = c.atmos_analysis.as_ref().expect("atmos_analysis");
    assert_eq!(atmos.analysis_file, "laf%Y%m%d%H%M%S.nc");
    let t = Utc.with_ymd_and_hms(2015, 7, 31, 12, 0, 0).unwrap();
    assert_eq!(atmos.background_name(&t).expect("name"), "lbff2015073112.nc");
    assert_eq!(atmos.analysis_name(&t).expect("name"), "laf20150731120000.nc");
  }

  #[test]
  fn missing_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    match SekfConfig::load(&dir.path().join("none.json")) {
      Err(Error::MissingInput { .. }) => {},
      other => panic!("expected a missing input, got {:?}", other),
    }
  }
}
