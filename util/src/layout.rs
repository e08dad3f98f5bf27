//! File and directory naming of an assimilation experiment.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use na_core::{Error, Result};

/// Committed analysis of the land-surface model.
pub fn analysis_file_name(time: &DateTime<Utc>) -> String {
  time.format("clm_ana%Y%m%d%H%M%S.nc").to_string()
}

/// Name under which the model expects its restart file.
pub fn restart_file_name(time: &DateTime<Utc>) -> String {
  format!("clmoas.clm2.r.{}-{:05}.nc",
          time.format("%Y-%m-%d"), time.num_seconds_from_midnight())
}

pub fn cycle_dir_name(time: &DateTime<Utc>) -> String {
  time.format("%Y%m%d_%H%M").to_string()
}

pub fn member_dir_name(member: usize) -> String {
  format!("ens{:03}", member + 1)
}

fn default_parent_model() -> String { "terrsysmp".into() }
fn default_finite_pert() -> String { "finite_pert".into() }
fn default_module() -> String { "sekf".into() }

/// Where the cycles of an experiment live.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentLayout {
  pub experiment_path: PathBuf,
  #[serde(default = "default_parent_model")]
  pub parent_model: String,
  #[serde(default = "default_finite_pert")]
  pub finite_pert: String,
  #[serde(default = "default_module")]
  pub module: String,
}

impl ExperimentLayout {
  pub fn new<P: Into<PathBuf>>(experiment_path: P) -> ExperimentLayout {
    ExperimentLayout {
      experiment_path: experiment_path.into(),
      parent_model: default_parent_model(),
      finite_pert: default_finite_pert(),
      module: default_module(),
    }
  }

  pub fn cycle_dir(&self, time: &DateTime<Utc>) -> PathBuf {
    self.experiment_path.join(cycle_dir_name(time))
  }

  /// Output of the forecast model that produced the first guess.
  pub fn parent_output(&self, start: &DateTime<Utc>, member: usize) -> PathBuf {
    self.cycle_dir(start)
      .join(&self.parent_model)
      .join("output")
      .join(member_dir_name(member))
  }

  /// Perturbed backgrounds of the finite perturbation step.
  pub fn finite_pert_output(&self, start: &DateTime<Utc>, member: usize) -> PathBuf {
    self.cycle_dir(start)
      .join(&self.finite_pert)
      .join("output")
      .join(member_dir_name(member))
  }

  pub fn analysis_dir(&self, analysis: &DateTime<Utc>) -> PathBuf {
    self.cycle_dir(analysis)
      .join("analysis")
      .join(member_dir_name(0))
  }

  /// Working directory of this module for a cycle.
  pub fn run_dir(&self, start: &DateTime<Utc>) -> PathBuf {
    self.cycle_dir(start).join(&self.module)
  }
}

/// Input and output directories below a run directory.
#[derive(Clone, Debug, PartialEq)]
pub struct RunDirs {
  pub root: PathBuf,
}

impl RunDirs {
  pub fn new<P: Into<PathBuf>>(root: P) -> RunDirs {
    RunDirs { root: root.into() }
  }

  pub fn input(&self, member: usize) -> PathBuf {
    self.root.join("input").join(member_dir_name(member))
  }
  pub fn output(&self, member: usize) -> PathBuf {
    self.root.join("output").join(member_dir_name(member))
  }
  /// Directory for diagnostics.
  pub fn diagnostics(&self) -> PathBuf {
    self.root.join("output")
  }
}

/// Creates `dir` and its parents if absent.
pub fn ensure_dir(dir: &Path) -> Result<()> {
  fs::create_dir_all(dir)?;
  Ok(())
}

/// Points `link` at `target`. An existing link, dangling or not, is
/// replaced; a regular file or directory at `link` is left alone and
/// reported as `Error::Occupied`.
pub fn replace_symlink(target: &Path, link: &Path) -> Result<()> {
  if !target.exists() {
    return Err(Error::missing_input("link target", target, "does not exist"));
  }
  match fs::symlink_metadata(link) {
    Ok(ref meta) if meta.file_type().is_symlink() => {
      remove_symlink(link)?;
    },
    Ok(_) => {
      return Err(Error::Occupied { path: link.to_path_buf() });
    },
    Err(ref e) if e.kind() == io::ErrorKind::NotFound => {},
    Err(e) => return Err(e.into()),
  }
  if let Some(parent) = link.parent() {
    fs::create_dir_all(parent)?;
  }
  make_symlink(target, link)?;
  debug!("linked {} -> {}", link.display(), target.display());
  Ok(())
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> io::Result<()> {
  ::std::os::unix::fs::symlink(target, link)
}
#[cfg(windows)]
fn make_symlink(target: &Path, link: &Path) -> io::Result<()> {
  ::std::os::windows::fs::symlink_file(target, link)
}

#[cfg(unix)]
fn remove_symlink(link: &Path) -> io::Result<()> {
  fs::remove_file(link)
}
#[cfg(windows)]
fn remove_symlink(link: &Path) -> io::Result<()> {
  // directory links on Windows need remove_dir
  fs::remove_file(link).or_else(|_| fs::remove_dir(link) )
}

#[cfg(test)]
mod test {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn names() {
    let t = Utc.with_ymd_and_hms(2015, 7, 31, 12, 0, 0).unwrap();
    assert_eq!(analysis_file_name(&t), "clm_ana20150731120000.nc");
    assert_eq!(restart_file_name(&t), "clmoas.clm2.r.2015-07-31-43200.nc");
    assert_eq!(restart_file_name(&Utc.with_ymd_and_hms(2015, 7, 31, 0, 0, 9).unwrap()),
               "clmoas.clm2.r.2015-07-31-00009.nc");
    assert_eq!(cycle_dir_name(&t), "20150731_1200");
    assert_eq!(member_dir_name(0), "ens001");
  }

  #[test]
  fn experiment_paths() {
    let layout = ExperimentLayout::new("/exp");
    let start = Utc.with_ymd_and_hms(2015, 7, 31, 9, 0, 0).unwrap();
    let ana = Utc.with_ymd_and_hms(2015, 7, 31, 12, 0, 0).unwrap();
    assert_eq!(layout.parent_output(&start, 2),
               PathBuf::from("/exp/20150731_0900/terrsysmp/output/ens003"));
    assert_eq!(layout.finite_pert_output(&start, 0),
               PathBuf::from("/exp/20150731_0900/finite_pert/output/ens001"));
    assert_eq!(layout.analysis_dir(&ana), PathBuf::from("/exp/20150731_1200/analysis/ens001"));
    assert_eq!(layout.run_dir(&start), PathBuf::from("/exp/20150731_0900/sekf"));
  }

  #[test]
  fn layout_defaults_from_json() {
    let layout: ExperimentLayout = serde_json::from_str(r#"{"experiment_path": "/exp"}"#)
      .expect("parse");
    assert_eq!(layout, ExperimentLayout::new("/exp"));
    assert!(serde_json::from_str::<ExperimentLayout>(r#"{"experiment_path": "/e", "x": 1}"#)
            .is_err());
  }

  #[cfg(unix)]
  #[test]
  fn symlinks_are_replaced() {
    let dir = tempfile::tempdir().expect("tempdir");
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    fs::write(&a, b"a").expect("write");
    fs::write(&b, b"b").expect("write");
    let link = dir.path().join("sub").join("link");

    replace_symlink(&a, &link).expect("link");
    replace_symlink(&a, &link).expect("relink");
    assert_eq!(fs::read(&link).expect("read"), b"a");
    replace_symlink(&b, &link).expect("replace");
    assert_eq!(fs::read(&link).expect("read"), b"b");

    assert!(replace_symlink(&dir.path().join("missing"), &link).is_err());

    // a dangling link is still a link
    fs::remove_file(&b).expect("remove");
    replace_symlink(&a, &link).expect("replace dangling");
    assert_eq!(fs::read(&link).expect("read"), b"a");
  }

  #[cfg(unix)]
  #[test]
  fn real_files_are_not_replaced() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("analysis.nc");
    fs::write(&target, b"new").expect("write");

    let of_record = dir.path().join("ens001").join("clm_ana20150731120000.nc");
    fs::create_dir_all(of_record.parent().expect("parent")).expect("mkdir");
    fs::write(&of_record, b"of record").expect("write");
    match replace_symlink(&target, &of_record) {
      Err(Error::Occupied { path }) => assert_eq!(path, of_record),
      other => panic!("expected an occupied link path, got {:?}", other),
    }
    assert!(!fs::symlink_metadata(&of_record).expect("meta").file_type().is_symlink());
    assert_eq!(fs::read(&of_record).expect("read"), b"of record");

    let occupied_dir = dir.path().join("input");
    fs::create_dir_all(occupied_dir.join("ens001")).expect("mkdir");
    match replace_symlink(&target, &occupied_dir) {
      Err(Error::Occupied { .. }) => {},
      other => panic!("expected an occupied link path, got {:?}", other),
    }
    assert!(occupied_dir.join("ens001").is_dir());
  }
}
