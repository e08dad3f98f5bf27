//! Stages one cycle around `run_sekf`: directories, input links, the
//! atmosphere analysis, the update and publication of the analysis. Every
//! step may be repeated.

use chrono::{DateTime, Utc};

use std::fmt;
use std::path::PathBuf;

use na_core::{Error, Result};
use na_sekf::MemberId;
use util::atmos::find_first_guess_files;
use util::layout::{analysis_file_name, ensure_dir, replace_symlink, restart_file_name,
                   ExperimentLayout};

use crate::config::SekfConfig;
use crate::engine::{run_sekf, CycleContext};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum CycleState {
  Pending,
  DirsCreated,
  InputLinked,
  AtmosphereLinked,
  Assimilated,
  AnalysisLinked,
}

impl fmt::Display for CycleState {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let s = match self {
      &CycleState::Pending => "pending",
      &CycleState::DirsCreated => "directories created",
      &CycleState::InputLinked => "input linked",
      &CycleState::AtmosphereLinked => "atmosphere analysis linked",
      &CycleState::Assimilated => "assimilated",
      &CycleState::AnalysisLinked => "analysis linked",
    };
    f.write_str(s)
  }
}

pub struct CycleDriver {
  ctx: CycleContext,
  layout: ExperimentLayout,
  state: CycleState,
}

impl CycleDriver {
  /// A driver for the cycle starting at `start` whose analysis is valid at
  /// `analysis`. The run directory follows the experiment layout.
  pub fn new(config: SekfConfig,
             start: DateTime<Utc>,
             analysis: DateTime<Utc>) -> Result<CycleDriver> {
    config.validate()?;
    let layout = config.layout()?.clone();
    if analysis < start {
      return Err(Error::Config(format!("analysis time {} is before the cycle start {}",
                                       analysis, start)));
    }
    let ctx = CycleContext {
      run_dir: layout.run_dir(&start),
      config: config,
      start_time: start,
      analysis_time: analysis,
    };
    Ok(CycleDriver {
      ctx: ctx,
      layout: layout,
      state: CycleState::Pending,
    })
  }

  pub fn state(&self) -> CycleState { self.state }
  pub fn context(&self) -> &CycleContext { &self.ctx }

  fn advance(&mut self, to: CycleState) {
    if to > self.state {
      debug!("cycle {} -> {}", self.state, to);
      self.state = to;
    }
  }

  fn require(&self, state: CycleState, step: &str) -> Result<()> {
    if self.state < state {
      return Err(Error::Config(format!("cannot {} while the cycle is {}", step, self.state)));
    }
    Ok(())
  }

  /// Path of the published analysis link.
  pub fn analysis_link(&self) -> PathBuf {
    self.layout.analysis_dir(&self.ctx.analysis_time)
      .join(analysis_file_name(&self.ctx.analysis_time))
  }

  pub fn create_dirs(&mut self) -> Result<()> {
    let dirs = self.ctx.run_dirs();
    for m in 0..self.ctx.config.members() {
      ensure_dir(&dirs.input(m))?;
    }
    ensure_dir(&dirs.output(0))?;
    ensure_dir(&self.layout.analysis_dir(&self.ctx.analysis_time))?;
    info!("run directory {} prepared", self.ctx.run_dir.display());
    self.advance(CycleState::DirsCreated);
    Ok(())
  }

  /// Links every member's first-guess files and perturbed background into
  /// its input directory.
  pub fn link_input(&mut self) -> Result<()> {
    self.require(CycleState::DirsCreated, "link the input")?;
    let dirs = self.ctx.run_dirs();
    let start = self.ctx.start_time;
    let background_name = analysis_file_name(&self.ctx.analysis_time);
    let restart_name = restart_file_name(&self.ctx.analysis_time);

    for m in 0..self.ctx.config.members() {
      let input = dirs.input(m);
      let parent = self.layout.parent_output(&start, m);
      let files = find_first_guess_files(&parent, &self.ctx.config.fg_prefix)?;
      for file in files.iter() {
        if let Some(name) = file.file_name() {
          replace_symlink(file, &input.join(name))?;
        }
      }

      let background = self.layout.finite_pert_output(&start, m).join(&background_name);
      if !background.exists() {
        return Err(Error::missing_input(format!("perturbed background of member {}", m + 1),
                                        &background, "does not exist"));
      }
      replace_symlink(&background, &input.join(&restart_name))?;
      debug!("linked {} first-guess files and the background of member {}",
             files.len(), m + 1);
    }
    info!("input of {} members linked", self.ctx.config.members());
    self.advance(CycleState::InputLinked);
    Ok(())
  }

  /// Publishes the atmosphere background of the control as the atmosphere
  /// analysis, in the run's output and in the analysis directory. Returns
  /// the published link, `None` when `atmos_analysis` is not configured.
  pub fn link_atmosphere_analysis(&mut self) -> Result<Option<PathBuf>> {
    self.require(CycleState::InputLinked, "link the atmosphere analysis")?;
    let linked = match self.ctx.config.atmos_analysis {
      Some(ref atmos) => {
        let time = &self.ctx.analysis_time;
        let background = self.layout.parent_output(&self.ctx.start_time, MemberId::CONTROL.0)
          .join(atmos.background_name(time)?);
        if !background.exists() {
          return Err(Error::missing_input("atmosphere background", &background,
                                          "does not exist"));
        }
        let name = atmos.analysis_name(time)?;
        replace_symlink(&background, &self.ctx.run_dirs().output(MemberId::CONTROL.0).join(&name))?;
        let link = self.layout.analysis_dir(time).join(&name);
        replace_symlink(&background, &link)?;
        info!("atmosphere analysis published at {}", link.display());
        Some(link)
      },
      None => {
        debug!("no atmosphere analysis configured");
        None
      },
    };
    self.advance(CycleState::AtmosphereLinked);
    Ok(linked)
  }

  pub fn assimilate(&mut self) -> Result<PathBuf> {
    self.require(CycleState::AtmosphereLinked, "assimilate")?;
    let path = run_sekf(&self.ctx)?;
    self.advance(CycleState::Assimilated);
    Ok(path)
  }

  pub fn link_analysis(&mut self) -> Result<PathBuf> {
    self.require(CycleState::Assimilated, "publish the analysis")?;
    let analysis = self.ctx.analysis_path();
    let link = self.analysis_link();
    replace_symlink(&analysis, &link)?;
    info!("analysis published at {}", link.display());
    self.advance(CycleState::AnalysisLinked);
    Ok(link)
  }

  /// All remaining steps, in order.
  pub fn run_all(&mut self) -> Result<PathBuf> {
    if self.state < CycleState::DirsCreated {
      self.create_dirs()?;
    }
    if self.state < CycleState::InputLinked {
      self.link_input()?;
    }
    if self.state < CycleState::AtmosphereLinked {
      self.link_atmosphere_analysis()?;
    }
    if self.state < CycleState::Assimilated {
      self.assimilate()?;
    }
    self.link_analysis()
  }
}
