//! The finite-difference perturbation ensemble.
//!
//! Member 0 is the unperturbed control run; every other member perturbed
//! exactly one vertical level. The member ↔ level association is explicit and
//! validated once, before any numerics run.

use nd::{Array3, ArrayView1, ArrayView2, Axis};

use std::collections::HashSet;
use std::fmt;

use na_core::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberId(pub usize);

impl MemberId {
  pub const CONTROL: MemberId = MemberId(0);

  pub fn is_control(&self) -> bool { self.0 == 0 }

  /// On-disk member directory, `ens001` for the control.
  pub fn dir_name(&self) -> String {
    format!("ens{:03}", self.0 + 1)
  }
}
impl fmt::Display for MemberId {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}", self.dir_name())
  }
}

/// Soil level, counted from the first level below the snow layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LevelIndex(pub usize);

impl fmt::Display for LevelIndex {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "level {}", self.0)
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberLevels {
  pairs: Vec<(MemberId, LevelIndex)>,
}

impl MemberLevels {
  /// `levels[m - 1]` is the level perturbed in member `m`.
  pub fn new(levels: &[usize], n_members: usize) -> Result<MemberLevels> {
    if levels.is_empty() {
      return Err(Error::Config("no perturbed levels configured".into()));
    }
    if levels.len() + 1 != n_members {
      return Err(Error::Config(format!("{} perturbed levels need {} ensemble members, found {}",
                                       levels.len(), levels.len() + 1, n_members)));
    }
    let mut seen = HashSet::new();
    for &l in levels.iter() {
      if !seen.insert(l) {
        return Err(Error::Config(format!("level {} is perturbed by more than one member", l)));
      }
    }

    let pairs = levels.iter()
      .enumerate()
      .map(|(i, &l)| (MemberId(i + 1), LevelIndex(l)) )
      .collect();
    Ok(MemberLevels { pairs: pairs })
  }

  pub fn from_levels(levels: &[usize]) -> Result<MemberLevels> {
    MemberLevels::new(levels, levels.len() + 1)
  }

  /// Perturbed members and their levels, in member order.
  pub fn iter(&self) -> ::std::slice::Iter<(MemberId, LevelIndex)> {
    self.pairs.iter()
  }
  pub fn len(&self) -> usize { self.pairs.len() }
  pub fn member_count(&self) -> usize { self.pairs.len() + 1 }

  /// All members including the control.
  pub fn members(&self) -> impl Iterator<Item = MemberId> {
    (0..self.member_count()).map(MemberId)
  }

  pub fn levels(&self) -> Vec<LevelIndex> {
    self.pairs.iter().map(|&(_, l)| l ).collect()
  }
  pub fn max_level(&self) -> LevelIndex {
    self.pairs.iter()
      .map(|&(_, l)| l )
      .max()
      .unwrap_or(LevelIndex(0))
  }
}

#[derive(Clone, Debug)]
pub struct PerturbationEnsemble<E> {
  pub mapping: MemberLevels,
  /// (member, level, cell)
  pub background: Array3<E>,
  /// Model equivalent of the observations, (member, time, cell).
  pub first_guess: Array3<E>,
}

/// One horizontal cell of the ensemble.
#[derive(Clone, Copy, Debug)]
pub struct EnsembleColumn<'a, E: 'a> {
  /// (member, level)
  pub background: ArrayView2<'a, E>,
  /// (member, time)
  pub first_guess: ArrayView2<'a, E>,
}

impl<E> PerturbationEnsemble<E> {
  pub fn new(mapping: MemberLevels,
             background: Array3<E>,
             first_guess: Array3<E>) -> Result<PerturbationEnsemble<E>> {
    let (bg_members, levels, bg_cells) = background.dim();
    let (fg_members, _times, fg_cells) = first_guess.dim();

    if bg_members != mapping.member_count() {
      return Err(Error::missing_input(format!("{} background members", mapping.member_count()),
                                      "<background>",
                                      format!("found {}", bg_members)));
    }
    if fg_members != mapping.member_count() {
      return Err(Error::missing_input(format!("{} first-guess members", mapping.member_count()),
                                      "<first guess>",
                                      format!("found {}", fg_members)));
    }
    if bg_cells != fg_cells {
      return Err(Error::Config(format!("background has {} cells, first guess {}",
                                       bg_cells, fg_cells)));
    }
    if mapping.max_level().0 >= levels {
      return Err(Error::Config(format!("{} is perturbed but the state has {} levels",
                                       mapping.max_level(), levels)));
    }

    Ok(PerturbationEnsemble {
      mapping: mapping,
      background: background,
      first_guess: first_guess,
    })
  }

  pub fn cells(&self) -> usize { self.background.dim().2 }
  pub fn levels(&self) -> usize { self.background.dim().1 }
  pub fn times(&self) -> usize { self.first_guess.dim().1 }

  /// (level, cell)
  pub fn control_background(&self) -> ArrayView2<E> {
    self.background.index_axis(Axis(0), MemberId::CONTROL.0)
  }
  /// (time, cell)
  pub fn control_first_guess(&self) -> ArrayView2<E> {
    self.first_guess.index_axis(Axis(0), MemberId::CONTROL.0)
  }

  pub fn column(&self, cell: usize) -> EnsembleColumn<E> {
    EnsembleColumn {
      background: self.background.index_axis(Axis(2), cell),
      first_guess: self.first_guess.index_axis(Axis(2), cell),
    }
  }

  /// Control background of one cell, (level).
  pub fn control_column(&self, cell: usize) -> ArrayView1<E> {
    self.background.index_axis(Axis(2), cell)
      .index_axis_move(Axis(0), MemberId::CONTROL.0)
  }
}
