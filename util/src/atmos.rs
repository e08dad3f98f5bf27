//! First-guess output of the atmosphere model on its rotated grid.

use nd::{Array1, Array3, Axis};

use std::fs;
use std::path::{Path, PathBuf};

use na_core::{Error, Result};
use na_regrid::RotatedGrid;

use crate::field::FieldFile;

/// Files in `dir` whose name starts with `prefix`, sorted by name.
pub fn find_first_guess_files(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
  let entries = fs::read_dir(dir)
    .map_err(|e| Error::missing_input("first-guess directory", dir, e) )?;
  let mut files = Vec::new();
  for entry in entries {
    let entry = entry?;
    let matches = entry.file_name()
      .to_str()
      .map(|n| n.starts_with(prefix) )
      .unwrap_or(false);
    if matches {
      files.push(entry.path());
    }
  }
  if files.is_empty() {
    return Err(Error::missing_input(format!("first-guess files `{}*`", prefix), dir,
                                    "no matching files"));
  }
  files.sort();
  Ok(files)
}

/// One member's first guess, concatenated over all its files.
#[derive(Clone, Debug)]
pub struct FirstGuess {
  /// Seconds since the Unix epoch, ascending.
  pub time: Vec<i64>,
  pub grid: RotatedGrid,
  /// (time, rlat, rlon)
  pub field: Array3<f64>,
}

/// Reads `time`, `rlat`, `rlon` and `variable` from every file and stacks
/// them along time.
pub fn load_first_guess(files: &[PathBuf], variable: &str) -> Result<FirstGuess> {
  let mut time = Vec::new();
  let mut grid: Option<(Array1<f64>, Array1<f64>)> = None;
  let mut slices = Vec::new();

  for path in files.iter() {
    let file = FieldFile::open("first guess", path)?;
    let t = file.read1("time")?;
    let rlat = file.read1("rlat")?;
    let rlon = file.read1("rlon")?;
    let field = file.read3(variable)?;
    if field.dim() != (t.len(), rlat.len(), rlon.len()) {
      return Err(Error::format(path, format!("`{}` is {:?}, axes give ({}, {}, {})",
                                             variable, field.dim(), t.len(),
                                             rlat.len(), rlon.len())));
    }

    match grid {
      Some((ref lat0, ref lon0)) => {
        if lat0 != &rlat || lon0 != &rlon {
          return Err(Error::format(path, "rotated grid differs from the first file"));
        }
      },
      None => { grid = Some((rlat, rlon)); },
    }

    time.extend(t.iter().map(|&t| t.round() as i64 ));
    slices.push(field);
  }

  let (rlat, rlon) = grid
    .ok_or_else(|| Error::missing_input("first guess", "<none>", "no files given") )?;
  let views: Vec<_> = slices.iter().map(|s| s.view() ).collect();
  let field = nd::concatenate(Axis(0), &views)?;

  if time.windows(2).any(|w| w[1] <= w[0] ) {
    return Err(Error::format(&files[0], "first-guess times are not strictly increasing across files"));
  }

  debug!("first guess: {} times on a {}x{} grid from {} files",
         time.len(), rlat.len(), rlon.len(), files.len());

  Ok(FirstGuess {
    time: time,
    grid: RotatedGrid::new(rlat, rlon)?,
    field: field,
  })
}

impl FirstGuess {
  /// The field at each of `times`, which must all be present.
  pub fn select_times(&self, times: &[i64]) -> Result<Array3<f64>> {
    if times.is_empty() {
      let (_, ny, nx) = self.field.dim();
      return Ok(Array3::zeros((0, ny, nx)));
    }
    let mut idx = Vec::with_capacity(times.len());
    for &t in times.iter() {
      match self.time.binary_search(&t) {
        Ok(i) => idx.push(i),
        Err(_) => {
          return Err(Error::missing_input(format!("first guess at time {}", t), "<first guess>",
                                          "time not covered by the model output"));
        },
      }
    }
    Ok(self.field.select(Axis(0), &idx))
  }
}
