use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = ::std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
  /// A required ensemble member, first-guess file, observation file or
  /// auxiliary file is absent or unreadable. Fatal for the cycle.
  #[error("missing input {what} at `{}`: {reason}", .path.display())]
  MissingInput {
    what: String,
    path: PathBuf,
    reason: String,
  },

  /// A target cell falls outside the source grid.
  #[error("cell {cell} at (lat {lat:.4}, lon {lon:.4}) maps to (rlat {rlat:.4}, rlon {rlon:.4}), outside the source grid")]
  Domain {
    cell: usize,
    lat: f64,
    lon: f64,
    rlat: f64,
    rlon: f64,
  },

  /// Writing an audit artifact failed. Never fatal.
  #[error("failed to persist diagnostic `{name}` to `{}`: {source}", .path.display())]
  DiagnosticPersistence {
    name: String,
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("invalid configuration: {0}")]
  Config(String),

  #[error("malformed field data in `{}`: {reason}", .path.display())]
  Format {
    path: PathBuf,
    reason: String,
  },

  /// A link would replace something that is not a link, e.g. an analysis
  /// of record written by another run.
  #[error("`{}` exists and is not a symbolic link, refusing to replace it", .path.display())]
  Occupied {
    path: PathBuf,
  },

  #[error("shape mismatch: {0}")]
  Shape(#[from] nd::ShapeError),

  #[error(transparent)]
  Io(#[from] io::Error),
}

impl Error {
  pub fn missing_input<P, W, R>(what: W, path: P, reason: R) -> Error
    where P: Into<PathBuf>,
          W: Into<String>,
          R: ToString,
  {
    Error::MissingInput {
      what: what.into(),
      path: path.into(),
      reason: reason.to_string(),
    }
  }

  pub fn format<P, R>(path: P, reason: R) -> Error
    where P: Into<PathBuf>,
          R: ToString,
  {
    Error::Format {
      path: path.into(),
      reason: reason.to_string(),
    }
  }

  /// Everything except a diagnostics write aborts the cycle.
  pub fn is_fatal(&self) -> bool {
    match self {
      &Error::DiagnosticPersistence { .. } => false,
      _ => true,
    }
  }
}
