//! Every artifact is a raw little-endian `f64` file (`<name>.bin`, row-major)
//! with an XDMF descriptor (`<name>.xdmf`) next to it naming the dimensions,
//! the shape and the coordinate values. Writing is best-effort: failures are
//! reported, never propagated into the cycle.

use nd::{ArrayBase, Data, Dimension};

use std::fmt::Write as FmtWrite;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use na_core::{Error, Result};
use na_sekf::{Assimilation, LevelIndex};

/// Axis of an artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dim {
  Time,
  Level,
  Cell,
}

impl Dim {
  fn name(&self) -> &'static str {
    match self {
      &Dim::Time => "time",
      &Dim::Level => "level",
      &Dim::Cell => "cell",
    }
  }
}

/// Coordinate values shared by all artifacts of one cycle.
#[derive(Clone, Debug, Default)]
pub struct Coordinates {
  /// Seconds since the Unix epoch.
  pub time: Vec<i64>,
  pub level: Vec<LevelIndex>,
  pub lat: Vec<f64>,
  pub lon: Vec<f64>,
}

impl Coordinates {
  fn len(&self, dim: Dim) -> usize {
    match dim {
      Dim::Time => self.time.len(),
      Dim::Level => self.level.len(),
      Dim::Cell => self.lat.len(),
    }
  }

  fn values(&self, dim: Dim) -> String {
    let v: Vec<String> = match dim {
      Dim::Time => self.time.iter().map(|t| t.to_string() ).collect(),
      Dim::Level => self.level.iter().map(|l| l.0.to_string() ).collect(),
      Dim::Cell => (0..self.lat.len()).map(|c| c.to_string() ).collect(),
    };
    v.join(" ")
  }
}

fn join_f64(values: &[f64]) -> String {
  values.iter()
    .map(|v| v.to_string() )
    .collect::<Vec<_>>()
    .join(" ")
}

#[derive(Clone, Debug)]
pub struct DiagnosticsWriter {
  dir: PathBuf,
  suffix: Option<String>,
}

impl DiagnosticsWriter {
  pub fn new<P: Into<PathBuf>>(dir: P) -> DiagnosticsWriter {
    DiagnosticsWriter {
      dir: dir.into(),
      suffix: None,
    }
  }

  /// A writer whose artifact names end in `_<variable>`.
  pub fn for_variable(&self, variable: &str) -> DiagnosticsWriter {
    DiagnosticsWriter {
      dir: self.dir.clone(),
      suffix: Some(variable.to_string()),
    }
  }

  pub fn dir(&self) -> &Path { &self.dir }

  pub fn artifact_name(&self, name: &str) -> String {
    match self.suffix {
      Some(ref s) => format!("{}_{}", name, s),
      None => name.to_string(),
    }
  }

  /// Writes one artifact; returns the descriptor's path.
  pub fn write<S, D>(&self, name: &str,
                     data: &ArrayBase<S, D>,
                     dims: &[Dim],
                     coords: &Coordinates) -> Result<PathBuf>
    where S: Data<Elem = f64>,
          D: Dimension,
  {
    let name = self.artifact_name(name);
    let bin_name = format!("{}.bin", name);
    let bin_path = self.dir.join(&bin_name);
    let xdmf_path = self.dir.join(format!("{}.xdmf", name));

    let persist = |path: &Path, source: io::Error| {
      Error::DiagnosticPersistence {
        name: name.clone(),
        path: path.to_path_buf(),
        source: source,
      }
    };

    if dims.len() != data.ndim() {
      let e = io::Error::new(io::ErrorKind::InvalidInput,
                             format!("{} dimension names for a {}-d array",
                                     dims.len(), data.ndim()));
      return Err(persist(&xdmf_path, e));
    }

    fs::create_dir_all(&self.dir)
      .map_err(|e| persist(&self.dir, e) )?;

    write_bin(&bin_path, data)
      .map_err(|e| persist(&bin_path, e) )?;

    let descriptor = describe(&name, &bin_name, data.shape(), dims, coords);
    fs::write(&xdmf_path, descriptor)
      .map_err(|e| persist(&xdmf_path, e) )?;

    debug!("diagnostic `{}` written to {}", name, xdmf_path.display());
    Ok(xdmf_path)
  }

  /// `write`, logging a failure instead of returning it.
  pub fn write_or_warn<S, D>(&self, name: &str,
                             data: &ArrayBase<S, D>,
                             dims: &[Dim],
                             coords: &Coordinates) -> Option<PathBuf>
    where S: Data<Elem = f64>,
          D: Dimension,
  {
    match self.write(name, data, dims, coords) {
      Ok(p) => Some(p),
      Err(e) => {
        warn!("{}", e);
        None
      },
    }
  }

  /// Innovation, Jacobian, gain and increment of one cycle. Returns the
  /// number of artifacts that were written.
  pub fn write_assimilation(&self, ana: &Assimilation<f64>, coords: &Coordinates) -> usize {
    let written = [
      self.write_or_warn("innovation", &ana.innovation, &[Dim::Time, Dim::Cell], coords),
      self.write_or_warn("jacobian", &ana.jacobian, &[Dim::Time, Dim::Level, Dim::Cell], coords),
      self.write_or_warn("gain", &ana.gain, &[Dim::Time, Dim::Level, Dim::Cell], coords),
      self.write_or_warn("increment", &ana.increment, &[Dim::Level, Dim::Cell], coords),
    ];
    written.iter().filter(|w| w.is_some() ).count()
  }
}

fn write_bin<S, D>(path: &Path, data: &ArrayBase<S, D>) -> io::Result<()>
  where S: Data<Elem = f64>,
        D: Dimension,
{
  let mut bin = BufWriter::new(File::create(path)?);
  for v in data.iter() {
    bin.write_all(&v.to_le_bytes())?;
  }
  bin.flush()
}

fn describe(name: &str, bin_name: &str, shape: &[usize],
            dims: &[Dim], coords: &Coordinates) -> String {
  let shape_str = shape.iter()
    .map(|n| n.to_string() )
    .collect::<Vec<_>>()
    .join(" ");
  let dim_names = dims.iter()
    .map(|d| d.name() )
    .collect::<Vec<_>>()
    .join(" ");

  let mut x = String::new();
  // writing into a String cannot fail
  let _ = write!(x, r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE Xdmf SYSTEM "Xdmf.dtd" []>
<Xdmf Version="2.0">
<Domain>
    <Grid Name="{name}" GridType="Uniform">
        <Information Name="dimensions" Value="{dim_names}"/>
"#, name = name, dim_names = dim_names);

  for (&dim, &n) in dims.iter().zip(shape.iter()) {
    let values = if coords.len(dim) == n {
      coords.values(dim)
    } else {
      (0..n).map(|i| i.to_string() ).collect::<Vec<_>>().join(" ")
    };
    let _ = write!(x, r#"        <Information Name="{dim}" Value="{values}"/>
"#, dim = dim.name(), values = values);
  }

  if let Some(pos) = dims.iter().position(|&d| d == Dim::Cell ) {
    let cells = shape[pos];
    if coords.lat.len() == cells && coords.lon.len() == cells {
      let _ = write!(x, r#"        <Topology TopologyType="Polyvertex" NumberOfElements="{cells}"/>
        <Geometry GeometryType="X_Y">
            <DataItem Format="XML" NumberType="Float" Dimensions="{cells}">
            {lon}
            </DataItem>
            <DataItem Format="XML" NumberType="Float" Dimensions="{cells}">
            {lat}
            </DataItem>
        </Geometry>
"#, cells = cells, lon = join_f64(&coords.lon), lat = join_f64(&coords.lat));
    }
  }

  let _ = write!(x, r#"        <Attribute Name="{name}" Center="Node">
            <DataItem Format="Binary"
             DataType="Float" Precision="8" Endian="Little"
             Dimensions="{shape}">
                {bin}
            </DataItem>
        </Attribute>
    </Grid>
</Domain>
</Xdmf>
"#, name = name, shape = shape_str, bin = bin_name);
  x
}
