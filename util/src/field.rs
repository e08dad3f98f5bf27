//! netCDF access for gridded fields: restart files, auxiliary data, first
//! guesses and observations are all read through `FieldFile`.
//!
//! Writes never touch the destination until they are complete. `FieldWriter`
//! creates a fresh file next to it and `FieldPatch` appends to a copy of the
//! source, both renaming over the destination at the end.

use nd::{ArrayD, Array1, Array2, Array3, IxDyn, Ix1, Ix2, Ix3};

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

use na_core::{Error, Result};

/// An opened netCDF file. Variables are read on request.
pub struct FieldFile {
  path: PathBuf,
  file: netcdf::File,
}

impl fmt::Debug for FieldFile {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.debug_struct("FieldFile")
      .field("path", &self.path)
      .finish()
  }
}

impl FieldFile {
  /// `what` names the input in errors, e.g. "background of ens002".
  pub fn open<P>(what: &str, path: P) -> Result<FieldFile>
    where P: AsRef<Path>,
  {
    let path = path.as_ref();
    if !path.exists() {
      return Err(Error::missing_input(what, path, "does not exist"));
    }
    let file = netcdf::open(path)
      .map_err(|e| Error::format(path, e) )?;
    debug!("opened {}", path.display());

    Ok(FieldFile {
      path: path.to_path_buf(),
      file: file,
    })
  }

  pub fn path(&self) -> &Path { &self.path }

  /// A global text attribute.
  pub fn attribute(&self, name: &str) -> Option<String> {
    self.file.attribute(name)
      .and_then(|a| a.value().ok() )
      .and_then(|v| match v {
        netcdf::AttrValue::Str(s) => Some(s),
        _ => None,
      })
  }

  fn var(&self, name: &str) -> Result<netcdf::Variable> {
    self.file.variable(name)
      .ok_or_else(|| Error::missing_input(format!("variable `{}`", name), &self.path,
                                          "not present in file") )
  }

  pub fn dims(&self, name: &str) -> Result<Vec<String>> {
    Ok(self.var(name)?.dimensions().iter().map(|d| d.name().to_string() ).collect())
  }

  pub fn shape(&self, name: &str) -> Result<Vec<usize>> {
    Ok(self.var(name)?.dimensions().iter().map(|d| d.len() ).collect())
  }

  pub fn read(&self, name: &str) -> Result<ArrayD<f64>> {
    let var = self.var(name)?;
    let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len() ).collect();
    if shape.iter().any(|&n| n == 0 ) {
      return Ok(ArrayD::zeros(IxDyn(&shape)));
    }
    let values = var.values::<f64, _>(..)
      .map_err(|e| Error::format(&self.path, format!("reading `{}`: {}", name, e)) )?;
    Ok(ArrayD::from_shape_vec(IxDyn(&shape), values)?)
  }

  /// The hyperslab `ranges` of `name`, one range per dimension.
  pub fn read_slab(&self, name: &str, ranges: &[Range<usize>]) -> Result<ArrayD<f64>> {
    let var = self.var(name)?;
    let shape: Vec<usize> = ranges.iter().map(|r| r.len() ).collect();
    let values = var.values::<f64, _>(ranges)
      .map_err(|e| Error::format(&self.path, format!("reading `{}`: {}", name, e)) )?;
    Ok(ArrayD::from_shape_vec(IxDyn(&shape), values)?)
  }

  fn read_dim<D: nd::Dimension>(&self, name: &str) -> Result<nd::Array<f64, D>> {
    let data = self.read(name)?;
    let ndim = data.ndim();
    data.into_dimensionality::<D>()
      .map_err(|_| Error::format(&self.path, format!("variable `{}` has {} dimensions", name, ndim)) )
  }

  pub fn read1(&self, name: &str) -> Result<Array1<f64>> { self.read_dim::<Ix1>(name) }
  pub fn read2(&self, name: &str) -> Result<Array2<f64>> { self.read_dim::<Ix2>(name) }
  pub fn read3(&self, name: &str) -> Result<Array3<f64>> { self.read_dim::<Ix3>(name) }
}

/// `<file name>.tmp` next to `path`.
pub fn temp_sibling(path: &Path) -> PathBuf {
  let mut name = path.file_name()
    .map(|n| n.to_os_string() )
    .unwrap_or_default();
  name.push(".tmp");
  path.with_file_name(name)
}

/// Runs `f` on the temporary sibling of `dest` and renames it over `dest`.
/// The sibling is removed if anything fails.
fn via_temp_sibling<F>(dest: &Path, f: F) -> Result<()>
  where F: FnOnce(&Path) -> Result<()>,
{
  if let Some(parent) = dest.parent() {
    fs::create_dir_all(parent)?;
  }
  let tmp = temp_sibling(dest);
  let r = f(&tmp).and_then(|()| fs::rename(&tmp, dest).map_err(Error::from) );
  if r.is_err() && tmp.exists() {
    if let Err(e) = fs::remove_file(&tmp) {
      warn!("could not remove {}: {}", tmp.display(), e);
    }
  }
  r
}

#[derive(Clone, Debug)]
struct WriterVariable {
  name: String,
  dims: Vec<String>,
  data: ArrayD<f64>,
}

/// Builds a netCDF file in memory and writes it atomically.
#[derive(Clone, Debug, Default)]
pub struct FieldWriter {
  attributes: BTreeMap<String, String>,
  variables: Vec<WriterVariable>,
}

impl FieldWriter {
  pub fn new() -> FieldWriter { Default::default() }

  pub fn attribute<K, V>(&mut self, key: K, value: V) -> &mut FieldWriter
    where K: Into<String>,
          V: Into<String>,
  {
    self.attributes.insert(key.into(), value.into());
    self
  }

  pub fn variable<A, D>(&mut self, name: &str, dims: &[&str],
                        values: &nd::ArrayBase<A, D>) -> Result<&mut FieldWriter>
    where A: nd::Data<Elem = f64>,
          D: nd::Dimension,
  {
    if dims.len() != values.ndim() {
      return Err(Error::Config(format!("variable `{}` has {} dimensions but {} names",
                                       name, values.ndim(), dims.len())));
    }
    if self.variables.iter().any(|v| v.name == name ) {
      return Err(Error::Config(format!("variable `{}` written twice", name)));
    }
    self.variables.push(WriterVariable {
      name: name.to_string(),
      dims: dims.iter().map(|d| d.to_string() ).collect(),
      data: values.to_owned().into_dyn(),
    });
    Ok(self)
  }

  /// Dimension lengths in order of first use.
  fn dimensions(&self) -> Result<Vec<(&str, usize)>> {
    let mut dims: Vec<(&str, usize)> = Vec::new();
    for var in self.variables.iter() {
      for (name, &len) in var.dims.iter().zip(var.data.shape().iter()) {
        match dims.iter().find(|&&(n, _)| n == name.as_str() ) {
          Some(&(_, known)) if known != len => {
            return Err(Error::Config(format!("dimension `{}` is {} long in `{}` but {} before",
                                             name, len, var.name, known)));
          },
          Some(_) => {},
          None => dims.push((name.as_str(), len)),
        }
      }
    }
    Ok(dims)
  }

  /// Writes to a temporary sibling and renames it over `path`.
  pub fn write(&self, path: &Path) -> Result<()> {
    let dims = self.dimensions()?;
    via_temp_sibling(path, |tmp| {
      let nc_err = |e: netcdf::error::Error| Error::format(tmp, e);
      let mut file = netcdf::create(tmp).map_err(nc_err)?;
      for &(name, len) in dims.iter() {
        file.add_dimension(name, len).map_err(nc_err)?;
      }
      for (key, value) in self.attributes.iter() {
        file.add_attribute(key, value.as_str()).map_err(nc_err)?;
      }
      for var in self.variables.iter() {
        let names: Vec<&str> = var.dims.iter().map(|d| d.as_str() ).collect();
        let mut v = file.add_variable::<f64>(&var.name, &names).map_err(nc_err)?;
        if var.data.is_empty() {
          continue;
        }
        let values: Vec<f64> = var.data.iter().cloned().collect();
        v.put_values(&values, ..).map_err(nc_err)?;
      }
      Ok(())
    })?;
    debug!("wrote {}", path.display());
    Ok(())
  }
}

/// Element-wise overwrites of an existing field file. Variables and elements
/// not touched keep their values.
#[derive(Clone, Debug, Default)]
pub struct FieldPatch {
  entries: Vec<(String, Vec<usize>, f64)>,
}

/// The values of one variable inside the bounding box of its patched
/// elements.
struct Slab {
  name: String,
  ranges: Vec<Range<usize>>,
  values: ArrayD<f64>,
}

impl FieldPatch {
  pub fn new() -> FieldPatch { Default::default() }

  pub fn set(&mut self, variable: &str, index: &[usize], value: f64) {
    self.entries.push((variable.to_string(), index.to_vec(), value));
  }

  pub fn len(&self) -> usize { self.entries.len() }
  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  fn slabs(&self, source: &FieldFile) -> Result<Vec<Slab>> {
    let mut by_var: BTreeMap<&str, Vec<(&[usize], f64)>> = BTreeMap::new();
    for &(ref name, ref index, value) in self.entries.iter() {
      by_var.entry(name.as_str()).or_insert_with(Vec::new).push((index.as_slice(), value));
    }

    let mut slabs = Vec::with_capacity(by_var.len());
    for (name, entries) in by_var.into_iter() {
      let shape = source.shape(name)?;
      let mut lo = vec![usize::max_value(); shape.len()];
      let mut hi = vec![0; shape.len()];
      for &(index, _) in entries.iter() {
        let inside = index.len() == shape.len() &&
          index.iter().zip(shape.iter()).all(|(&i, &n)| i < n );
        if !inside {
          return Err(Error::Config(format!("index {:?} is outside `{}` {:?}",
                                           index, name, shape)));
        }
        for (d, &i) in index.iter().enumerate() {
          lo[d] = lo[d].min(i);
          hi[d] = hi[d].max(i + 1);
        }
      }
      let ranges: Vec<Range<usize>> = lo.into_iter().zip(hi.into_iter())
        .map(|(a, b)| a..b )
        .collect();
      let mut values = source.read_slab(name, &ranges)?;
      for &(index, value) in entries.iter() {
        let local: Vec<usize> = index.iter().zip(ranges.iter())
          .map(|(&i, r)| i - r.start )
          .collect();
        values[IxDyn(&local)] = value;
      }
      slabs.push(Slab {
        name: name.to_string(),
        ranges: ranges,
        values: values,
      });
    }
    Ok(slabs)
  }

  /// Copies `source` to a temporary sibling of `dest`, writes the patched
  /// slabs into the copy and renames it to `dest`. Returns the number of
  /// elements set.
  pub fn commit(&self, source: &FieldFile, dest: &Path) -> Result<usize> {
    let slabs = self.slabs(source)?;
    via_temp_sibling(dest, |tmp| {
      fs::copy(source.path(), tmp)?;
      if slabs.is_empty() {
        return Ok(());
      }
      let nc_err = |e: netcdf::error::Error| Error::format(tmp, e);
      let mut file = netcdf::append(tmp).map_err(nc_err)?;
      for slab in slabs.iter() {
        let mut var = file.variable_mut(&slab.name)
          .ok_or_else(|| Error::format(tmp, format!("variable `{}` vanished from the copy",
                                                    slab.name)) )?;
        let values: Vec<f64> = slab.values.iter().cloned().collect();
        var.put_values(&values, slab.ranges.as_slice()).map_err(nc_err)?;
      }
      Ok(())
    })?;

    debug!("committed {} patched elements from {} to {}",
           self.entries.len(), source.path().display(), dest.display());
    Ok(self.entries.len())
  }
}
