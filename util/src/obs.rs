//! Point observations and their assignment to analysis cells.

use nd::{Array1, Array2, ArrayView1};
use rstar::RTree;
use rstar::primitives::GeomWithData;

use std::collections::BTreeSet;
use std::path::Path;

use na_core::{Error, Result};

use crate::field::FieldFile;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Observation {
  /// Seconds since the Unix epoch.
  pub time: i64,
  pub lat: f64,
  pub lon: f64,
  pub value: f64,
  pub variance: f64,
}

#[derive(Clone, Debug, Default)]
pub struct ObservationSet {
  /// The observed quantity, if the file names it.
  pub variable: Option<String>,
  pub observations: Vec<Observation>,
}

/// Reads `time`, `lat`, `lon`, `observations` and `covariance`, all `[obs]`.
pub fn load_observations(path: &Path) -> Result<ObservationSet> {
  let file = FieldFile::open("observations", path)?;
  let time = file.read1("time")?;
  let lat = file.read1("lat")?;
  let lon = file.read1("lon")?;
  let values = file.read1("observations")?;
  let variance = file.read1("covariance")?;

  let n = values.len();
  for &(name, len) in [("time", time.len()), ("lat", lat.len()), ("lon", lon.len()),
                       ("covariance", variance.len())].iter() {
    if len != n {
      return Err(Error::format(path, format!("`{}` has {} entries, `observations` {}",
                                             name, len, n)));
    }
  }

  let observations = (0..n)
    .map(|i| Observation {
      time: time[i].round() as i64,
      lat: lat[i],
      lon: lon[i],
      value: values[i],
      variance: variance[i],
    })
    .collect();

  info!("loaded {} observations from {}", n, path.display());
  Ok(ObservationSet {
    variable: file.attribute("variable"),
    observations: observations,
  })
}

impl ObservationSet {
  pub fn len(&self) -> usize { self.observations.len() }

  /// Observations with `start <= time <= end`.
  pub fn in_window(&self, start: i64, end: i64) -> Vec<Observation> {
    self.observations.iter()
      .filter(|o| o.time >= start && o.time <= end )
      .cloned()
      .collect()
  }

  /// Distinct observation times inside the window, ascending.
  pub fn times_in_window(&self, start: i64, end: i64) -> Vec<i64> {
    self.observations.iter()
      .filter(|o| o.time >= start && o.time <= end )
      .map(|o| o.time )
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect()
  }
}

/// Longitude in `[-180, 180)`.
fn normalize_lon(lon: f64) -> f64 {
  let l = (lon + 180.0) % 360.0;
  if l < 0.0 { l + 360.0 - 180.0 } else { l - 180.0 }
}

type CellPoint = GeomWithData<[f64; 2], usize>;

/// Nearest-cell lookup in (lat, lon) degrees. Cells within the tolerance of
/// the antimeridian are indexed a second time on the far side, so matches
/// across it are found.
pub struct CellIndex {
  tree: RTree<CellPoint>,
  tolerance: f64,
}

impl CellIndex {
  pub fn new(cell_lat: ArrayView1<f64>, cell_lon: ArrayView1<f64>, tolerance: f64) -> CellIndex {
    let mut points = Vec::with_capacity(cell_lat.len());
    for (c, (&lat, &lon)) in cell_lat.iter().zip(cell_lon.iter()).enumerate() {
      let lon = normalize_lon(lon);
      points.push(CellPoint::new([lat, lon], c));
      if lon >= 180.0 - tolerance {
        points.push(CellPoint::new([lat, lon - 360.0], c));
      }
      if lon < -180.0 + tolerance {
        points.push(CellPoint::new([lat, lon + 360.0], c));
      }
    }
    CellIndex {
      tree: RTree::bulk_load(points),
      tolerance: tolerance,
    }
  }

  /// Nearest cell, if within the tolerance.
  pub fn nearest(&self, lat: f64, lon: f64) -> Option<usize> {
    let query = [lat, normalize_lon(lon)];
    self.tree.nearest_neighbor(&query)
      .filter(|p| {
        let g = p.geom();
        let (dlat, dlon) = (g[0] - query[0], g[1] - query[1]);
        dlat * dlat + dlon * dlon <= self.tolerance * self.tolerance
      })
      .map(|p| p.data )
  }
}

/// Observations laid out on (time, cell).
#[derive(Clone, Debug)]
pub struct GriddedObservations {
  pub times: Vec<i64>,
  /// `NaN` where no observation exists.
  pub values: Array2<f64>,
  /// Zero where no observation exists.
  pub variance: Array2<f64>,
  /// Cell latitudes and longitudes, for diagnostics.
  pub lat: Array1<f64>,
  pub lon: Array1<f64>,
  /// Observations that matched no cell.
  pub dropped: usize,
}

impl GriddedObservations {
  pub fn count(&self) -> usize {
    self.values.iter().filter(|v| v.is_finite() ).count()
  }
}

/// Assigns each observation to its time and nearest cell. A later duplicate
/// for the same (time, cell) replaces an earlier one.
pub fn grid_observations(observations: &[Observation],
                         times: &[i64],
                         cell_lat: ArrayView1<f64>,
                         cell_lon: ArrayView1<f64>,
                         tolerance: f64) -> GriddedObservations {
  let cells = cell_lat.len();
  let mut values = Array2::from_elem((times.len(), cells), ::std::f64::NAN);
  let mut variance = Array2::zeros((times.len(), cells));
  let mut dropped = 0;
  let index = CellIndex::new(cell_lat, cell_lon, tolerance);

  for obs in observations.iter() {
    let t = match times.binary_search(&obs.time) {
      Ok(t) => t,
      Err(_) => {
        dropped += 1;
        continue;
      },
    };
    let c = match index.nearest(obs.lat, obs.lon) {
      Some(c) => c,
      None => {
        debug!("observation at ({}, {}) matches no cell within {} degrees",
               obs.lat, obs.lon, tolerance);
        dropped += 1;
        continue;
      },
    };
    if values[[t, c]].is_finite() {
      debug!("duplicate observation for cell {} at {}, keeping the later one", c, obs.time);
    }
    values[[t, c]] = obs.value;
    variance[[t, c]] = obs.variance;
  }

  if dropped > 0 {
    warn!("{} of {} observations dropped, no matching cell or time",
          dropped, observations.len());
  }

  GriddedObservations {
    times: times.to_vec(),
    values: values,
    variance: variance,
    lat: cell_lat.to_owned(),
    lon: cell_lon.to_owned(),
    dropped: dropped,
  }
}
