//! Bilinear interpolation from a rectilinear rotated grid onto scattered
//! target columns. Weights are computed once per target and reused for every
//! time slice and ensemble member.

use nd::prelude::*;
use nd::Zip;

use na_core::{Error, Operator, Result};

use crate::rotated::RotatedPole;

/// The native axes of the source (atmosphere) grid.
#[derive(Clone, Debug, PartialEq)]
pub struct RotatedGrid {
  pub rlat: Array1<f64>,
  pub rlon: Array1<f64>,
}

impl RotatedGrid {
  pub fn new(rlat: Array1<f64>, rlon: Array1<f64>) -> Result<RotatedGrid> {
    check_axis("rlat", rlat.view())?;
    check_axis("rlon", rlon.view())?;
    Ok(RotatedGrid {
      rlat: rlat,
      rlon: rlon,
    })
  }

  /// (ny, nx)
  pub fn dim(&self) -> (usize, usize) {
    (self.rlat.len(), self.rlon.len())
  }
  pub fn len(&self) -> usize {
    self.rlat.len() * self.rlon.len()
  }
}

fn check_axis(name: &str, axis: ArrayView1<f64>) -> Result<()> {
  if axis.len() == 0 {
    return Err(Error::Config(format!("source axis `{}` is empty", name)));
  }
  if axis.iter().any(|v| !v.is_finite() ) {
    return Err(Error::Config(format!("source axis `{}` has non-finite values", name)));
  }
  if axis.len() > 1 {
    let ascending = axis[1] > axis[0];
    let monotonic = (1..axis.len())
      .all(|k| if ascending { axis[k] > axis[k - 1] } else { axis[k] < axis[k - 1] } );
    if !monotonic {
      return Err(Error::Config(format!("source axis `{}` is not strictly monotonic", name)));
    }
  }
  Ok(())
}

/// Lower bracketing index and the fractional distance towards the next point.
/// `None` outside the closed range of the axis.
fn locate(axis: ArrayView1<f64>, x: f64) -> Option<(usize, f64)> {
  let n = axis.len();
  if !x.is_finite() {
    return None;
  }
  if n == 1 {
    return if x == axis[0] { Some((0, 0.0)) } else { None };
  }

  let ascending = axis[n - 1] > axis[0];
  let (lo, hi) = if ascending { (axis[0], axis[n - 1]) } else { (axis[n - 1], axis[0]) };
  if x < lo || x > hi {
    return None;
  }

  // first index whose value is past `x` in axis order
  let mut left = 0;
  let mut right = n;
  while left < right {
    let mid = (left + right) / 2;
    let past = if ascending { axis[mid] > x } else { axis[mid] < x };
    if past {
      right = mid;
    } else {
      left = mid + 1;
    }
  }
  let i = if left == 0 { 0 } else { ::std::cmp::min(left - 1, n - 2) };
  let frac = (x - axis[i]) / (axis[i + 1] - axis[i]);
  Some((i, frac))
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Weight {
  j: usize,
  i: usize,
  val: f64,
}

/// Precomputed bilinear weights from a rotated source grid onto target
/// columns given in geographic coordinates.
#[derive(Clone, Debug)]
pub struct Regridder {
  weights: Vec<[Weight; 4]>,
  source_dim: (usize, usize),
  /// Target coordinates in the rotated system, kept for diagnostics.
  pub target_rlat: Array1<f64>,
  pub target_rlon: Array1<f64>,
}

impl Regridder {
  pub fn new(pole: &RotatedPole, grid: &RotatedGrid,
             target_lat: ArrayView1<f64>,
             target_lon: ArrayView1<f64>) -> Result<Regridder> {
    if target_lat.len() != target_lon.len() {
      return Err(Error::Config(format!("target has {} latitudes but {} longitudes",
                                       target_lat.len(), target_lon.len())));
    }

    let (rlat, rlon) = pole.transform_points(target_lat, target_lon);
    let (ny, nx) = grid.dim();

    let mut weights = Vec::with_capacity(rlat.len());
    for cell in 0..rlat.len() {
      let y = locate(grid.rlat.view(), rlat[cell]);
      let x = locate(grid.rlon.view(), rlon[cell]);
      let ((j, fy), (i, fx)) = match (y, x) {
        (Some(y), Some(x)) => (y, x),
        _ => {
          return Err(Error::Domain {
            cell: cell,
            lat: target_lat[cell],
            lon: target_lon[cell],
            rlat: rlat[cell],
            rlon: rlon[cell],
          });
        },
      };
      let j1 = if ny > 1 { j + 1 } else { j };
      let i1 = if nx > 1 { i + 1 } else { i };

      weights.push([
        Weight { j: j, i: i, val: (1.0 - fy) * (1.0 - fx) },
        Weight { j: j, i: i1, val: (1.0 - fy) * fx },
        Weight { j: j1, i: i, val: fy * (1.0 - fx) },
        Weight { j: j1, i: i1, val: fy * fx },
      ]);
    }

    debug!("regridder: {} targets onto a {}x{} rotated grid", weights.len(), ny, nx);

    Ok(Regridder {
      weights: weights,
      source_dim: (ny, nx),
      target_rlat: rlat,
      target_rlon: rlon,
    })
  }

  pub fn targets(&self) -> usize { self.weights.len() }

  fn apply(&self, source: ArrayView2<f64>, mut out: ArrayViewMut1<f64>) {
    for (out, weights) in out.iter_mut().zip(self.weights.iter()) {
      // zero weights are skipped so a NaN neighbour on an exact grid line
      // does not leak into the result
      *out = weights.iter()
        .filter(|w| w.val != 0.0 )
        .map(|w| w.val * source[[w.j, w.i]] )
        .sum();
    }
  }

  /// Interpolates every leading-axis slice of `field` (e.g. time, rlat, rlon)
  /// onto the targets, giving (time, cell).
  pub fn regrid(&self, field: ArrayView3<f64>) -> Result<Array2<f64>> {
    let (nt, ny, nx) = field.dim();
    if (ny, nx) != self.source_dim {
      return Err(Error::Config(format!("field is {}x{} but the source grid is {}x{}",
                                       ny, nx, self.source_dim.0, self.source_dim.1)));
    }

    let mut out = Array2::zeros((nt, self.targets()));
    Zip::from(out.axis_iter_mut(Axis(0)))
      .and(field.axis_iter(Axis(0)))
      .par_for_each(|out, slice| {
        self.apply(slice, out);
      });

    Ok(out)
  }
}

impl Operator<f64, Ix1> for Regridder {
  fn operator_input_dim(&self) -> usize { self.source_dim.0 * self.source_dim.1 }
  fn operator_output_dim(&self) -> usize { self.targets() }
  fn eval_at(&self, x: ArrayView1<f64>, out: ArrayViewMut1<f64>) -> Result<()> {
    if x.len() != self.operator_input_dim() || out.len() != self.operator_output_dim() {
      return Err(Error::Config(format!("regridder maps {} -> {} values, got {} -> {}",
                                       self.operator_input_dim(),
                                       self.operator_output_dim(),
                                       x.len(), out.len())));
    }
    let x = x.into_shape(self.source_dim)?;
    self.apply(x, out);
    Ok(())
  }
}

/// Resamples `field` (time, rlat, rlon), defined on `grid` in the rotated
/// system of `pole`, onto the geographic target columns.
pub fn reproject(pole: &RotatedPole, grid: &RotatedGrid,
                 field: ArrayView3<f64>,
                 target_lat: ArrayView1<f64>,
                 target_lon: ArrayView1<f64>) -> Result<Array2<f64>> {
  Regridder::new(pole, grid, target_lat, target_lon)?
    .regrid(field)
}

#[cfg(test)]
mod test {
  use super::*;
  use nd::{arr1, Array3};
  use na_core::PartialEqWithinTol;

  fn grid() -> RotatedGrid {
    RotatedGrid::new(Array1::linspace(-2.0, 2.0, 5),
                     Array1::linspace(-3.0, 3.0, 7))
      .expect("valid axes")
  }

  // Linear in both rotated coordinates, so bilinear interpolation is exact.
  fn linear_field(grid: &RotatedGrid, times: usize) -> Array3<f64> {
    let (ny, nx) = grid.dim();
    Array3::from_shape_fn((times, ny, nx), |(t, j, i)| {
      t as f64 * 10.0 + 2.0 * grid.rlat[j] - 0.5 * grid.rlon[i] + 7.0
    })
  }

  #[test]
  fn locate_both_directions() {
    let asc = arr1(&[0.0, 1.0, 2.0, 3.0]);
    assert_eq!(locate(asc.view(), 1.5), Some((1, 0.5)));
    assert_eq!(locate(asc.view(), 3.0), Some((2, 1.0)));
    assert_eq!(locate(asc.view(), 0.0), Some((0, 0.0)));
    assert_eq!(locate(asc.view(), 3.5), None);

    let desc = arr1(&[3.0, 2.0, 1.0, 0.0]);
    assert_eq!(locate(desc.view(), 2.5), Some((0, 0.5)));
    assert_eq!(locate(desc.view(), 0.0), Some((2, 1.0)));
    assert_eq!(locate(desc.view(), -0.1), None);
  }

  #[test]
  fn linear_field_is_reproduced() {
    let pole = RotatedPole::new(-171.0, 41.5);
    let grid = grid();
    let field = linear_field(&grid, 3);

    // targets given in rotated coordinates, converted to geographic
    let rotated = [(0.3, -1.2), (-1.75, 2.5), (1.9, 2.9), (0.0, 0.0)];
    let mut lat = Array1::zeros(rotated.len());
    let mut lon = Array1::zeros(rotated.len());
    for (c, &(rlat, rlon)) in rotated.iter().enumerate() {
      let (a, b) = pole.to_geographic(rlat, rlon);
      lat[c] = a;
      lon[c] = b;
    }

    let out = reproject(&pole, &grid, field.view(), lat.view(), lon.view())
      .expect("all targets inside the grid");
    assert_eq!(out.dim(), (3, rotated.len()));
    for t in 0..3 {
      for (c, &(rlat, rlon)) in rotated.iter().enumerate() {
        let expected = t as f64 * 10.0 + 2.0 * rlat - 0.5 * rlon + 7.0;
        assert!(out[[t, c]].partial_eq_within_tol(&expected, 1.0e-6),
                "t = {}, c = {}: {} vs {}", t, c, out[[t, c]], expected);
      }
    }
  }

  #[test]
  fn outside_the_domain_is_an_error() {
    let pole = RotatedPole::new(-171.0, 41.5);
    let grid = grid();
    let (lat_in, lon_in) = pole.to_geographic(0.0, 0.0);
    let (lat_out, lon_out) = pole.to_geographic(2.5, 0.0);
    let lat = arr1(&[lat_in, lat_out]);
    let lon = arr1(&[lon_in, lon_out]);

    match Regridder::new(&pole, &grid, lat.view(), lon.view()) {
      Err(Error::Domain { cell, .. }) => assert_eq!(cell, 1),
      other => panic!("expected a domain error, got {:?}", other),
    }
  }

  #[test]
  fn operator_matches_regrid() {
    let pole = RotatedPole::new(-171.0, 41.5);
    let grid = grid();
    let field = linear_field(&grid, 1);
    let (lat, lon) = pole.to_geographic(0.7, -0.4);
    let regridder = Regridder::new(&pole, &grid, arr1(&[lat]).view(), arr1(&[lon]).view())
      .expect("inside");

    let flat = field.index_axis(Axis(0), 0).to_owned().into_shape(grid.len()).expect("flat");
    let out = regridder.eval(flat.view()).expect("eval");
    let regridded = regridder.regrid(field.view()).expect("regrid");
    assert!(out[0].partial_eq_within_tol(&regridded[[0, 0]], 1.0e-12));
  }

  #[test]
  fn non_monotonic_axis_is_rejected() {
    assert!(RotatedGrid::new(arr1(&[0.0, 1.0, 0.5]), arr1(&[0.0, 1.0])).is_err());
  }
}
