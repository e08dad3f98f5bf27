//! Rotated-pole coordinates, as used by limited-area atmosphere models.
//!
//! The rotated system is obtained by moving the north pole to
//! (`lat`, `lon`) in geographic coordinates; no additional rotation about the
//! new pole is applied. The rotated equator/prime meridian crossing therefore
//! sits at geographic (90 - `lat`, `lon` + 180).

use nd::{Array1, ArrayView1, Zip};

const RAD: f64 = ::std::f64::consts::PI / 180.0;

/// Avoids atan2(0, 0) at the rotated poles.
const MIN_DENOM: f64 = 1.0e-20;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RotatedPole {
  /// Geographic longitude of the rotated north pole, degrees.
  pub lon: f64,
  /// Geographic latitude of the rotated north pole, degrees.
  pub lat: f64,
}

fn normalize_lon(lon: f64) -> f64 {
  let mut lon = lon % 360.0;
  if lon > 180.0 {
    lon -= 360.0;
  } else if lon <= -180.0 {
    lon += 360.0;
  }
  lon
}

impl RotatedPole {
  pub fn new(lon: f64, lat: f64) -> RotatedPole {
    RotatedPole {
      lon: lon,
      lat: lat,
    }
  }

  /// Geographic (lat, lon) to rotated (rlat, rlon), all in degrees.
  pub fn to_rotated(&self, lat: f64, lon: f64) -> (f64, f64) {
    let (sin_pol, cos_pol) = (self.lat * RAD).sin_cos();
    let lam_pol = self.lon * RAD;

    let phi = lat * RAD;
    let dlam = normalize_lon(lon) * RAD - lam_pol;
    let (sin_phi, cos_phi) = phi.sin_cos();

    let arg = cos_pol * cos_phi * dlam.cos() + sin_pol * sin_phi;
    let rlat = arg.max(-1.0).min(1.0).asin() / RAD;

    let num = -dlam.sin() * cos_phi;
    let mut den = -sin_pol * cos_phi * dlam.cos() + cos_pol * sin_phi;
    if den.abs() < MIN_DENOM {
      den = MIN_DENOM;
    }
    let rlon = num.atan2(den) / RAD;

    (rlat, rlon)
  }

  /// Rotated (rlat, rlon) back to geographic (lat, lon), all in degrees.
  pub fn to_geographic(&self, rlat: f64, rlon: f64) -> (f64, f64) {
    let (sin_pol, cos_pol) = (self.lat * RAD).sin_cos();
    let lam_pol = self.lon * RAD;
    let (sin_lp, cos_lp) = lam_pol.sin_cos();

    let (sin_rphi, cos_rphi) = (rlat * RAD).sin_cos();
    let (sin_rlam, cos_rlam) = (normalize_lon(rlon) * RAD).sin_cos();

    let arg = cos_pol * cos_rphi * cos_rlam + sin_pol * sin_rphi;
    let lat = arg.max(-1.0).min(1.0).asin() / RAD;

    let common = -sin_pol * cos_rlam * cos_rphi + cos_pol * sin_rphi;
    let num = sin_lp * common - cos_lp * sin_rlam * cos_rphi;
    let mut den = cos_lp * common + sin_lp * sin_rlam * cos_rphi;
    if den.abs() < MIN_DENOM {
      den = MIN_DENOM;
    }
    let lon = num.atan2(den) / RAD;

    (lat, lon)
  }

  /// Transforms every (lat, lon) pair; returns (rlat, rlon).
  pub fn transform_points(&self, lat: ArrayView1<f64>, lon: ArrayView1<f64>)
    -> (Array1<f64>, Array1<f64>)
  {
    assert_eq!(lat.len(), lon.len());
    let mut rlat = Array1::zeros(lat.len());
    let mut rlon = Array1::zeros(lat.len());
    Zip::from(&mut rlat)
      .and(&mut rlon)
      .and(&lat)
      .and(&lon)
      .for_each(|rlat, rlon, &lat, &lon| {
        let (a, b) = self.to_rotated(lat, lon);
        *rlat = a;
        *rlon = b;
      });
    (rlat, rlon)
  }
}
