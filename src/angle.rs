//! Phase angle utilities. All angles are in degrees.

/// Wraps an angle into the range [-180, 180).
#[inline]
pub fn wrap_deg(angle: f64) -> f64 {
    let mut norm = (angle + 180.0).rem_euclid(360.0) - 180.0;
    if norm >= 180.0 - 1e-12 {
        norm -= 360.0;
    }
    norm
}

/// Wraps an angle into the range [0, 360).
#[inline]
pub fn wrap_deg_positive(angle: f64) -> f64 {
    let norm = angle.rem_euclid(360.0);
    if norm >= 360.0 - 1e-12 {
        0.0
    } else {
        norm
    }
}

/// Smallest unsigned difference between two phases, in [0, 180].
#[inline]
pub fn circular_distance(a: f64, b: f64) -> f64 {
    wrap_deg(a - b).abs()
}

/// Signed difference `a - b` wrapped into [-180, 180).
#[inline]
pub fn signed_difference(a: f64, b: f64) -> f64 {
    wrap_deg(a - b)
}

/// Weighted circular mean of phases, `None` when the resultant vanishes.
pub fn circular_mean(angles: &[f64], weights: Option<&[f64]>) -> Option<f64> {
    let mut sx = 0.0f64;
    let mut sy = 0.0f64;
    for (i, &a) in angles.iter().enumerate() {
        if !a.is_finite() {
            continue;
        }
        let w = weights.map(|w| w[i]).unwrap_or(1.0);
        if w <= 0.0 {
            continue;
        }
        let r = a.to_radians();
        sx += w * r.cos();
        sy += w * r.sin();
    }
    if sx * sx + sy * sy <= 1e-24 {
        return None;
    }
    Some(sy.atan2(sx).to_degrees())
}
