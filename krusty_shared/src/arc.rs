//! C2 — arc expander: turns a G2/G3 center-format arc into a sequence of
//! short straight chords and feeds them into the planner one at a time.
//!
//! Grounded on `other_examples/.../klipper_estimator__lib-src-arcs.rs`'s
//! `plan_arc`/`get_args` for the center/radius/angular-travel math, with one
//! deliberate divergence: where that reference treats a zero-length
//! angular travel as a full circle, this spec folds any `|Δθ| > π` to the
//! short way around instead (spec.md §4.2's own call).

use std::f64::consts::PI;

use crate::error::ArcError;
use crate::planner::Planner;
use crate::types::{Condition, Position, AXES};

/// Minimum arc radius; anything smaller is numerically meaningless (and
/// likely a malformed I/J pair).
const MIN_RADIUS_MM: f64 = 0.001;

/// Only the XY plane is supported; G17/G18/G19 plane selection for arcs is
/// out of scope (spec.md §4.2 Non-goals).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plane {
    Xy,
    Xz,
    Yz,
}

/// Expands a center-format arc from `current` to `target` and feeds its
/// chords into `planner`. `offset` is the (I, J) vector from `current` to
/// the arc's center, in the plane's two axes. Returns the number of chords
/// emitted.
#[allow(clippy::too_many_arguments)]
pub fn expand_arc(
    planner: &mut Planner,
    plane: Plane,
    current: Position,
    target: Position,
    offset: (f64, f64),
    clockwise: bool,
    feed_rate: f64,
    condition: Condition,
) -> Result<u32, ArcError> {
    if plane != Plane::Xy {
        return Err(ArcError::UnsupportedPlane);
    }

    let (ia, ja) = (0usize, 1usize); // X, Y indices within Position
    let center = (current[ia] + offset.0, current[ja] + offset.1);
    let radius = offset.0.hypot(offset.1);
    if radius < MIN_RADIUS_MM {
        return Err(ArcError::RadiusTooSmall);
    }

    let start_angle = (current[ja] - center.1).atan2(current[ia] - center.0);
    let end_angle = (target[ja] - center.1).atan2(target[ia] - center.0);
    let mut angular_travel = end_angle - start_angle;
    if clockwise {
        if angular_travel >= 0.0 {
            angular_travel -= 2.0 * PI;
        }
    } else if angular_travel <= 0.0 {
        angular_travel += 2.0 * PI;
    }
    // Short-way fold: this spec never treats an arc as a full circle.
    if angular_travel.abs() > PI {
        angular_travel -= angular_travel.signum() * 2.0 * PI;
    }

    let tolerance = planner.settings().arc_tolerance_mm();
    let segments = ((angular_travel.abs() * radius) / (2.0 * (tolerance * (2.0 * radius - tolerance)).sqrt()))
        .ceil();
    let segments = if segments.is_finite() { segments as u32 } else { 1 };
    let segments = segments.clamp(1, 100);

    let mut linear_start = current;
    linear_start[ia] = 0.0;
    linear_start[ja] = 0.0;
    let mut linear_delta = [0.0; AXES];
    for a in 0..AXES {
        if a != ia && a != ja {
            linear_delta[a] = target[a] - current[a];
        }
    }

    for i in 1..=segments {
        let t = i as f64 / segments as f64;
        let mut point = current;
        if i == segments {
            point = target;
        } else {
            let theta = start_angle + angular_travel * t;
            point[ia] = center.0 + radius * theta.cos();
            point[ja] = center.1 + radius * theta.sin();
            for a in 0..AXES {
                if a != ia && a != ja {
                    point[a] = current[a] + linear_delta[a] * t;
                }
            }
        }
        match planner.buffer_line(point, feed_rate, condition) {
            Ok(()) => {}
            Err(crate::error::PlannerError::EmptyBlock) => {
                // A degenerate chord (two segments landing on the same
                // step) is harmless; the arc's shape survives in the rest.
            }
            Err(e) => return Err(ArcError::from(e)),
        }
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;

    fn test_planner() -> Planner {
        Planner::new(200, Settings::new([250.0; AXES], [6000.0; AXES], [500.0; AXES]))
    }

    #[test]
    fn quarter_circle_ccw_lands_on_target() {
        let mut planner = test_planner();
        let current = [0.0, 0.0, 0.0, 0.0];
        let target = [10.0, 10.0, 0.0, 0.0];
        let offset = (0.0, 10.0); // center at (0, 10), radius 10
        let n = expand_arc(
            &mut planner,
            Plane::Xy,
            current,
            target,
            offset,
            false,
            3000.0,
            Condition::default(),
        )
        .unwrap();
        assert!(n >= 1);
        assert_eq!(planner.count(), n as usize);
    }

    #[test]
    fn radius_below_minimum_is_rejected() {
        let mut planner = test_planner();
        let err = expand_arc(
            &mut planner,
            Plane::Xy,
            [0.0, 0.0, 0.0, 0.0],
            [0.0001, 0.0, 0.0, 0.0],
            (0.00001, 0.0),
            false,
            1000.0,
            Condition::default(),
        )
        .unwrap_err();
        assert_eq!(err, ArcError::RadiusTooSmall);
    }

    #[test]
    fn unsupported_plane_is_rejected() {
        let mut planner = test_planner();
        let err = expand_arc(
            &mut planner,
            Plane::Xz,
            [0.0, 0.0, 0.0, 0.0],
            [10.0, 0.0, 0.0, 0.0],
            (0.0, 10.0),
            false,
            1000.0,
            Condition::default(),
        )
        .unwrap_err();
        assert_eq!(err, ArcError::UnsupportedPlane);
    }

    #[test]
    fn large_angular_travel_folds_to_short_way() {
        let mut planner = test_planner();
        // A near-full-circle request; the short-way fold should keep the
        // segment count bounded rather than treating it as a full circle.
        let n = expand_arc(
            &mut planner,
            Plane::Xy,
            [10.0, 0.0, 0.0, 0.0],
            [10.0, 0.001, 0.0, 0.0],
            (-10.0, 0.0),
            false,
            3000.0,
            Condition::default(),
        )
        .unwrap();
        assert!(n <= 100);
    }
}
