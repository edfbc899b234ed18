//! Route projection: distance, progress along the planned route, and a
//! viewport transform that keeps origin, destination and the current
//! position visible with consistent padding.
//!
//! The transform is a single uniform scale-and-center shared by all
//! points, with the Y axis flipped so larger world Y renders higher.

use serde::{Deserialize, Serialize};

use crate::types::{Point2D, ShipmentSnapshot};

// ─── Viewport ─────────────────────────────────────────────────────

/// Bounded drawing surface the route is fitted into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    /// World-unit margin added around the fitted bounds.
    pub padding: f64,
    /// Smallest world extent shown, so nearby points are not blown up.
    pub min_range: f64,
    /// Fraction of the surface the bounds may occupy (0..=1].
    pub fill: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 400.0,
            height: 300.0,
            padding: 10.0,
            min_range: 50.0,
            fill: 0.8,
        }
    }
}

// ─── Projection ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformedPoints {
    pub origin: Point2D,
    pub destination: Point2D,
    pub current_location: Option<Point2D>,
}

/// Derived, non-owned view geometry for one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RouteProjection {
    /// Straight-line distance origin → destination.
    pub distance: f64,
    /// Distance origin → current location (0 without a location).
    pub traveled: f64,
    /// Distance current location → destination (`distance` without a location).
    pub remaining: f64,
    /// Always within `0..=100`.
    pub progress_percent: u8,
    pub transformed_points: TransformedPoints,
}

/// Progress along origin → destination, rounded to whole percent.
///
/// A zero-length route with a known location counts as arrived.
pub fn progress_percent(origin: Point2D, destination: Point2D, current: Option<Point2D>) -> u8 {
    let Some(current) = current else {
        return 0;
    };
    let total = origin.distance_to(destination);
    if total <= f64::EPSILON {
        return 100;
    }
    let ratio = (origin.distance_to(current) / total).min(1.0);
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let percent = (ratio * 100.0).round().clamp(0.0, 100.0) as u8;
    percent
}

/// Fit `points` into `viewport`. Returns a mapping closure shared by all points.
fn fit(points: &[Point2D], viewport: &Viewport) -> impl Fn(Point2D) -> Point2D {
    let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
    for p in points {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }

    let center_x = (min_x + max_x) / 2.0;
    let center_y = (min_y + max_y) / 2.0;
    let range = (max_x - min_x).max(max_y - min_y).max(viewport.min_range);

    let bound_min_x = center_x - range / 2.0 - viewport.padding;
    let bound_min_y = center_y - range / 2.0 - viewport.padding;
    let extent = range + 2.0 * viewport.padding;

    let scale = (viewport.width / extent).min(viewport.height / extent) * viewport.fill;
    let offset_x = (viewport.width - extent * scale) / 2.0;
    let offset_y = (viewport.height - extent * scale) / 2.0;
    let height = viewport.height;

    move |p: Point2D| Point2D {
        x: (p.x - bound_min_x) * scale + offset_x,
        y: height - ((p.y - bound_min_y) * scale + offset_y),
    }
}

/// Project a snapshot. `None` until both endpoints are known.
pub fn project(snapshot: &ShipmentSnapshot, viewport: &Viewport) -> Option<RouteProjection> {
    let origin = snapshot.origin?;
    let destination = snapshot.destination?;
    let current = snapshot.current_location;

    let distance = origin.distance_to(destination);
    let (traveled, remaining) = match current {
        Some(c) => (origin.distance_to(c), c.distance_to(destination)),
        None => (0.0, distance),
    };

    let mut points = vec![origin, destination];
    points.extend(current);
    let transform = fit(&points, viewport);

    Some(RouteProjection {
        distance,
        traveled,
        remaining,
        progress_percent: progress_percent(origin, destination, current),
        transformed_points: TransformedPoints {
            origin: transform(origin),
            destination: transform(destination),
            current_location: current.map(&transform),
        },
    })
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_point() -> impl Strategy<Value = Point2D> {
        (-1000.0f64..1000.0, -1000.0f64..1000.0).prop_map(|(x, y)| Point2D::new(x, y))
    }

    proptest! {
        /// Progress never decreases while moving from origin towards destination.
        #[test]
        fn progress_monotonic_along_path(
            origin in arb_point(),
            destination in arb_point(),
            a in 0.0f64..=1.0,
            b in 0.0f64..=1.0,
        ) {
            prop_assume!(origin.distance_to(destination) > 1.0);
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let at = |t: f64| Point2D::new(
                origin.x + (destination.x - origin.x) * t,
                origin.y + (destination.y - origin.y) * t,
            );
            let p_lo = progress_percent(origin, destination, Some(at(lo)));
            let p_hi = progress_percent(origin, destination, Some(at(hi)));
            prop_assert!(p_lo <= p_hi, "{} > {}", p_lo, p_hi);
        }

        /// Progress stays in range for arbitrary locations.
        #[test]
        fn progress_in_range(
            origin in arb_point(),
            destination in arb_point(),
            current in arb_point(),
        ) {
            let p = progress_percent(origin, destination, Some(current));
            prop_assert!(p <= 100);
        }
    }
}
