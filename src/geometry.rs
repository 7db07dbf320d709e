//! Planar polyline helpers used for snapping and splitting edges.
//!
//! Coordinates are assumed to be in a projected, metric reference system;
//! projection handling happens before data reaches the network.

use geo::{
    Closest, ClosestPoint, Coord, Distance, Euclidean, Length, LineInterpolatePoint, LineLocatePoint, LineString, Point,
};

/// Result of projecting a point perpendicularly onto a polyline.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    pub point: Coord,
    // Distance along the polyline from its first coordinate.
    pub offset: f64,
    // Distance between the input point and `point`.
    pub distance: f64,
}

pub fn length(line: &LineString) -> f64 {
    Euclidean.length(line)
}

/// Projects `point` onto the closest location of `line`, or `None` for an empty line.
pub fn project(line: &LineString, point: Coord) -> Option<Projection> {
    let target = Point::from(point);
    let closest = match line.0.as_slice() {
        [] => return None,
        [only] => Point::from(*only),
        _ => match line.closest_point(&target) {
            Closest::Intersection(p) | Closest::SinglePoint(p) => p,
            Closest::Indeterminate => return None,
        },
    };
    let offset = match line.line_locate_point(&closest) {
        Some(fraction) => fraction * length(line),
        None => 0.,
    };
    Some(Projection { point: closest.0, offset, distance: Euclidean.distance(closest, target) })
}

/// The coordinate found `offset` units along `line`, clamped to its ends.
pub fn point_at(line: &LineString, offset: f64) -> Option<Coord> {
    let first = *line.0.first()?;
    let total = length(line);
    if total <= 0. || offset <= 0. {
        return Some(first);
    }
    let last = line.0[line.0.len() - 1];
    Some(line.line_interpolate_point((offset / total).min(1.)).map_or(last, |p| p.0))
}

/// Splits `line` at `offset`, returning the parts before and behind that point.
///
/// Both parts share the split coordinate; each has at least two coordinates.
pub fn split_at(line: &LineString, offset: f64) -> Option<(LineString, LineString)> {
    let coords = &line.0;
    if coords.len() < 2 {
        return None;
    }
    let split = point_at(line, offset)?;
    let mut before = vec![coords[0]];
    let mut behind = Vec::new();
    let mut walked = 0.;
    for window in coords.windows(2) {
        let seg_len = Euclidean.distance(Point::from(window[0]), Point::from(window[1]));
        if walked + seg_len < offset {
            before.push(window[1]);
        } else if behind.is_empty() {
            before.push(split);
            behind.push(split);
            behind.push(window[1]);
        } else {
            behind.push(window[1]);
        }
        walked += seg_len;
    }
    if behind.is_empty() {
        // offset lies beyond the end
        behind.push(split);
        behind.push(split);
    }
    Some((LineString::new(before), LineString::new(behind)))
}

pub fn reversed(line: &LineString) -> LineString {
    LineString::new(line.0.iter().rev().copied().collect())
}
