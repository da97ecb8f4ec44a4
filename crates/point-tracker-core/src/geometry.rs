//! Small 2D geometry helpers shared by the tracking and growth crates.
//!
//! Polygons are given as open rings (the closing edge back to the first
//! vertex is implicit). Polylines are open.

use nalgebra::{Point2, Vector2};

/// Breakpoints closer than this (in relative arc length) are the same point.
pub const RATIO_EPS: f64 = 1e-12;

/// Shoelace signed area; positive for counter-clockwise rings.
pub fn signed_area(ring: &[Point2<f64>]) -> f64 {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    let mut acc = 0.0;
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        acc += a.x * b.y - b.x * a.y;
    }
    0.5 * acc
}

#[inline]
pub fn polygon_area(ring: &[Point2<f64>]) -> f64 {
    signed_area(ring).abs()
}

pub fn polyline_length(line: &[Point2<f64>]) -> f64 {
    line.windows(2).map(|w| (w[1] - w[0]).norm()).sum()
}

/// Arithmetic mean of the points, `None` for an empty slice.
pub fn centroid(points: &[Point2<f64>]) -> Option<Point2<f64>> {
    if points.is_empty() {
        return None;
    }
    let sum = points
        .iter()
        .fold(Vector2::zeros(), |acc: Vector2<f64>, p| acc + p.coords);
    Some(Point2::from(sum / points.len() as f64))
}

/// Centre of the axis-aligned bounding box.
pub fn bounding_box_center(points: &[Point2<f64>]) -> Option<Point2<f64>> {
    let first = points.first()?;
    let (mut min, mut max) = (*first, *first);
    for p in &points[1..] {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
    }
    Some(Point2::new(0.5 * (min.x + max.x), 0.5 * (min.y + max.y)))
}

/// Cumulative arc length at each vertex divided by the total length.
///
/// The first entry is 0 and the last is 1. A zero-length polyline yields
/// evenly spaced ratios so that callers still get a monotone sequence.
pub fn arc_length_ratios(line: &[Point2<f64>]) -> Vec<f64> {
    let n = line.len();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![0.0];
    }
    let mut acc = Vec::with_capacity(n);
    let mut total = 0.0;
    acc.push(0.0);
    for w in line.windows(2) {
        total += (w[1] - w[0]).norm();
        acc.push(total);
    }
    if total <= 0.0 {
        return (0..n).map(|i| i as f64 / (n - 1) as f64).collect();
    }
    acc.iter().map(|v| v / total).collect()
}

/// Point at the relative arc-length position `t` in `[0, 1]`.
pub fn point_at_ratio(line: &[Point2<f64>], ratios: &[f64], t: f64) -> Option<Point2<f64>> {
    let first = *line.first()?;
    if t <= 0.0 || line.len() == 1 {
        return Some(first);
    }
    for i in 1..line.len() {
        if t <= ratios[i] {
            let span = ratios[i] - ratios[i - 1];
            if span <= 0.0 {
                return Some(line[i]);
            }
            let u = (t - ratios[i - 1]) / span;
            return Some(line[i - 1] + (line[i] - line[i - 1]) * u);
        }
    }
    line.last().copied()
}

/// Split a polyline at the relative arc-length breakpoints `cuts`.
///
/// `cuts` must be sorted and lie strictly inside `(0, 1)`. Every piece keeps
/// the input vertices it spans, so curved walls stay curved. The pieces
/// share their end points.
pub fn split_polyline(line: &[Point2<f64>], cuts: &[f64]) -> Vec<Vec<Point2<f64>>> {
    let ratios = arc_length_ratios(line);
    let mut pieces = Vec::with_capacity(cuts.len() + 1);
    let mut current: Vec<Point2<f64>> = line.first().copied().into_iter().collect();
    let mut vertex = 1;
    for &cut in cuts {
        while vertex < line.len() && ratios[vertex] < cut - RATIO_EPS {
            current.push(line[vertex]);
            vertex += 1;
        }
        let Some(p) = point_at_ratio(line, &ratios, cut) else {
            break;
        };
        if vertex < line.len() && (ratios[vertex] - cut).abs() <= RATIO_EPS {
            vertex += 1;
        }
        current.push(p);
        pieces.push(std::mem::replace(&mut current, vec![p]));
    }
    current.extend_from_slice(&line[vertex.min(line.len())..]);
    pieces.push(current);
    pieces
}

/// `count` points evenly spaced along the polyline by arc length, starting at
/// its first vertex and excluding its last one.
pub fn discretize_polyline(line: &[Point2<f64>], count: usize) -> Vec<Point2<f64>> {
    let ratios = arc_length_ratios(line);
    (0..count)
        .filter_map(|k| point_at_ratio(line, &ratios, k as f64 / count as f64))
        .collect()
}
