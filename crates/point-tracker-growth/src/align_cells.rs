//! Common discretisation of one cell outline at two frames.
//!
//! Vertices present in both rings are anchors. Between two consecutive
//! anchors each ring follows a chain of walls; both chains are cut at the
//! union of the relative arc-length positions of their intermediate vertices,
//! so every piece of one chain has a partner in the other. The pieces are
//! then resampled with the same number of points on both sides.

use log::debug;
use nalgebra::Point2;
use point_tracker_core::geometry::{
    arc_length_ratios, discretize_polyline, polyline_length, split_polyline, RATIO_EPS,
};
use point_tracker_core::{Dataset, PointId};

/// Both outlines cut into matching pieces and resampled.
#[derive(Clone, Debug, PartialEq)]
pub struct AlignedCell {
    /// Pieces of the first outline; `segments_before[k]` matches `segments_after[k]`.
    pub segments_before: Vec<Vec<Point2<f64>>>,
    pub segments_after: Vec<Vec<Point2<f64>>>,
    /// Resampled first outline, index-matched with `points_after`.
    pub points_before: Vec<Point2<f64>>,
    pub points_after: Vec<Point2<f64>>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AlignError {
    #[error("rings share no vertex")]
    NoCommonVertex,
    #[error("vertex {point} is out of order between the two rings")]
    BackwardAnchor { point: PointId },
    #[error("no position for point {point} at frame {frame}")]
    MissingPosition { point: PointId, frame: usize },
    #[error("target vertex count must be positive")]
    NoSamples,
}

/// Align `ring_before` at `frame_before` with `ring_after` at `frame_after`.
///
/// Positions are taken in the reference frame, walls include their curved
/// shape. Each matched piece receives `max(1, ceil(len / dl))` samples with
/// `dl = perimeter_before / target_count`, the same count on both sides.
pub fn align_cells(
    data: &Dataset,
    ring_before: &[PointId],
    ring_after: &[PointId],
    frame_before: usize,
    frame_after: usize,
    target_count: usize,
) -> Result<AlignedCell, AlignError> {
    if target_count == 0 {
        return Err(AlignError::NoSamples);
    }
    let start = ring_before
        .iter()
        .position(|p| ring_after.contains(p))
        .ok_or(AlignError::NoCommonVertex)?;
    let first = ring_before[start];
    let before = rotated(ring_before, start);
    let after = rotated(
        ring_after,
        ring_after
            .iter()
            .position(|&p| p == first)
            .ok_or(AlignError::NoCommonVertex)?,
    );

    // (index in before, index in after), strictly increasing on both sides.
    let mut anchors: Vec<(usize, usize)> = Vec::new();
    for (ia, p) in after.iter().enumerate() {
        let Some(ib) = before.iter().position(|q| q == p) else {
            continue;
        };
        if anchors.last().is_some_and(|&(last, _)| ib <= last) {
            return Err(AlignError::BackwardAnchor { point: *p });
        }
        anchors.push((ib, ia));
    }
    anchors.push((before.len(), after.len()));

    let mut segments_before = Vec::new();
    let mut segments_after = Vec::new();
    for pair in anchors.windows(2) {
        let (b0, a0) = pair[0];
        let (b1, a1) = pair[1];
        let chain_b = chain(data, &before, b0, b1, frame_before)?;
        let chain_a = chain(data, &after, a0, a1, frame_after)?;

        let mut cuts: Vec<f64> = chain_b.interior_ratios();
        cuts.extend(chain_a.interior_ratios());
        cuts.sort_by(f64::total_cmp);
        cuts.dedup_by(|a, b| (*a - *b).abs() <= RATIO_EPS);
        cuts.retain(|&c| c > RATIO_EPS && c < 1.0 - RATIO_EPS);

        segments_before.extend(split_polyline(&chain_b.line, &cuts));
        segments_after.extend(split_polyline(&chain_a.line, &cuts));
    }
    debug_assert_eq!(segments_before.len(), segments_after.len());

    let perimeter: f64 = segments_before.iter().map(|s| polyline_length(s)).sum();
    let dl = perimeter / target_count as f64;
    let mut points_before = Vec::with_capacity(target_count + segments_before.len());
    let mut points_after = Vec::with_capacity(target_count + segments_after.len());
    for (sb, sa) in segments_before.iter().zip(&segments_after) {
        let len = polyline_length(sb);
        let n = if dl > 0.0 {
            ((len / dl).ceil() as usize).max(1)
        } else {
            1
        };
        points_before.extend(discretize_polyline(sb, n));
        points_after.extend(discretize_polyline(sa, n));
    }
    debug!(
        "aligned {} / {} vertices into {} pieces, {} samples",
        ring_before.len(),
        ring_after.len(),
        segments_before.len(),
        points_before.len()
    );

    Ok(AlignedCell {
        segments_before,
        segments_after,
        points_before,
        points_after,
    })
}

/// Closed outline of `ring` at `frame`, walls included, first vertex not
/// repeated at the end.
pub fn ring_polygon(data: &Dataset, ring: &[PointId], frame: usize) -> Option<Vec<Point2<f64>>> {
    let n = ring.len();
    let mut out = Vec::with_capacity(n);
    for k in 0..n {
        let wall = data.wall_polyline(ring[k], ring[(k + 1) % n], frame)?;
        out.extend_from_slice(&wall[..wall.len() - 1]);
    }
    Some(out)
}

fn rotated(ring: &[PointId], start: usize) -> Vec<PointId> {
    let mut out = ring.to_vec();
    out.rotate_left(start);
    out
}

struct Chain {
    line: Vec<Point2<f64>>,
    /// Index in `line` of each ring vertex walked.
    vertices: Vec<usize>,
}

impl Chain {
    fn interior_ratios(&self) -> Vec<f64> {
        let ratios = arc_length_ratios(&self.line);
        let inner = self.vertices.len().saturating_sub(1);
        self.vertices[1..inner.max(1)]
            .iter()
            .map(|&i| ratios[i])
            .collect()
    }
}

/// Polyline following `ring` from index `from` to index `to` (cyclic).
fn chain(
    data: &Dataset,
    ring: &[PointId],
    from: usize,
    to: usize,
    frame: usize,
) -> Result<Chain, AlignError> {
    let n = ring.len();
    let mut line = Vec::new();
    let mut vertices = vec![0];
    for k in from..to {
        let (a, b) = (ring[k % n], ring[(k + 1) % n]);
        let wall = data.wall_polyline(a, b, frame).ok_or_else(|| {
            let point = if data.has_point(frame, a) { b } else { a };
            AlignError::MissingPosition { point, frame }
        })?;
        if line.is_empty() {
            line.extend_from_slice(&wall);
        } else {
            line.extend_from_slice(&wall[1..]);
        }
        vertices.push(line.len() - 1);
    }
    Ok(Chain { line, vertices })
}

#[cfg(test)]
mod tests {
    use super::*;
    use point_tracker_core::{Frame, Wall};

    /// Square at frame 0, same square scaled by `k` at frame 1 with an extra
    /// vertex in the middle of its bottom wall.
    fn squares(k: f64) -> (Dataset, Vec<PointId>, Vec<PointId>) {
        let mut data =
            Dataset::new(vec![Frame::new("a", 0.0), Frame::new("b", 1.0)]).expect("dataset");
        let corners = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)];
        let ids: Vec<PointId> = corners
            .iter()
            .map(|&(x, y)| {
                let id = data.add_point(0, Point2::new(x, y)).expect("point");
                data.set_position(1, id, Point2::new(k * x, k * y)).expect("pos");
                id
            })
            .collect();
        let mid = data.new_point_id();
        data.set_position(1, mid, Point2::new(5.0 * k, 0.0)).expect("mid");
        let after = vec![ids[0], mid, ids[1], ids[2], ids[3]];
        (data, ids, after)
    }

    #[test]
    fn inserted_vertex_splits_matching_wall() {
        let (data, before, after) = squares(1.25);
        let aligned = align_cells(&data, &before, &after, 0, 1, 40).expect("aligned");
        assert_eq!(aligned.segments_before.len(), 5);
        assert_eq!(aligned.segments_after.len(), 5);
        assert_eq!(aligned.points_before.len(), 40);
        assert_eq!(aligned.points_after.len(), 40);
        for (p, q) in aligned.points_before.iter().zip(&aligned.points_after) {
            assert!((q.coords - p.coords * 1.25).norm() < 1e-12);
        }
    }

    #[test]
    fn rings_are_rotated_to_a_shared_vertex() {
        let (data, before, after) = squares(1.0);
        let mut shifted = after.clone();
        shifted.rotate_left(3);
        let a = align_cells(&data, &before, &after, 0, 1, 12).expect("a");
        let b = align_cells(&data, &before, &shifted, 0, 1, 12).expect("b");
        assert_eq!(a, b);
    }

    #[test]
    fn curved_walls_do_not_change_cardinality() {
        let (mut data, before, after) = squares(1.0);
        let plain = align_cells(&data, &before, &after, 0, 1, 30).expect("plain");
        data.set_wall_shape(
            Wall::new(before[2], before[3]),
            1,
            vec![Point2::new(7.0, 10.5), Point2::new(3.0, 10.5)],
        );
        let curved = align_cells(&data, &before, &after, 0, 1, 30).expect("curved");
        assert_eq!(plain.points_before.len(), curved.points_before.len());
        assert_eq!(curved.points_before.len(), curved.points_after.len());
    }

    #[test]
    fn disjoint_rings_fail() {
        let (data, before, _) = squares(1.0);
        let err = align_cells(&data, &before[..2], &[99, 98, 97], 0, 1, 10).unwrap_err();
        assert_eq!(err, AlignError::NoCommonVertex);
    }

    #[test]
    fn reversed_anchor_order_fails() {
        let (data, before, _) = squares(1.0);
        let swapped = vec![before[0], before[2], before[1], before[3]];
        let err = align_cells(&data, &before, &swapped, 0, 1, 10).unwrap_err();
        assert_eq!(err, AlignError::BackwardAnchor { point: before[1] });
    }

    #[test]
    fn polygon_includes_wall_shapes() {
        let (mut data, before, _) = squares(1.0);
        data.set_wall_shape(Wall::new(before[0], before[1]), 0, vec![Point2::new(5.0, -2.0)]);
        let poly = ring_polygon(&data, &before, 0).expect("polygon");
        assert_eq!(poly.len(), 5);
        assert_eq!(poly[1], Point2::new(5.0, -2.0));
    }
}
