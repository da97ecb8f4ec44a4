//! In-memory tracking dataset: frames, per-frame point positions, cells with
//! their lineage, and curved wall shapes.
//!
//! Cells and points are stored in ID-indexed arenas. Lineage links
//! (parent/daughters) are plain IDs, never references.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use log::debug;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::frame::Frame;
use crate::geometry::signed_area;

pub type PointId = u32;
pub type CellId = u32;

/// Unordered pair of point IDs, stored smaller first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "[PointId; 2]", into = "[PointId; 2]")]
pub struct Wall(PointId, PointId);

impl Wall {
    #[inline]
    pub fn new(a: PointId, b: PointId) -> Self {
        if a <= b {
            Wall(a, b)
        } else {
            Wall(b, a)
        }
    }

    #[inline]
    pub fn first(&self) -> PointId {
        self.0
    }

    #[inline]
    pub fn second(&self) -> PointId {
        self.1
    }

    #[inline]
    pub fn contains(&self, p: PointId) -> bool {
        self.0 == p || self.1 == p
    }
}

impl From<[PointId; 2]> for Wall {
    fn from([a, b]: [PointId; 2]) -> Self {
        Wall::new(a, b)
    }
}

impl From<Wall> for [PointId; 2] {
    fn from(w: Wall) -> Self {
        [w.0, w.1]
    }
}

/// Serde adapter writing `Wall`-keyed maps as `[[a, b], value]` entry lists,
/// since JSON object keys must be strings.
pub mod serde_walls {
    use super::Wall;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<V: Serialize, S: Serializer>(
        map: &BTreeMap<Wall, V>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(map.iter())
    }

    pub fn deserialize<'de, V: Deserialize<'de>, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<Wall, V>, D::Error> {
        Ok(Vec::<(Wall, V)>::deserialize(deserializer)?
            .into_iter()
            .collect())
    }
}

/// Time interval and lineage of one cell identity.
///
/// The cell is alive on the frames `start <= f < end`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifeSpan {
    pub start: usize,
    /// `None` means the cell lives until the end of the series.
    #[serde(default)]
    pub end: Option<usize>,
    #[serde(default)]
    pub parent: Option<CellId>,
    #[serde(default)]
    pub daughters: Option<[CellId; 2]>,
    #[serde(default)]
    pub division: Option<[PointId; 2]>,
}

impl LifeSpan {
    pub fn starting_at(start: usize) -> Self {
        Self {
            start,
            ..Self::default()
        }
    }

    #[inline]
    pub fn is_alive(&self, frame: usize) -> bool {
        frame >= self.start && self.end.is_none_or(|end| frame < end)
    }

    /// True when the cell has divided at or before `frame`.
    #[inline]
    pub fn divided_by(&self, frame: usize) -> bool {
        self.daughters.is_some() && self.end.is_some_and(|end| frame >= end)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Counter-clockwise ring of point IDs over the whole lifespan.
    pub ring: Vec<PointId>,
    pub lifespan: LifeSpan,
}

/// Batch of point edits for one frame, applied atomically.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PointEdit {
    Add {
        frame: usize,
        points: Vec<(PointId, Point2<f64>)>,
    },
    Move {
        frame: usize,
        points: Vec<(PointId, Point2<f64>)>,
    },
    Delete {
        frame: usize,
        points: Vec<PointId>,
    },
}

impl PointEdit {
    pub fn frame(&self) -> usize {
        match self {
            PointEdit::Add { frame, .. }
            | PointEdit::Move { frame, .. }
            | PointEdit::Delete { frame, .. } => *frame,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PointEdit::Add { points, .. } | PointEdit::Move { points, .. } => points.len(),
            PointEdit::Delete { points, .. } => points.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Serialising edit mechanism the long-running pipelines push their batches
/// through. Each batch must be fully visible before the next one is issued.
pub trait EditTarget {
    fn dataset(&self) -> &Dataset;
    fn apply(&mut self, edit: PointEdit) -> Result<(), DataError>;
}

impl EditTarget for Dataset {
    fn dataset(&self) -> &Dataset {
        self
    }

    fn apply(&mut self, edit: PointEdit) -> Result<(), DataError> {
        self.apply_edit(edit)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DataError {
    #[error("frame index {frame} out of range ({count} frames)")]
    FrameOutOfRange { frame: usize, count: usize },
    #[error("frame '{frame}' is not strictly after the previous frame in time")]
    NonIncreasingTime { frame: String },
    #[error("no frame named '{0}'")]
    UnknownFrame(String),
    #[error("point {point} does not exist in frame '{frame}'")]
    MissingPoint { frame: String, point: PointId },
    #[error("point {point} already exists in frame '{frame}'")]
    DuplicatePoint { frame: String, point: PointId },
    #[error("unknown cell {0}")]
    UnknownCell(CellId),
    #[error("cell {cell} has {count} vertices, at least 3 are needed")]
    TooFewVertices { cell: CellId, count: usize },
    #[error("inconsistent lineage for cell {cell}: {reason}")]
    Lineage { cell: CellId, reason: String },
    #[error("position table count {tables} does not match frame count {frames}")]
    PositionTables { tables: usize, frames: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// One invariant violation found by [`Dataset::check_cells`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CellViolation {
    pub cell: CellId,
    pub kind: CellViolationKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellViolationKind {
    /// The cell ring references a point the point→cell index does not link back.
    NotIndexed { point: PointId },
    /// The index links a point to a cell whose ring does not contain it.
    StaleIndex { point: PointId },
    /// Two consecutive ring entries are the same point.
    DuplicateVertex { point: PointId },
    /// The ring is clockwise at the first frame where it has 3 vertices.
    Clockwise { frame: usize },
    /// Parent/daughter links disagree with the lifespans.
    Lineage,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Dataset {
    frames: Vec<Frame>,
    positions: Vec<BTreeMap<PointId, Point2<f64>>>,
    cells: BTreeMap<CellId, Cell>,
    #[serde(with = "serde_walls")]
    wall_shapes: BTreeMap<Wall, BTreeMap<usize, Vec<Point2<f64>>>>,
    next_point: PointId,
    next_cell: CellId,
    #[serde(skip)]
    point_cells: BTreeMap<PointId, BTreeSet<CellId>>,
}

#[derive(Deserialize)]
struct RawDataset {
    frames: Vec<Frame>,
    #[serde(default)]
    positions: Vec<BTreeMap<PointId, Point2<f64>>>,
    #[serde(default)]
    cells: BTreeMap<CellId, Cell>,
    #[serde(default, with = "serde_walls")]
    wall_shapes: BTreeMap<Wall, BTreeMap<usize, Vec<Point2<f64>>>>,
    #[serde(default)]
    next_point: PointId,
    #[serde(default)]
    next_cell: CellId,
}

impl<'de> Deserialize<'de> for Dataset {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawDataset::deserialize(deserializer)?;
        Dataset::from_raw(raw).map_err(serde::de::Error::custom)
    }
}

impl Dataset {
    /// Create an empty dataset over the given frames.
    pub fn new(frames: Vec<Frame>) -> Result<Self, DataError> {
        check_times(&frames)?;
        let positions = vec![BTreeMap::new(); frames.len()];
        Ok(Self {
            frames,
            positions,
            ..Self::default()
        })
    }

    fn from_raw(raw: RawDataset) -> Result<Self, DataError> {
        check_times(&raw.frames)?;
        let mut positions = raw.positions;
        if positions.is_empty() {
            positions = vec![BTreeMap::new(); raw.frames.len()];
        }
        if positions.len() != raw.frames.len() {
            return Err(DataError::PositionTables {
                tables: positions.len(),
                frames: raw.frames.len(),
            });
        }
        let max_point = positions
            .iter()
            .flat_map(|m| m.keys())
            .chain(raw.cells.values().flat_map(|c| c.ring.iter()))
            .max()
            .map_or(0, |&p| p + 1);
        let max_cell = raw.cells.keys().max().map_or(0, |&c| c + 1);
        let mut data = Self {
            frames: raw.frames,
            positions,
            cells: raw.cells,
            wall_shapes: raw.wall_shapes,
            next_point: raw.next_point.max(max_point),
            next_cell: raw.next_cell.max(max_cell),
            point_cells: BTreeMap::new(),
        };
        data.rebuild_index();
        Ok(data)
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), DataError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    // ---- frames ----

    #[inline]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    #[inline]
    pub fn nb_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn frame(&self, index: usize) -> Result<&Frame, DataError> {
        self.frames.get(index).ok_or(DataError::FrameOutOfRange {
            frame: index,
            count: self.frames.len(),
        })
    }

    pub fn frame_mut(&mut self, index: usize) -> Result<&mut Frame, DataError> {
        let count = self.frames.len();
        self.frames
            .get_mut(index)
            .ok_or(DataError::FrameOutOfRange {
                frame: index,
                count,
            })
    }

    pub fn frame_index(&self, name: &str) -> Result<usize, DataError> {
        self.frames
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| DataError::UnknownFrame(name.to_string()))
    }

    /// Time elapsed between two frames, in hours.
    pub fn elapsed(&self, from: usize, to: usize) -> Result<f64, DataError> {
        Ok(self.frame(to)?.time - self.frame(from)?.time)
    }

    // ---- points ----

    /// Frame-local position of a point.
    #[inline]
    pub fn position(&self, frame: usize, point: PointId) -> Option<Point2<f64>> {
        self.positions.get(frame)?.get(&point).copied()
    }

    /// Position in the shared reference frame.
    pub fn reference_position(&self, frame: usize, point: PointId) -> Option<Point2<f64>> {
        let p = self.position(frame, point)?;
        Some(self.frames[frame].to_reference(p))
    }

    #[inline]
    pub fn has_point(&self, frame: usize, point: PointId) -> bool {
        self.positions
            .get(frame)
            .is_some_and(|m| m.contains_key(&point))
    }

    /// Points present in `frame`, in ID order.
    pub fn points_in_frame(&self, frame: usize) -> impl Iterator<Item = (PointId, Point2<f64>)> + '_ {
        self.positions
            .get(frame)
            .into_iter()
            .flat_map(|m| m.iter().map(|(&id, &p)| (id, p)))
    }

    /// Allocate a fresh point ID. IDs are never reused.
    pub fn new_point_id(&mut self) -> PointId {
        let id = self.next_point;
        self.next_point += 1;
        id
    }

    /// Create a new point in `frame` and return its ID.
    pub fn add_point(&mut self, frame: usize, position: Point2<f64>) -> Result<PointId, DataError> {
        self.frame(frame)?;
        let id = self.new_point_id();
        self.positions[frame].insert(id, position);
        Ok(id)
    }

    /// Set (create or move) the position of `point` in `frame`.
    pub fn set_position(
        &mut self,
        frame: usize,
        point: PointId,
        position: Point2<f64>,
    ) -> Result<(), DataError> {
        self.frame(frame)?;
        self.positions[frame].insert(point, position);
        if point >= self.next_point {
            self.next_point = point + 1;
        }
        Ok(())
    }

    pub fn remove_position(&mut self, frame: usize, point: PointId) -> Result<Point2<f64>, DataError> {
        let name = self.frame(frame)?.name.clone();
        self.positions[frame]
            .remove(&point)
            .ok_or(DataError::MissingPoint { frame: name, point })
    }

    /// Apply one batch of point edits. The batch is validated before any
    /// change is made.
    pub fn apply_edit(&mut self, edit: PointEdit) -> Result<(), DataError> {
        let frame = edit.frame();
        let name = self.frame(frame)?.name.clone();
        match edit {
            PointEdit::Add { points, .. } => {
                if let Some(&(point, _)) = points.iter().find(|(p, _)| self.has_point(frame, *p)) {
                    return Err(DataError::DuplicatePoint { frame: name, point });
                }
                for (point, pos) in points {
                    self.set_position(frame, point, pos)?;
                }
            }
            PointEdit::Move { points, .. } => {
                if let Some(&(point, _)) = points.iter().find(|(p, _)| !self.has_point(frame, *p)) {
                    return Err(DataError::MissingPoint { frame: name, point });
                }
                for (point, pos) in points {
                    self.positions[frame].insert(point, pos);
                }
            }
            PointEdit::Delete { points, .. } => {
                if let Some(&point) = points.iter().find(|p| !self.has_point(frame, **p)) {
                    return Err(DataError::MissingPoint { frame: name, point });
                }
                for point in points {
                    self.positions[frame].remove(&point);
                }
            }
        }
        Ok(())
    }

    // ---- cells ----

    #[inline]
    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(&id)
    }

    pub fn cells(&self) -> impl Iterator<Item = (CellId, &Cell)> + '_ {
        self.cells.iter().map(|(&id, c)| (id, c))
    }

    /// Cells alive at `frame`, in ID order.
    pub fn cells_alive(&self, frame: usize) -> impl Iterator<Item = CellId> + '_ {
        self.cells
            .iter()
            .filter(move |(_, c)| c.lifespan.is_alive(frame))
            .map(|(&id, _)| id)
    }

    /// Cells whose ring contains `point`.
    pub fn cells_of_point(&self, point: PointId) -> impl Iterator<Item = CellId> + '_ {
        self.point_cells
            .get(&point)
            .into_iter()
            .flat_map(|s| s.iter().copied())
    }

    pub fn add_cell(&mut self, ring: Vec<PointId>, lifespan: LifeSpan) -> Result<CellId, DataError> {
        let id = self.next_cell;
        if ring.len() < 3 {
            return Err(DataError::TooFewVertices {
                cell: id,
                count: ring.len(),
            });
        }
        self.next_cell += 1;
        self.index_ring(id, &ring);
        self.cells.insert(id, Cell { ring, lifespan });
        Ok(id)
    }

    /// Replace the ring of an existing cell.
    pub fn set_cell_ring(&mut self, id: CellId, ring: Vec<PointId>) -> Result<(), DataError> {
        let old = self
            .cells
            .get(&id)
            .map(|c| c.ring.clone())
            .ok_or(DataError::UnknownCell(id))?;
        self.unindex_ring(id, &old);
        self.index_ring(id, &ring);
        if let Some(cell) = self.cells.get_mut(&id) {
            cell.ring = ring;
        }
        Ok(())
    }

    pub fn remove_cell(&mut self, id: CellId) -> Result<Cell, DataError> {
        let cell = self.cells.remove(&id).ok_or(DataError::UnknownCell(id))?;
        self.unindex_ring(id, &cell.ring);
        Ok(cell)
    }

    /// End the lifespan of `id` at `end` (exclusive), or reopen it with `None`.
    ///
    /// A cell that has divided keeps the end fixed by its division.
    pub fn set_cell_end(&mut self, id: CellId, end: Option<usize>) -> Result<(), DataError> {
        let cell = self.cells.get_mut(&id).ok_or(DataError::UnknownCell(id))?;
        if cell.lifespan.daughters.is_some() {
            return Err(DataError::Lineage {
                cell: id,
                reason: "the end of a divided cell is its division frame".to_string(),
            });
        }
        if end.is_some_and(|e| e <= cell.lifespan.start) {
            return Err(DataError::Lineage {
                cell: id,
                reason: format!("end {end:?} is not after start {}", cell.lifespan.start),
            });
        }
        cell.lifespan.end = end;
        Ok(())
    }

    /// Divide `id` at `frame` into two daughters separated by the wall
    /// `division`. The daughters start at `frame` and the mother ends there.
    pub fn divide_cell(
        &mut self,
        id: CellId,
        frame: usize,
        rings: [Vec<PointId>; 2],
        division: [PointId; 2],
    ) -> Result<[CellId; 2], DataError> {
        let mother = self.cells.get(&id).ok_or(DataError::UnknownCell(id))?;
        if !mother.lifespan.is_alive(frame) || frame == mother.lifespan.start {
            return Err(DataError::Lineage {
                cell: id,
                reason: format!("cannot divide at frame {frame} outside of the lifespan"),
            });
        }
        // Both daughters are checked before either is inserted.
        for (i, ring) in rings.iter().enumerate() {
            if ring.len() < 3 {
                return Err(DataError::TooFewVertices {
                    cell: self.next_cell + i as CellId,
                    count: ring.len(),
                });
            }
        }
        let end = mother.lifespan.end;
        let [r1, r2] = rings;
        let span = |parent| LifeSpan {
            start: frame,
            end,
            parent: Some(parent),
            daughters: None,
            division: None,
        };
        let d1 = self.add_cell(r1, span(id))?;
        let d2 = self.add_cell(r2, span(id))?;
        if let Some(mother) = self.cells.get_mut(&id) {
            mother.lifespan.end = Some(frame);
            mother.lifespan.daughters = Some([d1, d2]);
            mother.lifespan.division = Some(division);
        }
        Ok([d1, d2])
    }

    /// Follow parent links to the first cell of the lineage.
    pub fn oldest_ancestor(&self, id: CellId) -> CellId {
        let mut current = id;
        let mut guard = self.cells.len();
        while let Some(parent) = self.cells.get(&current).and_then(|c| c.lifespan.parent) {
            if guard == 0 {
                break;
            }
            guard -= 1;
            current = parent;
        }
        current
    }

    /// True when `ancestor` is found by following the parent links of `id`.
    pub fn is_descendant(&self, id: CellId, ancestor: CellId) -> bool {
        let mut current = id;
        let mut guard = self.cells.len();
        while let Some(parent) = self.cells.get(&current).and_then(|c| c.lifespan.parent) {
            if parent == ancestor {
                return true;
            }
            if guard == 0 {
                break;
            }
            guard -= 1;
            current = parent;
        }
        false
    }

    /// Division points of `id` and all its descendants.
    pub fn lineage_division_points(&self, id: CellId) -> BTreeSet<PointId> {
        let mut out = BTreeSet::new();
        let mut stack = vec![id];
        while let Some(c) = stack.pop() {
            let Some(cell) = self.cells.get(&c) else {
                continue;
            };
            if let Some(division) = cell.lifespan.division {
                out.extend(division);
            }
            if let Some(daughters) = cell.lifespan.daughters {
                stack.extend(daughters);
            }
        }
        out
    }

    /// Ring of `id` restricted to the points present in `frame`.
    pub fn cell_ring_at(&self, id: CellId, frame: usize) -> Option<Vec<PointId>> {
        let cell = self.cells.get(&id)?;
        Some(
            cell.ring
                .iter()
                .copied()
                .filter(|&p| self.has_point(frame, p))
                .collect(),
        )
    }

    /// Outline of `id` at `frame`.
    ///
    /// For a living cell this is its ring at that frame. When the cell has
    /// already divided and `follow_divisions` is set, the outline is the outer
    /// boundary of its surviving descendants, or the outline of the only one
    /// left. Returns `None` when the cell is not represented at that frame.
    pub fn cell_outline(&self, id: CellId, frame: usize, follow_divisions: bool) -> Option<Vec<PointId>> {
        let cell = self.cells.get(&id)?;
        if cell.lifespan.is_alive(frame) {
            return self.cell_ring_at(id, frame);
        }
        if !follow_divisions || !cell.lifespan.divided_by(frame) {
            return None;
        }
        let [d1, d2] = cell.lifespan.daughters?;
        match (self.cell_outline(d1, frame, true), self.cell_outline(d2, frame, true)) {
            (Some(r1), Some(r2)) => {
                let merged = merge_rings(&r1, &r2);
                if merged.is_none() {
                    debug!("daughters {d1} and {d2} of cell {id} share no wall at frame {frame}");
                }
                merged
            }
            (Some(ring), None) | (None, Some(ring)) => {
                debug!("cell {id}: a single daughter survives at frame {frame}");
                Some(ring)
            }
            (None, None) => None,
        }
    }

    /// Reference-frame positions of `ring` in `frame`; `None` if any is missing.
    pub fn ring_positions(&self, ring: &[PointId], frame: usize) -> Option<Vec<Point2<f64>>> {
        ring.iter()
            .map(|&p| self.reference_position(frame, p))
            .collect()
    }

    // ---- walls ----

    pub fn wall_shape(&self, wall: Wall, frame: usize) -> Option<&[Point2<f64>]> {
        self.wall_shapes
            .get(&wall)?
            .get(&frame)
            .map(|v| v.as_slice())
    }

    /// Set intermediate points of a wall at `frame`, ordered from the smaller
    /// to the larger endpoint ID, in frame-local coordinates.
    pub fn set_wall_shape(&mut self, wall: Wall, frame: usize, shape: Vec<Point2<f64>>) {
        let per_frame = self.wall_shapes.entry(wall).or_default();
        if shape.is_empty() {
            per_frame.remove(&frame);
        } else {
            per_frame.insert(frame, shape);
        }
    }

    /// Reference-frame polyline of the wall going from `a` to `b`, including
    /// its curved-shape points.
    pub fn wall_polyline(&self, a: PointId, b: PointId, frame: usize) -> Option<Vec<Point2<f64>>> {
        let pa = self.reference_position(frame, a)?;
        let pb = self.reference_position(frame, b)?;
        let mut line = vec![pa];
        if let Some(shape) = self.wall_shape(Wall::new(a, b), frame) {
            let tf = &self.frames[frame];
            if a <= b {
                line.extend(shape.iter().map(|&p| tf.to_reference(p)));
            } else {
                line.extend(shape.iter().rev().map(|&p| tf.to_reference(p)));
            }
        }
        line.push(pb);
        Some(line)
    }

    /// Length of the path along `ring` from `a` to `b` (following ring order),
    /// using curved wall shapes.
    pub fn ring_path_length(&self, ring: &[PointId], a: PointId, b: PointId, frame: usize) -> Option<f64> {
        let n = ring.len();
        let start = ring.iter().position(|&p| p == a)?;
        let mut total = 0.0;
        for k in 0..n {
            let from = ring[(start + k) % n];
            let to = ring[(start + k + 1) % n];
            total += crate::geometry::polyline_length(&self.wall_polyline(from, to, frame)?);
            if to == b {
                return Some(total);
            }
        }
        None
    }

    // ---- invariants ----

    /// Check the cell invariants, returning every violation found.
    pub fn check_cells(&self) -> Vec<CellViolation> {
        let mut out = Vec::new();
        for (&id, cell) in &self.cells {
            for &p in &cell.ring {
                if !self.point_cells.get(&p).is_some_and(|s| s.contains(&id)) {
                    out.push(CellViolation {
                        cell: id,
                        kind: CellViolationKind::NotIndexed { point: p },
                    });
                }
            }
            let n = cell.ring.len();
            for i in 0..n {
                if n > 1 && cell.ring[i] == cell.ring[(i + 1) % n] {
                    out.push(CellViolation {
                        cell: id,
                        kind: CellViolationKind::DuplicateVertex {
                            point: cell.ring[i],
                        },
                    });
                }
            }
            if let Some(frame) = self.first_polygon_frame(id) {
                let area = self
                    .cell_ring_at(id, frame)
                    .and_then(|r| self.ring_positions(&r, frame))
                    .map(|pts| signed_area(&pts))
                    .unwrap_or(0.0);
                if area < 0.0 {
                    out.push(CellViolation {
                        cell: id,
                        kind: CellViolationKind::Clockwise { frame },
                    });
                }
            }
            if !self.lineage_consistent(id, cell) {
                out.push(CellViolation {
                    cell: id,
                    kind: CellViolationKind::Lineage,
                });
            }
        }
        for (&p, owners) in &self.point_cells {
            for &c in owners {
                if !self.cells.get(&c).is_some_and(|cell| cell.ring.contains(&p)) {
                    out.push(CellViolation {
                        cell: c,
                        kind: CellViolationKind::StaleIndex { point: p },
                    });
                }
            }
        }
        out
    }

    /// Collapse consecutive duplicate vertices (cyclically) and make the ring
    /// counter-clockwise.
    pub fn cleanup_cell(&mut self, id: CellId) -> Result<(), DataError> {
        let cell = self.cells.get(&id).ok_or(DataError::UnknownCell(id))?;
        let mut ring = cell.ring.clone();
        ring.dedup();
        while ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        let frame = self.first_polygon_frame(id);
        if let Some(frame) = frame {
            let present: Vec<PointId> = ring
                .iter()
                .copied()
                .filter(|&p| self.has_point(frame, p))
                .collect();
            let area = self
                .ring_positions(&present, frame)
                .map(|pts| signed_area(&pts))
                .unwrap_or(0.0);
            if area < 0.0 {
                ring.reverse();
            }
        }
        self.set_cell_ring(id, ring)
    }

    fn first_polygon_frame(&self, id: CellId) -> Option<usize> {
        let cell = self.cells.get(&id)?;
        let last = cell.lifespan.end.unwrap_or(self.frames.len()).min(self.frames.len());
        (cell.lifespan.start..last).find(|&f| {
            self.cell_ring_at(id, f)
                .is_some_and(|r| r.len() >= 3)
        })
    }

    fn lineage_consistent(&self, id: CellId, cell: &Cell) -> bool {
        if let Some(daughters) = cell.lifespan.daughters {
            let Some(end) = cell.lifespan.end else {
                return false;
            };
            for d in daughters {
                let ok = self
                    .cells
                    .get(&d)
                    .is_some_and(|dc| dc.lifespan.start == end && dc.lifespan.parent == Some(id));
                if !ok {
                    return false;
                }
            }
        }
        if let Some(parent) = cell.lifespan.parent {
            let ok = self.cells.get(&parent).is_some_and(|pc| {
                pc.lifespan.end == Some(cell.lifespan.start)
                    && pc.lifespan.daughters.is_some_and(|ds| ds.contains(&id))
            });
            if !ok {
                return false;
            }
        }
        true
    }

    fn index_ring(&mut self, id: CellId, ring: &[PointId]) {
        for &p in ring {
            self.point_cells.entry(p).or_default().insert(id);
        }
    }

    fn unindex_ring(&mut self, id: CellId, ring: &[PointId]) {
        for p in ring {
            if let Some(owners) = self.point_cells.get_mut(p) {
                owners.remove(&id);
                if owners.is_empty() {
                    self.point_cells.remove(p);
                }
            }
        }
    }

    fn rebuild_index(&mut self) {
        self.point_cells.clear();
        let rings: Vec<(CellId, Vec<PointId>)> =
            self.cells.iter().map(|(&id, c)| (id, c.ring.clone())).collect();
        for (id, ring) in rings {
            self.index_ring(id, &ring);
        }
    }
}

fn check_times(frames: &[Frame]) -> Result<(), DataError> {
    for w in frames.windows(2) {
        if !(w[1].time > w[0].time) {
            return Err(DataError::NonIncreasingTime {
                frame: w[1].name.clone(),
            });
        }
    }
    Ok(())
}

/// Outer ring of the union of two adjacent rings.
///
/// Edges traversed in opposite directions by both rings are interior and
/// dropped; the remaining directed edges are chained back into a ring.
/// Returns `None` when the rings share no edge or the boundary does not
/// close into a single ring.
pub fn merge_rings(a: &[PointId], b: &[PointId]) -> Option<Vec<PointId>> {
    let edges = |r: &[PointId]| -> Vec<(PointId, PointId)> {
        (0..r.len()).map(|i| (r[i], r[(i + 1) % r.len()])).collect()
    };
    let ea = edges(a);
    let eb = edges(b);
    let interior: BTreeSet<(PointId, PointId)> = ea
        .iter()
        .filter(|&&(u, v)| eb.contains(&(v, u)))
        .flat_map(|&(u, v)| [(u, v), (v, u)])
        .collect();
    if interior.is_empty() {
        return None;
    }
    let boundary: Vec<(PointId, PointId)> = ea
        .into_iter()
        .chain(eb)
        .filter(|e| !interior.contains(e))
        .collect();
    let mut next: HashMap<PointId, PointId> = HashMap::with_capacity(boundary.len());
    for &(u, v) in &boundary {
        if next.insert(u, v).is_some() {
            return None;
        }
    }
    // Start from the first boundary vertex of `a` to keep a stable order.
    let start = a.iter().copied().find(|p| next.contains_key(p))?;
    let mut ring = vec![start];
    let mut current = next[&start];
    while current != start {
        if ring.len() > boundary.len() {
            return None;
        }
        ring.push(current);
        current = *next.get(&current)?;
    }
    (ring.len() == boundary.len()).then_some(ring)
}
