//! Which cells take part in a growth computation.

use std::collections::BTreeMap;

use log::debug;
use point_tracker_core::{geometry::polygon_area, CellId, Dataset, PointId};
use serde::{Deserialize, Serialize};

use crate::align_cells::ring_polygon;

/// Cell selection policy.
///
/// Every policy starts from the cells alive at the first frame with at least
/// three vertices there and returns their ring at that frame. With
/// `allow_daughters`, a cell that divides during the sequence is followed
/// through the merged outline of its descendants. Without it the daughters
/// born inside the sequence are collapsed onto their oldest ancestor: they
/// count as the ancestor being present, are never reported themselves, and
/// the ancestor's area is only checked on the frames where it is alive.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum CellSelection {
    /// Every vertex of the first frame must exist in every later frame
    /// (division points excepted).
    FullCellsOnly {
        #[serde(default)]
        allow_daughters: bool,
    },
    /// Vertices may come and go, but the outline must stay measurable and its
    /// area within `max_variation` (relative) of the first frame's.
    AddPoints {
        #[serde(default)]
        allow_daughters: bool,
        max_variation: f64,
    },
    /// No presence requirement after the first frame. The optional area cap
    /// is checked at each later frame where the outline is measurable.
    AllCells {
        #[serde(default)]
        allow_daughters: bool,
        #[serde(default)]
        max_variation: Option<f64>,
    },
}

impl Default for CellSelection {
    fn default() -> Self {
        CellSelection::AllCells {
            allow_daughters: false,
            max_variation: None,
        }
    }
}

impl CellSelection {
    pub fn name(&self) -> &'static str {
        match self {
            CellSelection::FullCellsOnly { .. } => "FullCellsOnly",
            CellSelection::AddPoints { .. } => "AddPoints",
            CellSelection::AllCells { .. } => "AllCells",
        }
    }

    pub fn allow_daughters(&self) -> bool {
        match *self {
            CellSelection::FullCellsOnly { allow_daughters }
            | CellSelection::AddPoints {
                allow_daughters, ..
            }
            | CellSelection::AllCells {
                allow_daughters, ..
            } => allow_daughters,
        }
    }

    /// Key/value description for reports.
    pub fn parameters(&self) -> Vec<(&'static str, String)> {
        let mut out = vec![
            ("selection", self.name().to_string()),
            ("allow_daughters", self.allow_daughters().to_string()),
        ];
        match *self {
            CellSelection::AddPoints { max_variation, .. } => {
                out.push(("max_variation", max_variation.to_string()));
            }
            CellSelection::AllCells {
                max_variation: Some(v),
                ..
            } => out.push(("max_variation", v.to_string())),
            _ => {}
        }
        out
    }

    /// Cells selected over `frames`, keyed by ID, with their ring at
    /// `frames[0]`. Empty when `frames` is empty.
    pub fn select(&self, data: &Dataset, frames: &[usize]) -> BTreeMap<CellId, Vec<PointId>> {
        let mut out = BTreeMap::new();
        let Some((&first, rest)) = frames.split_first() else {
            return out;
        };
        let follow = self.allow_daughters();
        let collapsed = (!follow).then(|| Collapsed::new(data, first, rest));
        let lineage = |cell: CellId, f: usize| {
            data.cell_outline(cell, f, follow).is_some()
                || collapsed.as_ref().is_some_and(|c| c.covers(data, cell, f))
        };
        for cell in data.cells_alive(first) {
            let Some(ring) = data.cell_ring_at(cell, first) else {
                continue;
            };
            if ring.len() < 3 {
                continue;
            }
            let keep = match *self {
                CellSelection::FullCellsOnly { .. } => full_cell(data, cell, &ring, rest, &lineage),
                CellSelection::AddPoints { max_variation, .. } => bounded_area(
                    data,
                    cell,
                    &ring,
                    first,
                    rest,
                    follow,
                    Some(max_variation),
                    &lineage,
                    true,
                ),
                CellSelection::AllCells { max_variation, .. } => bounded_area(
                    data,
                    cell,
                    &ring,
                    first,
                    rest,
                    follow,
                    max_variation,
                    &lineage,
                    false,
                ),
            };
            if keep {
                out.insert(cell, ring);
            } else {
                debug!("cell {cell} not selected by {}", self.name());
            }
        }
        out
    }
}

/// Cells born after the first frame of a sequence, per later frame and
/// keyed by their oldest ancestor.
struct Collapsed {
    born: BTreeMap<usize, BTreeMap<CellId, Vec<CellId>>>,
}

impl Collapsed {
    fn new(data: &Dataset, first: usize, rest: &[usize]) -> Self {
        let mut born: BTreeMap<usize, BTreeMap<CellId, Vec<CellId>>> = BTreeMap::new();
        for &f in rest {
            let roots = born.entry(f).or_default();
            for cell in data.cells_alive(f) {
                if data.cell(cell).is_some_and(|c| c.lifespan.start > first) {
                    roots.entry(data.oldest_ancestor(cell)).or_default().push(cell);
                }
            }
        }
        Self { born }
    }

    /// True when a descendant of `cell` born inside the sequence is alive at `frame`.
    fn covers(&self, data: &Dataset, cell: CellId, frame: usize) -> bool {
        let root = data.oldest_ancestor(cell);
        self.born
            .get(&frame)
            .and_then(|roots| roots.get(&root))
            .is_some_and(|cells| cells.iter().any(|&d| data.is_descendant(d, cell)))
    }
}

fn full_cell(
    data: &Dataset,
    cell: CellId,
    ring: &[PointId],
    rest: &[usize],
    lineage: &dyn Fn(CellId, usize) -> bool,
) -> bool {
    let division_points = data.lineage_division_points(cell);
    rest.iter().all(|&f| {
        lineage(cell, f)
            && ring
                .iter()
                .all(|&p| data.has_point(f, p) || division_points.contains(&p))
    })
}

/// Area of `outline` at `frame`, `None` when it cannot be measured.
fn outline_area(data: &Dataset, outline: &[PointId], frame: usize) -> Option<f64> {
    if outline.len() < 3 {
        return None;
    }
    ring_polygon(data, outline, frame).map(|p| polygon_area(&p))
}

#[allow(clippy::too_many_arguments)]
fn bounded_area(
    data: &Dataset,
    cell: CellId,
    ring: &[PointId],
    first: usize,
    rest: &[usize],
    follow: bool,
    max_variation: Option<f64>,
    lineage: &dyn Fn(CellId, usize) -> bool,
    require_outline: bool,
) -> bool {
    let reference = outline_area(data, ring, first);
    for &f in rest {
        let outline = data.cell_outline(cell, f, follow);
        if outline.is_none() && lineage(cell, f) {
            // Collapsed onto daughters that are not measured.
            continue;
        }
        let area = outline.and_then(|outline| outline_area(data, &outline, f));
        let Some(area) = area else {
            if require_outline {
                return false;
            }
            continue;
        };
        let Some(limit) = max_variation else {
            continue;
        };
        let variation = match reference {
            Some(a0) if a0 > 0.0 => (area - a0).abs() / a0,
            _ => f64::INFINITY,
        };
        if variation > limit {
            return false;
        }
    }
    true
}
