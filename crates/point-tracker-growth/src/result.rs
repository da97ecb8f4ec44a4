use std::collections::BTreeMap;

use nalgebra::Point2;
use point_tracker_core::{serde_walls, CellId, Wall};
use serde::{Deserialize, Serialize};

use crate::methods::GrowthMethod;
use crate::selection::CellSelection;
use crate::tensor::GrowthParameters;

/// Point sets the tensor of one cell was fitted on.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CellShapes {
    pub before: Vec<Point2<f64>>,
    pub after: Vec<Point2<f64>>,
}

/// Growth measured over one frame pair, reported under one image name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameGrowth {
    pub image: String,
    pub cells: BTreeMap<CellId, GrowthParameters>,
    /// Relative area growth rate per cell, per hour.
    pub cell_area_rates: BTreeMap<CellId, f64>,
    /// Relative elongation rate per wall, per hour.
    #[serde(with = "serde_walls")]
    pub walls: BTreeMap<Wall, f64>,
    pub shapes: BTreeMap<CellId, CellShapes>,
}

impl FrameGrowth {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Self::default()
        }
    }

    pub fn nb_cells(&self) -> usize {
        self.cells.len()
    }
}

/// Output of a growth computation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GrowthResult {
    pub method: GrowthMethod,
    pub selection: CellSelection,
    pub exp_correction: bool,
    /// Names of the frames the computation was asked to cover.
    pub images_used: Vec<String>,
    /// One entry per processed frame pair, in order.
    pub frames: Vec<FrameGrowth>,
}

impl GrowthResult {
    pub fn frame(&self, image: &str) -> Option<&FrameGrowth> {
        self.frames.iter().find(|f| f.image == image)
    }

    /// Number of accepted cell measurements over all frames.
    pub fn nb_measurements(&self) -> usize {
        self.frames.iter().map(FrameGrowth::nb_cells).sum()
    }
}
