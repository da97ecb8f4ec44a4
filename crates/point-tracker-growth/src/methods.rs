//! Growth computation drivers.
//!
//! Consecutive frames are paired. For each pair the selected cells are
//! measured either on their shared vertices (sparse methods) or on outlines
//! resampled by [`align_cells`] (dense methods). Forward methods report the
//! pair under the first frame with the stretch taken before the rotation;
//! backward methods report it under the second frame with the stretch taken
//! after the rotation.

use log::{debug, info, warn};
use nalgebra::Point2;
use point_tracker_core::geometry::{polygon_area, polyline_length};
use point_tracker_core::{
    CancelToken, CellId, Completion, Dataset, PointId, ProgressSink, RunOutcome, Wall,
};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::align_cells::{align_cells, ring_polygon};
use crate::error::GrowthError;
use crate::result::{CellShapes, FrameGrowth, GrowthResult};
use crate::selection::CellSelection;
use crate::tensor::{growth_params, linear_to_exponential};

/// Cells whose share of the combined area falls below this are rejected.
pub const MIN_AREA_RATIO: f64 = 1e-15;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum GrowthMethod {
    #[default]
    Forward,
    Backward,
    ForwardDense { nb_points: usize },
    BackwardDense { nb_points: usize },
}

/// Full configuration of a growth run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthParams {
    pub method: GrowthMethod,
    pub selection: CellSelection,
    /// Convert linear rates over each interval into exponential rates.
    pub exp_correction: bool,
}

impl Default for GrowthParams {
    fn default() -> Self {
        Self {
            method: GrowthMethod::default(),
            selection: CellSelection::default(),
            exp_correction: true,
        }
    }
}

impl GrowthMethod {
    pub fn name(&self) -> &'static str {
        match self {
            GrowthMethod::Forward => "Forward",
            GrowthMethod::Backward => "Backward",
            GrowthMethod::ForwardDense { .. } => "ForwardDense",
            GrowthMethod::BackwardDense { .. } => "BackwardDense",
        }
    }

    pub fn is_backward(&self) -> bool {
        matches!(self, GrowthMethod::Backward | GrowthMethod::BackwardDense { .. })
    }

    /// Resampling count of the dense methods.
    pub fn dense_points(&self) -> Option<usize> {
        match *self {
            GrowthMethod::ForwardDense { nb_points } | GrowthMethod::BackwardDense { nb_points } => {
                Some(nb_points)
            }
            _ => None,
        }
    }

    /// Key/value description for reports.
    pub fn parameters(&self) -> Vec<(&'static str, String)> {
        let mut out = vec![("method", self.name().to_string())];
        if let Some(n) = self.dense_points() {
            out.push(("nb_points", n.to_string()));
        }
        out
    }

    /// Number of result entries produced from `nb_images` frames.
    pub fn nb_output_images(&self, nb_images: usize) -> usize {
        nb_images.saturating_sub(1)
    }

    /// Compute growth over the consecutive pairs of `frames`.
    ///
    /// Cancellation is checked before each pair and one progress item is
    /// emitted after it. An aborted run returns the pairs completed so far.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(method = self.name(), frames = frames.len()))
    )]
    pub fn compute_result(
        &self,
        data: &Dataset,
        frames: &[usize],
        selection: &CellSelection,
        exp_correction: bool,
        cancel: &CancelToken,
        sink: &mut dyn ProgressSink,
    ) -> Result<RunOutcome<GrowthResult>, GrowthError> {
        let mut progress = Completion::new(sink);
        if frames.len() < 2 {
            return Err(GrowthError::NotEnoughFrames(frames.len()));
        }
        if self.dense_points() == Some(0) {
            return Err(GrowthError::NoSamples);
        }
        let mut images_used = Vec::with_capacity(frames.len());
        for &f in frames {
            images_used.push(data.frame(f)?.name.clone());
        }
        for (pair, names) in frames.windows(2).zip(images_used.windows(2)) {
            if data.elapsed(pair[0], pair[1])? <= 0.0 {
                return Err(GrowthError::FrameOrder {
                    first: names[0].clone(),
                    second: names[1].clone(),
                });
            }
        }

        let mut result = GrowthResult {
            method: *self,
            selection: *selection,
            exp_correction,
            images_used,
            frames: Vec::with_capacity(self.nb_output_images(frames.len())),
        };
        for (index, pair) in frames.windows(2).enumerate() {
            if cancel.is_cancelled() {
                info!(
                    "growth computation cancelled after {} of {} frame pairs",
                    index,
                    frames.len() - 1
                );
                progress.abort();
                return Ok(RunOutcome::Aborted(result));
            }
            let frame = self.frame_pair(data, pair[0], pair[1], selection, exp_correction)?;
            debug!("{}: {} cells, {} walls", frame.image, frame.cells.len(), frame.walls.len());
            result.frames.push(frame);
            progress.next_item(index);
        }
        info!(
            "{} growth over {} frame pairs: {} cell measurements",
            self.name(),
            result.frames.len(),
            result.nb_measurements()
        );
        progress.finish();
        Ok(RunOutcome::Completed(result))
    }

    fn frame_pair(
        &self,
        data: &Dataset,
        f0: usize,
        f1: usize,
        selection: &CellSelection,
        exp_correction: bool,
    ) -> Result<FrameGrowth, GrowthError> {
        let dt = data.elapsed(f0, f1)?;
        let reported = if self.is_backward() { f1 } else { f0 };
        let mut out = FrameGrowth::new(data.frame(reported)?.name.clone());
        let at_start = !self.is_backward();
        let correct = |rate: f64| {
            if exp_correction {
                linear_to_exponential(rate, dt)
            } else {
                rate
            }
        };

        for (cell, ring) in selection.select(data, &[f0, f1]) {
            let Some(outline) = data.cell_outline(cell, f1, selection.allow_daughters()) else {
                debug!("cell {cell}: no outline at frame {f1}");
                continue;
            };
            let Some((before, after)) = self.fit_points(data, cell, &ring, &outline, f0, f1) else {
                continue;
            };
            let Some(params) = growth_params(&before, &after, dt, exp_correction, at_start) else {
                debug!("cell {cell}: degenerate fit");
                continue;
            };
            let (Some(a0), Some(a1)) = (outline_area(data, &ring, f0), outline_area(data, &outline, f1))
            else {
                debug!("cell {cell}: outline not measurable");
                continue;
            };
            let area_rate = correct((a1 - a0) / (a0 * dt));
            if !area_rate.is_finite() || !(a1 / (a1 + a0) >= MIN_AREA_RATIO) {
                debug!("cell {cell}: rejected area change {a0} -> {a1}");
                continue;
            }

            for k in 0..ring.len() {
                let (a, b) = (ring[k], ring[(k + 1) % ring.len()]);
                let wall = Wall::new(a, b);
                if out.walls.contains_key(&wall) {
                    continue;
                }
                let Some(l0) = data.wall_polyline(a, b, f0).map(|l| polyline_length(&l)) else {
                    continue;
                };
                let Some(l1) = data.ring_path_length(&outline, a, b, f1) else {
                    continue;
                };
                let rate = correct((l1 - l0) / (l0 * dt));
                if rate.is_finite() {
                    out.walls.insert(wall, rate);
                }
            }

            out.cells.insert(cell, params);
            out.cell_area_rates.insert(cell, area_rate);
            out.shapes.insert(cell, CellShapes { before, after });
        }
        Ok(out)
    }

    /// Matched point sets used for the fit, `None` when the cell is skipped.
    fn fit_points(
        &self,
        data: &Dataset,
        cell: CellId,
        ring: &[PointId],
        outline: &[PointId],
        f0: usize,
        f1: usize,
    ) -> Option<(Vec<Point2<f64>>, Vec<Point2<f64>>)> {
        if let Some(nb_points) = self.dense_points() {
            return match align_cells(data, ring, outline, f0, f1, nb_points) {
                Ok(aligned) => Some((aligned.points_before, aligned.points_after)),
                Err(e) => {
                    warn!("cell {cell} skipped: {e}");
                    None
                }
            };
        }
        let shared: Vec<PointId> = ring
            .iter()
            .copied()
            .filter(|&p| data.has_point(f1, p))
            .collect();
        if shared.len() < 3 {
            debug!("cell {cell}: {} shared vertices", shared.len());
            return None;
        }
        Some((data.ring_positions(&shared, f0)?, data.ring_positions(&shared, f1)?))
    }
}

fn outline_area(data: &Dataset, ring: &[PointId], frame: usize) -> Option<f64> {
    ring_polygon(data, ring, frame).map(|p| polygon_area(&p))
}

/// Run `params.method` over `frames`.
pub fn compute_growth(
    data: &Dataset,
    frames: &[usize],
    params: &GrowthParams,
    cancel: &CancelToken,
    sink: &mut dyn ProgressSink,
) -> Result<RunOutcome<GrowthResult>, GrowthError> {
    params
        .method
        .compute_result(data, frames, &params.selection, params.exp_correction, cancel, sink)
}
