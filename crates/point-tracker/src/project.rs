//! End-to-end runs over a [`ProjectConfig`]: each helper owns its inputs so
//! it can run on the configured [`RunMode`] worker.

use log::{debug, info};
use point_tracker_core::{
    align_images, apply_alignment, execute, AlignmentError, AlignmentSolution, CancelToken,
    DataError, Dataset, ProgressEvent, ProgressSink, RunOutcome,
};
use point_tracker_growth::{compute_growth, GrowthError, GrowthResult};
use point_tracker_tracking::TrackingError;

#[cfg(feature = "image")]
use point_tracker_tracking::{PointPropagator, PropagationRequest, PropagationSummary};

use crate::io::{ProjectConfig, ProjectIoError};
#[cfg(feature = "image")]
use crate::io::ImageCache;

#[derive(thiserror::Error, Debug)]
pub enum ProjectError {
    #[error(transparent)]
    Io(#[from] ProjectIoError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Tracking(#[from] TrackingError),
    #[error(transparent)]
    Growth(#[from] GrowthError),
    #[error(transparent)]
    Alignment(#[from] AlignmentError),
    #[error("project config has no '{0}' section")]
    MissingSection(&'static str),
    #[error("worker thread panicked")]
    WorkerPanicked,
}

/// Progress sink writing events to the log.
#[derive(Debug)]
pub struct LogProgress {
    label: &'static str,
}

impl LogProgress {
    pub fn new(label: &'static str) -> Self {
        Self { label }
    }
}

impl ProgressSink for LogProgress {
    fn emit(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::NextItem { index } => debug!("{}: item {} done", self.label, index),
            ProgressEvent::Finished => info!("{}: finished", self.label),
            ProgressEvent::Aborted => info!("{}: aborted", self.label),
        }
    }
}

/// Frame indices from names, or every frame when `names` is empty.
pub fn resolve_frames(data: &Dataset, names: &[String]) -> Result<Vec<usize>, DataError> {
    if names.is_empty() {
        return Ok((0..data.nb_frames()).collect());
    }
    names.iter().map(|n| data.frame_index(n)).collect()
}

/// Propagate points through the project images and return the edited dataset.
#[cfg(feature = "image")]
pub fn track(
    cfg: &ProjectConfig,
    data: Dataset,
    request: PropagationRequest,
    cancel: CancelToken,
) -> Result<(Dataset, RunOutcome<PropagationSummary>), ProjectError> {
    let images = ImageCache::new(cfg.image_paths(&data)?);
    let params = cfg.tracking_params();
    let job = move || {
        let mut data = data;
        let mut images = images;
        let mut propagator = PointPropagator::new(params, cancel);
        let outcome = propagator.run(&request, &mut data, &mut images, &mut LogProgress::new("tracking"))?;
        Ok::<_, TrackingError>((data, outcome))
    };
    Ok(execute(cfg.run_mode, job)
        .join()
        .ok_or(ProjectError::WorkerPanicked)??)
}

/// Compute growth over `frames` with the project growth parameters.
pub fn growth(
    cfg: &ProjectConfig,
    data: Dataset,
    frames: Vec<usize>,
    cancel: CancelToken,
) -> Result<RunOutcome<GrowthResult>, ProjectError> {
    let params = cfg.growth_params();
    let job = move || {
        compute_growth(&data, &frames, &params, &cancel, &mut LogProgress::new("growth"))
    };
    Ok(execute(cfg.run_mode, job)
        .join()
        .ok_or(ProjectError::WorkerPanicked)??)
}

/// Solve the image alignment and write it into the frames of `data`.
pub fn align(cfg: &ProjectConfig, data: &mut Dataset) -> Result<AlignmentSolution, ProjectError> {
    let params = cfg
        .alignment
        .as_ref()
        .ok_or(ProjectError::MissingSection("alignment"))?;
    let solution = align_images(data, params)?;
    apply_alignment(data, &solution)?;
    Ok(solution)
}
