//! Sequential propagation of points through an ordered list of frames.
//!
//! For each consecutive pair of frames every point of the working set is
//! relocated with [`find_template`] on high-pass filtered images. Accepted
//! matches become one `Add` batch (points new to the frame) and one `Move`
//! batch (points that already existed there) per frame; rejected points leave
//! the working set. Cancellation is polled once per frame.

use log::{debug, info};
use point_tracker_core::{
    CancelToken, Completion, DataError, EditTarget, FloatImage, PointEdit, PointId, ProgressSink,
    RunOutcome,
};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::filter::high_pass;
use crate::params::{TrackingParams, MATCH_THRESHOLD};
use crate::template::{find_template, SearchWindow};

/// Supplies single-channel images by frame index.
///
/// The image cache lives with the caller; the propagator borrows one image at
/// a time and filters it into its own buffer straight away.
pub trait ImageSource {
    fn image(&mut self, frame: usize) -> Result<&FloatImage, ImageSourceError>;
}

/// Error raised by an [`ImageSource`].
#[derive(thiserror::Error, Debug)]
#[error("{reason}")]
pub struct ImageSourceError {
    pub reason: String,
}

impl ImageSourceError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl ImageSource for [FloatImage] {
    fn image(&mut self, frame: usize) -> Result<&FloatImage, ImageSourceError> {
        let count = self.len();
        self.get(frame)
            .ok_or_else(|| ImageSourceError::new(format!("no image for frame {frame} ({count} images)")))
    }
}

impl ImageSource for Vec<FloatImage> {
    fn image(&mut self, frame: usize) -> Result<&FloatImage, ImageSourceError> {
        self.as_mut_slice().image(frame)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TrackingError {
    #[error("image for frame '{frame}' unavailable: {source}")]
    Image {
        frame: String,
        #[source]
        source: ImageSourceError,
    },
    #[error("propagation is already {0:?}")]
    NotIdle(PropagatorState),
    #[error(transparent)]
    Data(#[from] DataError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagatorState {
    Idle,
    Running,
    Completed,
    Aborted,
}

/// What to propagate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PropagationRequest {
    /// Frame the positions are read from.
    pub start: usize,
    /// Frames to visit after `start`, in order.
    pub frames: Vec<usize>,
    /// Points to track. All points of the start frame when absent.
    #[serde(default)]
    pub points: Option<Vec<PointId>>,
}

/// Aggregate counts of a propagation run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationSummary {
    pub frames_done: usize,
    pub added: usize,
    pub moved: usize,
    pub rejected: usize,
    /// Points still tracked after the last processed frame.
    pub remaining: Vec<PointId>,
}

/// Single-use driver of one propagation run.
#[derive(Debug)]
pub struct PointPropagator {
    params: TrackingParams,
    cancel: CancelToken,
    state: PropagatorState,
}

impl PointPropagator {
    pub fn new(params: TrackingParams, cancel: CancelToken) -> Self {
        Self {
            params,
            cancel,
            state: PropagatorState::Idle,
        }
    }

    pub fn params(&self) -> &TrackingParams {
        &self.params
    }

    pub fn state(&self) -> PropagatorState {
        self.state
    }

    /// Run the propagation, pushing one `Add` and one `Move` batch per frame
    /// into `target`.
    ///
    /// Exactly one terminal event (`Finished` or `Aborted`) reaches `sink`,
    /// also when an error interrupts the run. Batches applied before a
    /// cancellation or an error stay applied.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(start = request.start, frames = request.frames.len()))
    )]
    pub fn run<E, I>(
        &mut self,
        request: &PropagationRequest,
        target: &mut E,
        images: &mut I,
        sink: &mut dyn ProgressSink,
    ) -> Result<RunOutcome<PropagationSummary>, TrackingError>
    where
        E: EditTarget + ?Sized,
        I: ImageSource + ?Sized,
    {
        if self.state != PropagatorState::Idle {
            return Err(TrackingError::NotIdle(self.state));
        }
        self.state = PropagatorState::Running;
        let mut progress = Completion::new(sink);
        let result = self.propagate(request, target, images, &mut progress);
        match result {
            Ok(RunOutcome::Completed(summary)) => {
                self.state = PropagatorState::Completed;
                info!(
                    "propagation finished: {} frames, {} added, {} moved, {} rejected",
                    summary.frames_done, summary.added, summary.moved, summary.rejected
                );
                progress.finish();
                Ok(RunOutcome::Completed(summary))
            }
            Ok(RunOutcome::Aborted(summary)) => {
                self.state = PropagatorState::Aborted;
                info!("propagation cancelled after {} frames", summary.frames_done);
                progress.abort();
                Ok(RunOutcome::Aborted(summary))
            }
            Err(e) => {
                self.state = PropagatorState::Aborted;
                Err(e)
            }
        }
    }

    fn propagate<E, I>(
        &self,
        request: &PropagationRequest,
        target: &mut E,
        images: &mut I,
        progress: &mut Completion<'_>,
    ) -> Result<RunOutcome<PropagationSummary>, TrackingError>
    where
        E: EditTarget + ?Sized,
        I: ImageSource + ?Sized,
    {
        let data = target.dataset();
        data.frame(request.start)?;
        for &f in &request.frames {
            data.frame(f)?;
        }
        let mut working: Vec<PointId> = match &request.points {
            Some(ids) => ids
                .iter()
                .copied()
                .filter(|&p| data.has_point(request.start, p))
                .collect(),
            None => data.points_in_frame(request.start).map(|(id, _)| id).collect(),
        };
        let filter_size = self.params.filter_size();

        let mut summary = PropagationSummary::default();
        let mut current = request.start;
        let mut current_img = filtered(images, &*target, current, filter_size)?;

        for (index, &next) in request.frames.iter().enumerate() {
            if self.cancel.is_cancelled() {
                summary.remaining = working;
                return Ok(RunOutcome::Aborted(summary));
            }
            let next_img = filtered(images, &*target, next, filter_size)?;

            let data = target.dataset();
            let from = data.frame(current)?;
            let to = data.frame(next)?;
            let mut added = Vec::new();
            let mut moved = Vec::new();
            let mut kept = Vec::with_capacity(working.len());
            for &point in &working {
                let Some(local) = data.position(current, point) else {
                    continue;
                };
                let window = SearchWindow {
                    template_center: from.local_to_pixel(local),
                    template_half_size: self.params.template_half_size,
                    search_center: to.reference_to_pixel(from.to_reference(local)),
                    search_half_size: self.params.search_half_size,
                };
                let found = find_template(&current_img.view(), &window, &next_img.view());
                if found.score < MATCH_THRESHOLD {
                    debug!(
                        "point {point} lost between '{}' and '{}' (score {:.3})",
                        from.name, to.name, found.score
                    );
                    summary.rejected += 1;
                    continue;
                }
                let entry = (point, to.pixel_to_local(found.position));
                if data.has_point(next, point) {
                    moved.push(entry);
                } else {
                    added.push(entry);
                }
                kept.push(point);
            }

            summary.added += added.len();
            summary.moved += moved.len();
            if !added.is_empty() {
                target.apply(PointEdit::Add {
                    frame: next,
                    points: added,
                })?;
            }
            if !moved.is_empty() {
                target.apply(PointEdit::Move {
                    frame: next,
                    points: moved,
                })?;
            }

            working = kept;
            summary.frames_done += 1;
            progress.next_item(index);
            current = next;
            current_img = next_img;
        }
        summary.remaining = working;
        Ok(RunOutcome::Completed(summary))
    }
}

fn filtered<E, I>(
    images: &mut I,
    target: &E,
    frame: usize,
    size: [usize; 2],
) -> Result<FloatImage, TrackingError>
where
    E: EditTarget + ?Sized,
    I: ImageSource + ?Sized,
{
    match images.image(frame) {
        Ok(img) => Ok(high_pass(&img.view(), size)),
        Err(source) => Err(TrackingError::Image {
            frame: target.dataset().frame(frame)?.name.clone(),
            source,
        }),
    }
}
