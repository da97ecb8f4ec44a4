//! Template-based point tracking with normalized cross-correlation.
//!
//! - [`normalized_cross_correlation`]: full correlation surface of a template
//!   over a target (FFT cross-correlation, integral-image normalisation).
//! - [`find_template`]: relocate one point between two images.
//! - [`PointPropagator`]: carry a set of points through an ordered list of
//!   frames, emitting per-frame add/move batches and progress events.
//!
//! ## Quickstart
//!
//! ```no_run
//! use point_tracker_core::{CancelToken, Dataset, FloatImage, NoProgress};
//! use point_tracker_tracking::{PointPropagator, PropagationRequest, TrackingParams};
//!
//! # fn run(mut data: Dataset, mut images: Vec<FloatImage>) -> Result<(), Box<dyn std::error::Error>> {
//! let mut propagator = PointPropagator::new(TrackingParams::default(), CancelToken::new());
//! let request = PropagationRequest { start: 0, frames: vec![1, 2, 3], points: None };
//! let outcome = propagator.run(&request, &mut data, &mut images, &mut NoProgress)?;
//! println!("{:?}", outcome.into_inner());
//! # Ok(())
//! # }
//! ```

mod correlation;
mod filter;
mod params;
mod propagate;
mod template;

pub use correlation::{normalized_cross_correlation, CorrelationSurface};
pub use filter::{box_mean, high_pass};
pub use params::{TrackingParams, MATCH_THRESHOLD};
pub use propagate::{
    ImageSource, ImageSourceError, PointPropagator, PropagationRequest, PropagationSummary,
    PropagatorState, TrackingError,
};
pub use template::{find_template, SearchWindow, TemplateMatch};
