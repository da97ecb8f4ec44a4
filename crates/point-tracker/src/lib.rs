//! High-level facade crate for the `point-tracker-*` workspace.
//!
//! This crate provides:
//! - stable, convenient re-exports of the underlying crates
//! - JSON project configuration and growth reports
//! - (feature-gated) image loading through the `image` crate, so point
//!   propagation can run straight from image files on disk.
//!
//! ## Quickstart
//!
//! ```no_run
//! use point_tracker::io::ProjectConfig;
//! use point_tracker::core::CancelToken;
//! use point_tracker::project;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = ProjectConfig::load_json("project.json")?;
//! let data = cfg.load_dataset()?;
//! let frames = project::resolve_frames(&data, &[])?;
//! let result = project::growth(&cfg, data, frames, CancelToken::new())?.into_inner();
//! println!("{} cell measurements", result.nb_measurements());
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `point_tracker::core`: dataset model, images, geometry, progress and
//!   cancellation, image alignment.
//! - `point_tracker::tracking`: normalized cross-correlation, template
//!   matching and point propagation.
//! - `point_tracker::growth`: growth tensors, outline alignment, cell
//!   selection and the growth drivers.
//! - `point_tracker::io`: project config, reports, image loading (feature `image`).
//! - `point_tracker::project`: end-to-end runs over a project config.

pub use point_tracker_core as core;
pub use point_tracker_growth as growth;
pub use point_tracker_tracking as tracking;

pub use point_tracker_core::{CancelToken, Dataset, FloatImage, RunMode, RunOutcome};
pub use point_tracker_growth::{CellSelection, GrowthMethod, GrowthParams, GrowthResult};
pub use point_tracker_tracking::{PointPropagator, PropagationRequest, TrackingParams};

pub mod io;
pub mod project;
