//! Core types for tracking points and cells across a time series of
//! microscopy images.
//!
//! This crate holds the data model (frames, points, cells, lineage, walls),
//! plain float images, 2D geometry helpers, run control (progress events,
//! cancellation, inline/background execution) and the rigid image alignment
//! solver. It knows nothing about correlation or growth tensors.

mod dataset;
mod frame;
pub mod geometry;
mod image;
mod image_alignment;
mod logger;
mod progress;

pub use dataset::{
    merge_rings, serde_walls, Cell, CellId, CellViolation, CellViolationKind, DataError, Dataset,
    EditTarget, LifeSpan, PointEdit, PointId, Wall,
};
pub use frame::{rotation_matrix, Frame, RigidTransform};
pub use image::{FloatImage, FloatImageView, PixelLayout};
pub use image_alignment::{
    align_images, apply_alignment, AlignmentError, AlignmentParams, AlignmentSolution,
    RotationReference, TranslationReference,
};
pub use progress::{
    execute, CancelToken, Completion, Execution, NoProgress, ProgressEvent, ProgressSink, RunMode,
    RunOutcome,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, level_from_verbosity};
