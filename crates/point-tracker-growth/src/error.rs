use point_tracker_core::DataError;

/// Errors that abort a whole growth computation.
///
/// Per-cell failures (degenerate fits, misaligned outlines) never surface
/// here; the cell is skipped and the run carries on.
#[derive(thiserror::Error, Debug)]
pub enum GrowthError {
    #[error("growth needs at least two frames, got {0}")]
    NotEnoughFrames(usize),
    #[error("frames must be in increasing time order ('{first}' is not before '{second}')")]
    FrameOrder { first: String, second: String },
    #[error("dense methods need a positive number of points")]
    NoSamples,
    #[error(transparent)]
    Data(#[from] DataError),
}
