//! Cell growth from tracked outlines.
//!
//! - [`tensor`]: affine fit, polar decomposition and growth tensor parameters.
//! - [`align_cells`]: matched resampling of one outline at two frames.
//! - [`CellSelection`]: which cells are measured over a run of frames.
//! - [`GrowthMethod`]: forward/backward, sparse/dense drivers producing a
//!   [`GrowthResult`].

mod align_cells;
mod error;
mod methods;
mod result;
mod selection;
pub mod tensor;

pub use align_cells::{align_cells, ring_polygon, AlignError, AlignedCell};
pub use error::GrowthError;
pub use methods::{compute_growth, GrowthMethod, GrowthParams, MIN_AREA_RATIO};
pub use result::{CellShapes, FrameGrowth, GrowthResult};
pub use selection::CellSelection;
pub use tensor::{
    fit_affine, growth_params, growth_tensor, params_to_tensor, polar_decompose, tensor_to_params,
    GrowthParameters, PolarDecomposition,
};
