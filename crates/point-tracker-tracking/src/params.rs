use serde::{Deserialize, Serialize};

/// Matches with a correlation peak below this value are rejected.
pub const MATCH_THRESHOLD: f64 = 0.5;

/// Configuration of the template tracker and the sequential propagator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingParams {
    /// Half extents `[w, h]` of the template patch, in pixels.
    pub template_half_size: [usize; 2],
    /// Half extents `[w, h]` of the search window, in pixels.
    ///
    /// Should be larger than `template_half_size` on both axes, otherwise the
    /// search can only confirm the current position.
    pub search_half_size: [usize; 2],
    /// Size of the high-pass box filter relative to the template size.
    ///
    /// A box of `ratio * 2 * half` pixels (rounded) is used per axis. Sizes of
    /// one pixel or less disable the filter.
    pub filter_size_ratio: f64,
}

impl Default for TrackingParams {
    fn default() -> Self {
        Self {
            template_half_size: [10, 10],
            search_half_size: [25, 25],
            filter_size_ratio: 0.5,
        }
    }
}

impl TrackingParams {
    /// Box filter size `[w, h]` in pixels, at least 1.
    pub fn filter_size(&self) -> [usize; 2] {
        self.template_half_size.map(|half| {
            let size = (self.filter_size_ratio * 2.0 * half as f64).round();
            if size.is_finite() && size > 1.0 {
                size as usize
            } else {
                1
            }
        })
    }
}
