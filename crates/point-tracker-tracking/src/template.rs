//! Relocating one point between two images by template matching.

use log::trace;
use nalgebra::Point2;
use point_tracker_core::FloatImageView;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::correlation::normalized_cross_correlation;

/// Best placement of a template inside a search window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TemplateMatch {
    /// Matched centre in pixel coordinates of the target image.
    pub position: Point2<f64>,
    /// Magnitude of the correlation peak, nominally in `[0, 1]`.
    pub score: f64,
}

/// Window geometry for a single [`find_template`] call, in pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchWindow {
    pub template_center: Point2<f64>,
    pub template_half_size: [usize; 2],
    pub search_center: Point2<f64>,
    pub search_half_size: [usize; 2],
}

/// Locate around `window.search_center` in `target` the patch of `origin`
/// centred on `window.template_center`.
///
/// The template covers `[cx - w, cx + w) x [cy - h, cy + h)`. When it would
/// start before column (row) 0, its half width (height) is reduced to
/// `cx - 1` (`cy - 1`) so it stays centred. The search window is clipped to
/// the target.
///
/// The matched centre is recovered as
/// `(ax + left - h + 1, ay + bottom - w + 1)` from the correlation peak
/// `(ax, ay)`: the x correction uses the template half height and the y
/// correction the half width. Both are equal for square templates.
///
/// Windows that miss the images entirely give a score of 0.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "trace", skip(origin, target), fields(
        cx = window.template_center.x,
        cy = window.template_center.y
    ))
)]
pub fn find_template(
    origin: &FloatImageView<'_>,
    window: &SearchWindow,
    target: &FloatImageView<'_>,
) -> TemplateMatch {
    let cx = window.template_center.x.round() as i64;
    let cy = window.template_center.y.round() as i64;
    let mut tw = window.template_half_size[0] as i64;
    let mut th = window.template_half_size[1] as i64;
    if cx - tw < 0 {
        tw = cx - 1;
    }
    if cy - th < 0 {
        th = cy - 1;
    }

    let degenerate = TemplateMatch {
        position: window.search_center,
        score: 0.0,
    };
    if tw <= 0 || th <= 0 {
        return degenerate;
    }
    let template = origin.crop(cx - tw, cy - th, cx + tw, cy + th);

    let sx = window.search_center.x.round() as i64;
    let sy = window.search_center.y.round() as i64;
    let sw = window.search_half_size[0] as i64;
    let sh = window.search_half_size[1] as i64;
    let search = target.crop(sx - sw, sy - sh, sx + sw, sy + sh);
    let left = (sx - sw).max(0);
    let bottom = (sy - sh).max(0);

    let surface = normalized_cross_correlation(&template.view(), &search.view());
    let Some((ax, ay, score)) = surface.argmax_abs() else {
        trace!("degenerate window around ({sx}, {sy})");
        return degenerate;
    };

    TemplateMatch {
        position: Point2::new(
            (ax as i64 + left - th + 1) as f64,
            (ay as i64 + bottom - tw + 1) as f64,
        ),
        score,
    }
}
