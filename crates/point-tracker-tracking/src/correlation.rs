//! Fast normalized cross-correlation (J. P. Lewis, "Fast Normalized
//! Cross-Correlation", 1995).
//!
//! The raw correlation is computed in the Fourier domain; local sums of the
//! target and of its square come from integral images, so each normalisation
//! costs O(1) per output sample.

use point_tracker_core::FloatImageView;
use rustfft::{num_complex::Complex, FftPlanner};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Full correlation surface: one coefficient per placement of the template
/// overlapping the target, `(H + h - 1) x (W + w - 1)` samples.
///
/// Sample `(x, y)` corresponds to the template's bottom-right pixel lying on
/// target pixel `(x, y)`, i.e. its top-left pixel on `(x - w + 1, y - h + 1)`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CorrelationSurface {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f64>,
}

impl CorrelationSurface {
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.data[y * self.width + x]
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Position and value of the largest `|c|`, first in row-major order on ties.
    pub fn argmax_abs(&self) -> Option<(usize, usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (i, v) in self.data.iter().map(|v| v.abs()).enumerate() {
            if best.is_none_or(|(_, b)| v > b) {
                best = Some((i, v));
            }
        }
        best.map(|(i, v)| (i % self.width, i / self.width, v))
    }
}

/// Normalized cross-correlation of `template` over `target`.
///
/// Coefficients lie in `[-1, 1]` up to rounding. Placements where the
/// normalisation denominator is negligible (flat target window, constant
/// template) are scored 0. Degenerate (empty) inputs give an empty surface.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(
        template = ?(template.width, template.height),
        target = ?(target.width, target.height)
    ))
)]
pub fn normalized_cross_correlation(
    template: &FloatImageView<'_>,
    target: &FloatImageView<'_>,
) -> CorrelationSurface {
    let (tw, th) = (template.width, template.height);
    let (aw, ah) = (target.width, target.height);
    if tw == 0 || th == 0 || aw == 0 || ah == 0 {
        return CorrelationSurface::default();
    }
    let width = aw + tw - 1;
    let height = ah + th - 1;

    let xcorr = fft_correlate(template, target, width, height);

    let mn = (tw * th) as f64;
    let t_sum: f64 = template.data.iter().map(|&v| v as f64).sum();
    let t_mean = t_sum / mn;
    let t_ss: f64 = template
        .data
        .iter()
        .map(|&v| {
            let d = v as f64 - t_mean;
            d * d
        })
        .sum();
    // sqrt(mn - 1) * unbiased std of the template.
    let denom_t = if mn > 1.0 {
        (mn - 1.0).sqrt() * (t_ss / (mn - 1.0)).sqrt()
    } else {
        0.0
    };

    let sums = IntegralImage::new(target, false);
    let sums_sq = IntegralImage::new(target, true);

    let mut numerator = vec![0.0; width * height];
    let mut denom = vec![0.0; width * height];
    for y in 0..height {
        // Target rows covered by the template for this placement.
        let y0 = (y + 1).saturating_sub(th);
        let y1 = (y + 1).min(ah);
        for x in 0..width {
            let x0 = (x + 1).saturating_sub(tw);
            let x1 = (x + 1).min(aw);
            let s = sums.sum(x0, y0, x1, y1);
            let s2 = sums_sq.sum(x0, y0, x1, y1);
            let i = y * width + x;
            let local = (s2 - s * s / mn).max(0.0);
            numerator[i] = xcorr[i] - s * t_sum / mn;
            denom[i] = denom_t * local.sqrt();
        }
    }

    let max_denom = denom.iter().fold(0.0f64, |m, &d| m.max(d.abs()));
    let tol = 1000.0 * spacing(max_denom);
    let data = numerator
        .iter()
        .zip(&denom)
        .map(|(&n, &d)| if d > tol { n / d } else { 0.0 })
        .collect();

    CorrelationSurface {
        width,
        height,
        data,
    }
}

/// Distance from `x` to the next larger representable `f64`.
#[inline]
fn spacing(x: f64) -> f64 {
    let x = x.abs();
    x.next_up() - x
}

/// Raw full cross-correlation via FFT convolution of the 180°-rotated
/// template with the target, zero-padded to `width x height`.
fn fft_correlate(
    template: &FloatImageView<'_>,
    target: &FloatImageView<'_>,
    width: usize,
    height: usize,
) -> Vec<f64> {
    let mut fft = Fft2d::new(width, height);

    let mut a = vec![Complex::new(0.0, 0.0); width * height];
    for y in 0..target.height {
        for x in 0..target.width {
            a[y * width + x].re = target.get(x, y) as f64;
        }
    }
    let mut t = vec![Complex::new(0.0, 0.0); width * height];
    let (tw, th) = (template.width, template.height);
    for y in 0..th {
        for x in 0..tw {
            t[(th - 1 - y) * width + (tw - 1 - x)].re = template.get(x, y) as f64;
        }
    }

    fft.forward(&mut a);
    fft.forward(&mut t);
    for (av, tv) in a.iter_mut().zip(&t) {
        *av *= tv;
    }
    fft.inverse(&mut a);

    let scale = 1.0 / (width * height) as f64;
    a.iter().map(|c| c.re * scale).collect()
}

struct Fft2d {
    width: usize,
    height: usize,
    row_fwd: std::sync::Arc<dyn rustfft::Fft<f64>>,
    row_inv: std::sync::Arc<dyn rustfft::Fft<f64>>,
    col_fwd: std::sync::Arc<dyn rustfft::Fft<f64>>,
    col_inv: std::sync::Arc<dyn rustfft::Fft<f64>>,
    column: Vec<Complex<f64>>,
}

impl Fft2d {
    fn new(width: usize, height: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            width,
            height,
            row_fwd: planner.plan_fft_forward(width),
            row_inv: planner.plan_fft_inverse(width),
            col_fwd: planner.plan_fft_forward(height),
            col_inv: planner.plan_fft_inverse(height),
            column: vec![Complex::new(0.0, 0.0); height],
        }
    }

    fn forward(&mut self, data: &mut [Complex<f64>]) {
        let (row, col) = (self.row_fwd.clone(), self.col_fwd.clone());
        self.transform(data, row.as_ref(), col.as_ref());
    }

    fn inverse(&mut self, data: &mut [Complex<f64>]) {
        let (row, col) = (self.row_inv.clone(), self.col_inv.clone());
        self.transform(data, row.as_ref(), col.as_ref());
    }

    fn transform(
        &mut self,
        data: &mut [Complex<f64>],
        row: &dyn rustfft::Fft<f64>,
        col: &dyn rustfft::Fft<f64>,
    ) {
        // Rows are contiguous, rustfft processes them as a batch.
        row.process(data);
        for x in 0..self.width {
            for y in 0..self.height {
                self.column[y] = data[y * self.width + x];
            }
            col.process(&mut self.column);
            for y in 0..self.height {
                data[y * self.width + x] = self.column[y];
            }
        }
    }
}

/// Summed-area table with a zero first row and column.
struct IntegralImage {
    stride: usize,
    table: Vec<f64>,
}

impl IntegralImage {
    fn new(img: &FloatImageView<'_>, squared: bool) -> Self {
        let stride = img.width + 1;
        let mut table = vec![0.0; stride * (img.height + 1)];
        for y in 0..img.height {
            let mut row = 0.0;
            for x in 0..img.width {
                let v = img.get(x, y) as f64;
                row += if squared { v * v } else { v };
                table[(y + 1) * stride + x + 1] = table[y * stride + x + 1] + row;
            }
        }
        Self { stride, table }
    }

    /// Sum over `[x0, x1) x [y0, y1)`.
    #[inline]
    fn sum(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> f64 {
        let s = self.stride;
        self.table[y1 * s + x1] - self.table[y0 * s + x1] - self.table[y1 * s + x0]
            + self.table[y0 * s + x0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use point_tracker_core::FloatImage;

    fn ramp(w: usize, h: usize) -> FloatImage {
        let data = (0..w * h)
            .map(|i| {
                let (x, y) = ((i % w) as f32, (i / w) as f32);
                (x * 0.7).sin() * 40.0 + (y * 1.3).cos() * 25.0 + x * y * 0.1
            })
            .collect();
        FloatImage::from_vec(w, h, data).expect("image")
    }

    /// Direct evaluation of one coefficient, for cross-checking.
    fn direct(template: &FloatImage, target: &FloatImage, x: usize, y: usize) -> f64 {
        let (tw, th) = (template.width as i64, template.height as i64);
        let mn = (tw * th) as f64;
        let t_mean: f64 = template.data.iter().map(|&v| v as f64).sum::<f64>() / mn;
        let mut window = Vec::new();
        for j in 0..th {
            for i in 0..tw {
                let ax = x as i64 - tw + 1 + i;
                let ay = y as i64 - th + 1 + j;
                let a = if ax >= 0 && ay >= 0 && ax < target.width as i64 && ay < target.height as i64 {
                    target.get(ax as usize, ay as usize) as f64
                } else {
                    0.0
                };
                window.push(a);
            }
        }
        let a_mean = window.iter().sum::<f64>() / mn;
        let mut num = 0.0;
        let mut ta = 0.0;
        let mut aa = 0.0;
        for (k, a) in window.iter().enumerate() {
            let t = template.data[k] as f64 - t_mean;
            num += t * (a - a_mean);
            ta += t * t;
            aa += (a - a_mean) * (a - a_mean);
        }
        num / (ta.sqrt() * aa.sqrt())
    }

    #[test]
    fn matches_direct_evaluation() {
        let target = ramp(17, 13);
        let template = target.view().crop(4, 3, 9, 10);
        let surface = normalized_cross_correlation(&template.view(), &target.view());
        assert_eq!((surface.width, surface.height), (17 + 5 - 1, 13 + 7 - 1));
        for &(x, y) in &[(8usize, 9usize), (3, 2), (20, 18), (12, 6)] {
            let expected = direct(&template, &target, x, y);
            assert!(
                (surface.get(x, y) - expected).abs() < 1e-9,
                "({x},{y}): {} vs {expected}",
                surface.get(x, y)
            );
        }
    }

    #[test]
    fn exact_sub_patch_peaks_at_one() {
        let target = ramp(24, 20);
        let template = target.view().crop(6, 5, 14, 13);
        let surface = normalized_cross_correlation(&template.view(), &target.view());
        let (x, y, v) = surface.argmax_abs().expect("peak");
        assert_eq!((x, y), (13, 12));
        assert!(v > 0.999_999);
    }

    #[test]
    fn flat_template_scores_zero() {
        let target = ramp(10, 10);
        let template = FloatImage::from_vec(3, 3, vec![5.0; 9]).expect("flat");
        let surface = normalized_cross_correlation(&template.view(), &target.view());
        assert!(surface.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn empty_inputs_give_empty_surface() {
        let target = ramp(10, 10);
        let empty = FloatImage::default();
        assert!(normalized_cross_correlation(&empty.view(), &target.view()).is_empty());
        assert!(normalized_cross_correlation(&target.view(), &empty.view()).is_empty());
    }
}
