//! High-pass pre-filter applied to every image before correlation.

use point_tracker_core::{FloatImage, FloatImageView};

/// `raw - box_mean(raw)` with a `size[0] x size[1]` moving average.
///
/// Borders are handled by mirror reflection (`d c b a | a b c d | d c b a`).
/// A size of 1 on both axes returns the image unchanged.
pub fn high_pass(img: &FloatImageView<'_>, size: [usize; 2]) -> FloatImage {
    let owned = FloatImage {
        width: img.width,
        height: img.height,
        data: img.data.to_vec(),
    };
    if size[0] <= 1 && size[1] <= 1 {
        return owned;
    }
    let mean = box_mean(img, size);
    FloatImage {
        data: owned
            .data
            .iter()
            .zip(&mean.data)
            .map(|(&v, &m)| v - m)
            .collect(),
        ..owned
    }
}

/// Separable moving average with mirror-reflected borders.
pub fn box_mean(img: &FloatImageView<'_>, size: [usize; 2]) -> FloatImage {
    let (w, h) = (img.width, img.height);
    let mut out = FloatImage::new(w, h);
    if w == 0 || h == 0 {
        return out;
    }

    let mut tmp = vec![0.0f64; w * h];
    let mut line = vec![0.0f64; w.max(h)];
    let mut sums = vec![0.0f64; w.max(h)];

    for y in 0..h {
        for x in 0..w {
            line[x] = img.get(x, y) as f64;
        }
        running_mean(&line[..w], size[0], &mut sums[..w]);
        tmp[y * w..(y + 1) * w].copy_from_slice(&sums[..w]);
    }
    for x in 0..w {
        for y in 0..h {
            line[y] = tmp[y * w + x];
        }
        running_mean(&line[..h], size[1], &mut sums[..h]);
        for y in 0..h {
            out.set(x, y, sums[y] as f32);
        }
    }
    out
}

/// Mean over `[i - k/2, i - k/2 + k)` for every `i`, reflected at both ends.
fn running_mean(line: &[f64], k: usize, out: &mut [f64]) {
    let n = line.len();
    let k = k.max(1);
    let half = (k / 2) as i64;
    let at = |i: i64| line[reflect(i, n)];

    let mut acc: f64 = (0..k as i64).map(|j| at(j - half)).sum();
    out[0] = acc / k as f64;
    for i in 1..n as i64 {
        acc += at(i - half + k as i64 - 1) - at(i - half - 1);
        out[i as usize] = acc / k as f64;
    }
}

/// Mirror an out-of-range index back into `0..n` (edge sample repeated).
#[inline]
fn reflect(i: i64, n: usize) -> usize {
    let period = 2 * n as i64;
    let m = i.rem_euclid(period);
    if m < n as i64 {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}
