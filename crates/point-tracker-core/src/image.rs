use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug)]
pub struct FloatImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [f32], // row-major, len = w*h
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FloatImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

/// Byte order of packed 32-bit colour pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelLayout {
    /// `[a, r, g, b]` per pixel.
    Argb,
    /// `[r, g, b, a]` per pixel.
    Rgba,
}

impl PixelLayout {
    #[inline]
    fn color_channels(self) -> std::ops::Range<usize> {
        match self {
            PixelLayout::Argb => 1..4,
            PixelLayout::Rgba => 0..3,
        }
    }
}

impl FloatImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    pub fn from_vec(width: usize, height: usize, data: Vec<f32>) -> Option<Self> {
        if data.len() != width * height {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Convert an 8-bit grayscale buffer.
    pub fn from_gray_u8(width: usize, height: usize, data: &[u8]) -> Option<Self> {
        Self::from_vec(width, height, data.iter().map(|&v| v as f32).collect())
    }

    /// Reduce a packed colour buffer to one channel by taking the max of the
    /// colour channels. Alpha is ignored.
    pub fn from_packed_color(
        width: usize,
        height: usize,
        data: &[u8],
        layout: PixelLayout,
    ) -> Option<Self> {
        if data.len() != width * height * 4 {
            return None;
        }
        let channels = layout.color_channels();
        let reduced = data
            .chunks_exact(4)
            .map(|px| px[channels.clone()].iter().copied().max().unwrap_or(0) as f32)
            .collect();
        Self::from_vec(width, height, reduced)
    }

    #[inline]
    pub fn view(&self) -> FloatImageView<'_> {
        FloatImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: f32) {
        self.data[y * self.width + x] = v;
    }
}

impl FloatImageView<'_> {
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    /// Copy the half-open window `[x0, x1) x [y0, y1)`, clipped to the image.
    ///
    /// Returns an empty image when the clipped window has no area.
    pub fn crop(&self, x0: i64, y0: i64, x1: i64, y1: i64) -> FloatImage {
        let cx0 = x0.clamp(0, self.width as i64) as usize;
        let cy0 = y0.clamp(0, self.height as i64) as usize;
        let cx1 = x1.clamp(0, self.width as i64) as usize;
        let cy1 = y1.clamp(0, self.height as i64) as usize;
        if cx1 <= cx0 || cy1 <= cy0 {
            return FloatImage::default();
        }
        let w = cx1 - cx0;
        let h = cy1 - cy0;
        let mut data = Vec::with_capacity(w * h);
        for y in cy0..cy1 {
            let row = y * self.width;
            data.extend_from_slice(&self.data[row + cx0..row + cx1]);
        }
        FloatImage {
            width: w,
            height: h,
            data,
        }
    }
}
