//! JSON project configuration, growth reports and image loading.

use std::{
    fs,
    path::{Path, PathBuf},
};

use point_tracker_core::{AlignmentParams, DataError, Dataset, RunMode};
use point_tracker_growth::{GrowthParams, GrowthResult};
use point_tracker_tracking::TrackingParams;
use serde::{Deserialize, Serialize};

#[cfg(feature = "image")]
use log::debug;
#[cfg(feature = "image")]
use point_tracker_core::{FloatImage, PixelLayout};
#[cfg(feature = "image")]
use point_tracker_tracking::{ImageSource, ImageSourceError};
#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug)]
pub enum ProjectIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Data(#[from] DataError),
    #[cfg(feature = "image")]
    #[error("cannot load image {path}: {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("image {path} has invalid dimensions {width}x{height}")]
    ImageSize {
        path: PathBuf,
        width: u32,
        height: u32,
    },
    #[error("{images} image files listed for {frames} frames")]
    ImageCount { images: usize, frames: usize },
}

/// A tracking/growth project: where the data and the images live, and the
/// parameter blocks overriding the defaults.
///
/// Relative paths are resolved against the directory of the config file when
/// loaded through [`ProjectConfig::load_json`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub dataset_path: PathBuf,
    /// Directory holding one image per frame, named after the frame.
    #[serde(default)]
    pub image_dir: Option<PathBuf>,
    /// Explicit image file per frame, in frame order. Takes precedence over
    /// `image_dir`.
    #[serde(default)]
    pub images: Option<Vec<PathBuf>>,
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    #[serde(default)]
    pub tracking: Option<TrackingParams>,
    #[serde(default)]
    pub growth: Option<GrowthParams>,
    #[serde(default)]
    pub alignment: Option<AlignmentParams>,
    #[serde(default)]
    pub run_mode: RunMode,
}

impl ProjectConfig {
    pub fn new(dataset_path: impl Into<PathBuf>) -> Self {
        Self {
            dataset_path: dataset_path.into(),
            image_dir: None,
            images: None,
            output_path: None,
            tracking: None,
            growth: None,
            alignment: None,
            run_mode: RunMode::default(),
        }
    }

    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ProjectIoError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let mut cfg: Self = serde_json::from_str(&raw)?;
        if let Some(base) = path.parent() {
            cfg.resolve_relative_to(base);
        }
        Ok(cfg)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ProjectIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.dataset_path);
        if let Some(dir) = self.image_dir.as_mut() {
            resolve(dir);
        }
        if let Some(output) = self.output_path.as_mut() {
            resolve(output);
        }
        for image in self.images.iter_mut().flatten() {
            resolve(image);
        }
    }

    pub fn load_dataset(&self) -> Result<Dataset, ProjectIoError> {
        Ok(Dataset::load_json(&self.dataset_path)?)
    }

    /// Resolve the output path, defaulting to `default_name` next to the dataset.
    pub fn output_path(&self, default_name: &str) -> PathBuf {
        self.output_path.clone().unwrap_or_else(|| {
            self.dataset_path
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join(default_name)
        })
    }

    pub fn tracking_params(&self) -> TrackingParams {
        self.tracking.clone().unwrap_or_default()
    }

    pub fn growth_params(&self) -> GrowthParams {
        self.growth.clone().unwrap_or_default()
    }

    /// One image file per frame of `data`.
    pub fn image_paths(&self, data: &Dataset) -> Result<Vec<PathBuf>, ProjectIoError> {
        let frames = data.nb_frames();
        if let Some(images) = &self.images {
            if images.len() != frames {
                return Err(ProjectIoError::ImageCount {
                    images: images.len(),
                    frames,
                });
            }
            return Ok(images.clone());
        }
        let dir = self.image_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        Ok(data.frames().iter().map(|f| dir.join(&f.name)).collect())
    }
}

/// Growth result together with where it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowthReport {
    pub dataset_path: String,
    /// `false` when the run was cancelled and `result` holds the completed
    /// frame pairs only.
    pub complete: bool,
    pub result: GrowthResult,
}

impl GrowthReport {
    pub fn new(dataset_path: &Path, result: GrowthResult, complete: bool) -> Self {
        Self {
            dataset_path: dataset_path.to_string_lossy().into_owned(),
            complete,
            result,
        }
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ProjectIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ProjectIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Decode an image file into a single-channel float image.
///
/// Colour images are reduced to the max of their colour channels; greyscale
/// images keep their values (16-bit and float formats are scaled to `[0, 1]`).
#[cfg(feature = "image")]
#[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(path = %path.display())))]
pub fn load_image(path: &Path) -> Result<FloatImage, ProjectIoError> {
    let img = image::open(path).map_err(|source| ProjectIoError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    let (width, height) = (img.width(), img.height());
    let converted = match img {
        image::DynamicImage::ImageLuma8(gray) => {
            FloatImage::from_gray_u8(width as usize, height as usize, gray.as_raw())
        }
        img if img.color().has_color() => {
            let rgba = img.to_rgba8();
            FloatImage::from_packed_color(
                width as usize,
                height as usize,
                rgba.as_raw(),
                PixelLayout::Rgba,
            )
        }
        img => FloatImage::from_vec(width as usize, height as usize, img.to_luma32f().into_raw()),
    };
    converted.ok_or_else(|| ProjectIoError::ImageSize {
        path: path.to_path_buf(),
        width,
        height,
    })
}

/// Frame images read from disk on demand.
///
/// The propagator works on one frame at a time, so only the last decoded
/// image is kept.
#[cfg(feature = "image")]
#[derive(Debug)]
pub struct ImageCache {
    paths: Vec<PathBuf>,
    current: Option<(usize, FloatImage)>,
}

#[cfg(feature = "image")]
impl ImageCache {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            current: None,
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

#[cfg(feature = "image")]
impl ImageSource for ImageCache {
    fn image(&mut self, frame: usize) -> Result<&FloatImage, ImageSourceError> {
        if self.current.as_ref().is_some_and(|(f, _)| *f == frame) {
            debug!("frame {frame}: cached image");
        } else {
            let path = self.paths.get(frame).ok_or_else(|| {
                ImageSourceError::new(format!("no image file for frame {frame}"))
            })?;
            let img = load_image(path).map_err(|e| ImageSourceError::new(e.to_string()))?;
            self.current = Some((frame, img));
        }
        self.current
            .as_ref()
            .map(|(_, img)| img)
            .ok_or_else(|| ImageSourceError::new(format!("no image for frame {frame}")))
    }
}
