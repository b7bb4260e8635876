//! Frame loading and result writing.

pub mod fits;

use std::path::{Path, PathBuf};

use image::error::{ParameterError, ParameterErrorKind};
use image::{ImageFormat, RgbImage};
use rayon::prelude::*;
use thiserror::Error;

use crate::frame::{Channel, ChannelBatch, ChannelFrame, FrameId};
use crate::merge::CompositeImage;
use crate::registration::Skip;
use fits::FitsError;

/// A frame could not be read.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("'{}' not found", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read FITS file '{}': {source}", path.display())]
    Fits {
        path: PathBuf,
        source: fitsio::errors::Error,
    },

    #[error("unsupported image layout in '{}': {reason}", path.display())]
    UnsupportedLayout { path: PathBuf, reason: String },

    #[error("'{}' is truncated: {expected} data bytes needed, file holds {actual}", path.display())]
    Truncated {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },
}

impl LoadError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            LoadError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            LoadError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    fn fits(path: &Path, error: FitsError) -> Self {
        match error {
            FitsError::Library(fitsio::errors::Error::Io(source)) => LoadError::io(path, source),
            FitsError::Library(source) => LoadError::Fits {
                path: path.to_path_buf(),
                source,
            },
            FitsError::UnsupportedLayout(reason) => LoadError::UnsupportedLayout {
                path: path.to_path_buf(),
                reason,
            },
            FitsError::Truncated { expected, actual } => LoadError::Truncated {
                path: path.to_path_buf(),
                expected,
                actual,
            },
        }
    }
}

/// A result could not be written.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to write '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write FITS file '{}': {source}", path.display())]
    Fits {
        path: PathBuf,
        source: fitsio::errors::Error,
    },

    #[error("failed to encode '{}': {source}", path.display())]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("unsupported output extension '{extension}'")]
    UnsupportedExtension { extension: String },
}

/// Reads the primary image HDU of a FITS file.
pub fn load_frame(path: &Path) -> Result<ChannelFrame, LoadError> {
    let metadata = std::fs::metadata(path).map_err(|e| LoadError::io(path, e))?;
    fits::read(path, metadata.len()).map_err(|e| LoadError::fits(path, e))
}

/// Regular files in `dir` whose names match `pattern`, sorted by path.
pub fn list_files(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, LoadError> {
    if !dir.is_dir() {
        return Err(LoadError::NotFound {
            path: dir.to_path_buf(),
        });
    }
    common::file_utils::files_matching(dir, pattern).map_err(|e| LoadError::io(dir, e))
}

/// Loads `paths` in parallel. Unreadable files become skips of the batch.
pub fn load_batch(channel: Channel, paths: &[PathBuf]) -> ChannelBatch {
    let loaded: Vec<_> = paths
        .par_iter()
        .map(|path| (path, load_frame(path)))
        .collect();

    let mut batch = ChannelBatch::new(channel);
    for (path, result) in loaded {
        let id = FrameId::from(path.as_path());
        match result {
            Ok(frame) => batch.push(id, frame),
            Err(error) => {
                tracing::warn!(channel = %channel, frame = %id, %error, "Frame could not be loaded");
                batch.skipped.push(Skip::new(id, error));
            }
        }
    }
    tracing::info!(
        channel = %channel,
        loaded = batch.len(),
        failed = batch.skipped.len(),
        "Batch loaded"
    );
    batch
}

/// Writes a single-plane 32-bit float FITS file, replacing any existing one.
pub fn write_fits(frame: &ChannelFrame, path: &Path) -> Result<(), WriteError> {
    fits::write(frame, path).map_err(|error| match error {
        fitsio::errors::Error::Io(source) => WriteError::Io {
            path: path.to_path_buf(),
            source,
        },
        source => WriteError::Fits {
            path: path.to_path_buf(),
            source,
        },
    })
}

/// Writes the 8-bit RGB rendering of `composite`. The format follows the
/// extension; a path without one is written as PNG.
pub fn write_composite(composite: &CompositeImage, path: &Path) -> Result<(), WriteError> {
    let format = match path.extension().and_then(|e| e.to_str()) {
        None => ImageFormat::Png,
        Some(extension) => ImageFormat::from_extension(extension)
            .filter(|format| format.writing_enabled())
            .ok_or_else(|| WriteError::UnsupportedExtension {
                extension: extension.to_string(),
            })?,
    };

    let image_error = |source| WriteError::Image {
        path: path.to_path_buf(),
        source,
    };
    let image = RgbImage::from_raw(
        composite.width() as u32,
        composite.height() as u32,
        composite.to_rgb8(),
    )
    .ok_or_else(|| {
        image_error(image::ImageError::Parameter(ParameterError::from_kind(
            ParameterErrorKind::DimensionMismatch,
        )))
    })?;

    image.save_with_format(path, format).map_err(|error| match error {
        image::ImageError::IoError(source) => WriteError::Io {
            path: path.to_path_buf(),
            source,
        },
        other => image_error(other),
    })
}
