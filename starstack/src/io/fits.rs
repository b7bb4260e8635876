//! Primary-HDU FITS access through cfitsio.
//!
//! cfitsio applies BSCALE/BZERO and converts every BITPIX to `f32`. This
//! module only checks that the primary HDU holds a single 2-D plane whose
//! data fits in the file before reading it.

use std::path::Path;

use common::Buffer2;
use fitsio::FitsFile;
use fitsio::hdu::HduInfo;
use fitsio::images::{ImageDescription, ImageType};
use thiserror::Error;

use crate::frame::ChannelFrame;

#[derive(Debug, Error)]
pub(crate) enum FitsError {
    #[error(transparent)]
    Library(#[from] fitsio::errors::Error),
    #[error("{0}")]
    UnsupportedLayout(String),
    #[error("{expected} data bytes needed, file holds {actual}")]
    Truncated { expected: u64, actual: u64 },
}

fn bytes_per_sample(image_type: &ImageType) -> u64 {
    match image_type {
        ImageType::UnsignedByte | ImageType::Byte => 1,
        ImageType::Short | ImageType::UnsignedShort => 2,
        ImageType::Long | ImageType::UnsignedLong | ImageType::Float => 4,
        ImageType::LongLong | ImageType::Double => 8,
    }
}

/// Reads the primary image of the FITS file at `path`, whose size on disk
/// is `file_len` bytes.
pub(crate) fn read(path: &Path, file_len: u64) -> Result<ChannelFrame, FitsError> {
    let mut fptr = FitsFile::open(path)?;
    let hdu = fptr.primary_hdu()?;

    let (shape, image_type) = match &hdu.info {
        HduInfo::ImageInfo { shape, image_type } => (shape.as_slice(), image_type),
        HduInfo::TableInfo { .. } => {
            return Err(FitsError::UnsupportedLayout(
                "primary HDU is a table".to_string(),
            ));
        }
        HduInfo::AnyInfo => {
            return Err(FitsError::UnsupportedLayout(
                "primary HDU is not an image".to_string(),
            ));
        }
    };

    // cfitsio reports axes slowest first: [NAXIS2, NAXIS1] or [NAXIS3, NAXIS2, NAXIS1].
    let (width, height) = match shape {
        [height, width] | [1, height, width] => (*width, *height),
        [planes, _, _] => {
            return Err(FitsError::UnsupportedLayout(format!(
                "3-D image with {planes} planes"
            )));
        }
        other => {
            return Err(FitsError::UnsupportedLayout(format!(
                "NAXIS = {}, expected a 2-D image",
                other.len()
            )));
        }
    };
    if width == 0 || height == 0 {
        return Err(FitsError::UnsupportedLayout(format!(
            "empty image {width}x{height}"
        )));
    }

    let expected = u64::try_from(width)
        .ok()
        .zip(u64::try_from(height).ok())
        .and_then(|(w, h)| w.checked_mul(h))
        .and_then(|count| count.checked_mul(bytes_per_sample(image_type)))
        .ok_or_else(|| {
            FitsError::UnsupportedLayout(format!("{width}x{height} image is too large"))
        })?;
    if expected > file_len {
        return Err(FitsError::Truncated {
            expected,
            actual: file_len,
        });
    }

    let pixels: Vec<f32> = hdu.read_image(&mut fptr)?;
    Buffer2::new(width, height, pixels)
        .ok_or_else(|| FitsError::UnsupportedLayout("pixel count mismatch".to_string()))
}

/// Writes `frame` as a single-plane BITPIX -32 primary image, replacing any
/// existing file.
pub(crate) fn write(frame: &ChannelFrame, path: &Path) -> Result<(), fitsio::errors::Error> {
    let description = ImageDescription {
        data_type: ImageType::Float,
        dimensions: &[frame.height(), frame.width()],
    };
    let mut fptr = FitsFile::create(path)
        .with_custom_primary(&description)
        .overwrite()
        .open()?;
    let hdu = fptr.primary_hdu()?;
    hdu.write_image(&mut fptr, frame.pixels())
}
