//! Pixel grid and the Alpaca `ImageBytes` binary frame.
//!
//! The frame is a fixed 44-byte little-endian header of eleven `u32` fields
//! followed by the sample data. Samples are emitted column-major (x outer,
//! y inner) as little-endian `u16`, which is what clients expect for a
//! two-dimensional `imagearray`.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Content type of an encoded [`PixelGrid`] frame.
pub const IMAGE_BYTES_CONTENT_TYPE: &str = "application/imagebytes";

/// Header length in bytes; also the `data_start` field value.
pub const HEADER_LEN: usize = 44;

const METADATA_VERSION: u32 = 1;
/// Declared element type: `Int32`.
const IMAGE_ELEMENT_TYPE: u32 = 2;
/// Transmitted element type: `UInt16`.
const TRANSMISSION_ELEMENT_TYPE: u32 = 8;
const RANK: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageError {
    #[error("pixel buffer holds {actual} samples, expected {width}x{height}")]
    SizeMismatch {
        width: u32,
        height: u32,
        actual: usize,
    },
}

/// `width x height` grid of 16-bit samples, stored row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelGrid {
    width: u32,
    height: u32,
    pixels: Vec<u16>,
}

impl PixelGrid {
    /// Wraps a row-major sample buffer.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::SizeMismatch`] when `pixels.len() != width * height`.
    pub fn new(width: u32, height: u32, pixels: Vec<u16>) -> Result<Self, ImageError> {
        if pixels.len() != sample_count(width, height) {
            return Err(ImageError::SizeMismatch {
                width,
                height,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Grid with every sample set to `value`.
    #[must_use]
    pub fn filled(width: u32, height: u32, value: u16) -> Self {
        Self {
            width,
            height,
            pixels: vec![value; sample_count(width, height)],
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    /// Sample at column `x`, row `y`.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(self.index(x, y)).copied()
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Size of the encoded frame in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + 2 * self.pixels.len()
    }

    /// Encodes the grid as an `ImageBytes` frame.
    #[must_use]
    pub fn to_image_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());

        // metadata_version, error_number, client_transaction_id,
        // server_transaction_id, data_start, image_element_type,
        // transmission_element_type, rank, dim1, dim2, dim3
        #[allow(clippy::cast_possible_truncation)]
        let header = [
            METADATA_VERSION,
            0,
            0,
            0,
            HEADER_LEN as u32,
            IMAGE_ELEMENT_TYPE,
            TRANSMISSION_ELEMENT_TYPE,
            RANK,
            self.width,
            self.height,
            0,
        ];
        for field in header {
            buf.put_u32_le(field);
        }

        for x in 0..self.width {
            for y in 0..self.height {
                buf.put_u16_le(self.pixels[self.index(x, y)]);
            }
        }
        buf.freeze()
    }
}

fn sample_count(width: u32, height: u32) -> usize {
    width as usize * height as usize
}
