//! Typed pixel buffers decoded from server payloads.
//!
//! The server sends images as raw sample arrays in its native little-endian
//! layout, row-major with the top row first:
//!
//! ```text
//! row 0     │ px(0,0) c0..cN │ px(1,0) c0..cN │ ...
//! row 1     │ px(0,1) c0..cN │ ...
//! ...
//! row h-1   │ ...
//! ```
//!
//! Fetchers flip these vertically before returning, so row 0 of an
//! [`Image`] is the bottom of the rendered picture.

use crate::error::{Result, SurrenderError};

/// A pixel sample type with a fixed little-endian encoding.
pub trait Sample: Copy + Default + PartialEq + std::fmt::Debug + Send + Sync + 'static {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Decode from exactly `SIZE` bytes.
    fn from_le_slice(bytes: &[u8]) -> Self;

    fn write_le(self, out: &mut Vec<u8>);
}

impl Sample for u8 {
    const SIZE: usize = 1;

    fn from_le_slice(bytes: &[u8]) -> Self {
        bytes[0]
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.push(self);
    }
}

impl Sample for f32 {
    const SIZE: usize = 4;

    fn from_le_slice(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(bytes);
        f32::from_le_bytes(raw)
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl Sample for f64 {
    const SIZE: usize = 8;

    fn from_le_slice(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        f64::from_le_bytes(raw)
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

/// A `height × width × channels` array of samples, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Image<T> {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<T>,
}

impl<T: Sample> Image<T> {
    /// Wrap samples, checking the length against the shape.
    pub fn new(width: usize, height: usize, channels: usize, data: Vec<T>) -> Result<Self> {
        let expected = sample_count(width, height, channels)?;
        if data.len() != expected {
            return Err(SurrenderError::InvalidArgument(format!(
                "{} samples for a {}x{}x{} image",
                data.len(),
                width,
                height,
                channels
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Decode a little-endian sample buffer received from the server.
    pub fn from_le_bytes(width: usize, height: usize, channels: usize, bytes: &[u8]) -> Result<Self> {
        let expected = sample_count(width, height, channels)?
            .checked_mul(T::SIZE)
            .ok_or_else(|| shape_overflow(width, height, channels))?;
        if bytes.len() != expected {
            return Err(SurrenderError::MalformedImage(format!(
                "image buffer holds {} bytes, {}x{}x{} samples of {} bytes need {}",
                bytes.len(),
                width,
                height,
                channels,
                T::SIZE,
                expected
            )));
        }

        let data = bytes.chunks_exact(T::SIZE).map(T::from_le_slice).collect();
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Reverse the row order in place.
    pub fn flip_vertical(&mut self) {
        let stride = self.stride();
        if stride == 0 {
            return;
        }
        let (mut top, mut bottom) = (0, self.height);
        while top + 1 < bottom {
            bottom -= 1;
            let (head, tail) = self.data.split_at_mut(bottom * stride);
            head[top * stride..(top + 1) * stride].swap_with_slice(&mut tail[..stride]);
            top += 1;
        }
    }

    pub fn flipped(mut self) -> Self {
        self.flip_vertical();
        self
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    /// All samples of row `y`.
    pub fn row(&self, y: usize) -> Option<&[T]> {
        if y >= self.height {
            return None;
        }
        let stride = self.stride();
        Some(&self.data[y * stride..(y + 1) * stride])
    }

    /// The channels of the pixel at column `x`, row `y`.
    pub fn pixel(&self, x: usize, y: usize) -> Option<&[T]> {
        if x >= self.width {
            return None;
        }
        let start = x * self.channels;
        self.row(y).map(|row| &row[start..start + self.channels])
    }

    pub fn get(&self, x: usize, y: usize, channel: usize) -> Option<T> {
        self.pixel(x, y)?.get(channel).copied()
    }

    /// Encode the samples back to the little-endian wire layout.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() * T::SIZE);
        for sample in &self.data {
            sample.write_le(&mut out);
        }
        out
    }

    fn stride(&self) -> usize {
        self.width * self.channels
    }
}

/// Rebuild sample-interleaved bytes from `planes` byte planes.
///
/// Plane `p` holds byte `p` of every sample, in sample order. The output
/// holds the bytes of each sample contiguously.
pub fn interleave_byte_planes(planar: &[u8], planes: usize) -> Result<Vec<u8>> {
    if planes == 0 || planar.len() % planes != 0 {
        return Err(SurrenderError::MalformedImage(format!(
            "{} bytes cannot be split into {} byte planes",
            planar.len(),
            planes
        )));
    }
    let samples = planar.len() / planes;
    let mut out = vec![0u8; planar.len()];
    for (p, plane) in planar.chunks_exact(samples.max(1)).enumerate().take(planes) {
        for (i, byte) in plane.iter().enumerate() {
            out[i * planes + p] = *byte;
        }
    }
    Ok(out)
}

fn sample_count(width: usize, height: usize, channels: usize) -> Result<usize> {
    width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(channels))
        .ok_or_else(|| shape_overflow(width, height, channels))
}

fn shape_overflow(width: usize, height: usize, channels: usize) -> SurrenderError {
    SurrenderError::MalformedImage(format!(
        "image shape {}x{}x{} overflows",
        width, height, channels
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(width: usize, height: usize, channels: usize) -> Image<f32> {
        let data = (0..width * height * channels).map(|i| i as f32).collect();
        Image::new(width, height, channels, data).unwrap()
    }

    #[test]
    fn test_from_le_bytes() {
        let mut bytes = Vec::new();
        for v in [1.5f32, -2.0, 0.25, 8.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }

        let image = Image::<f32>::from_le_bytes(2, 2, 1, &bytes).unwrap();

        assert_eq!(image.data(), &[1.5, -2.0, 0.25, 8.0]);
        assert_eq!(image.get(1, 0, 0), Some(-2.0));
        assert_eq!(image.get(0, 1, 0), Some(0.25));
        assert_eq!(image.to_le_bytes(), bytes);
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let err = Image::<f64>::from_le_bytes(2, 2, 1, &[0u8; 24]).unwrap_err();
        assert!(matches!(err, SurrenderError::MalformedImage(_)));
        assert!(!err.is_fatal());
        assert!(Image::<u8>::new(3, 1, 4, vec![0; 11]).is_err());
    }

    #[test]
    fn test_flip_vertical_odd_height() {
        let image = ramp(2, 3, 2).flipped();

        assert_eq!(image.row(0).unwrap(), &[8.0, 9.0, 10.0, 11.0]);
        assert_eq!(image.row(1).unwrap(), &[4.0, 5.0, 6.0, 7.0]);
        assert_eq!(image.row(2).unwrap(), &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(image.pixel(1, 0).unwrap(), &[10.0, 11.0]);
    }

    #[test]
    fn test_flip_twice_is_identity() {
        let original = ramp(5, 4, 3);
        assert_eq!(original.clone().flipped().flipped(), original);
    }

    #[test]
    fn test_flip_empty_image() {
        let image = Image::<u8>::new(0, 0, 4, Vec::new()).unwrap().flipped();
        assert!(image.is_empty());
        assert!(image.row(0).is_none());
    }

    #[test]
    fn test_out_of_bounds_access() {
        let image = ramp(2, 2, 1);
        assert!(image.pixel(2, 0).is_none());
        assert!(image.row(2).is_none());
        assert!(image.get(0, 0, 1).is_none());
    }

    #[test]
    fn test_interleave_byte_planes() {
        let samples = [1.0f32, -3.5, 1e-3];
        let mut planar = vec![0u8; 12];
        for (i, v) in samples.iter().enumerate() {
            for (p, byte) in v.to_le_bytes().iter().enumerate() {
                planar[p * samples.len() + i] = *byte;
            }
        }

        let bytes = interleave_byte_planes(&planar, 4).unwrap();
        let image = Image::<f32>::from_le_bytes(3, 1, 1, &bytes).unwrap();

        assert_eq!(image.data(), &samples);
        assert!(matches!(
            interleave_byte_planes(&[0u8; 5], 4),
            Err(SurrenderError::MalformedImage(_))
        ));
    }
}
