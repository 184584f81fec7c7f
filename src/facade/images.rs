//! Image and auxiliary map fetchers.
//!
//! Responses carry `w`, `h`, a `compressed` flag and one data field. All
//! fetchers return images flipped so that row 0 is the bottom row.

use std::borrow::Cow;

use super::{params, ResponseFields};
use crate::codec::ZlibCodec;
use crate::error::Result;
use crate::image::{interleave_byte_planes, Image, Sample};
use crate::protocol::VariantMap;
use crate::Session;

/// Byte planes used by compressed spectrum projections, one per `f32` byte.
const SPECTRUM_PLANES: usize = 4;

/// Where an image lives in a response and how it is shaped.
struct Layout {
    command: &'static str,
    field: &'static str,
    channels: usize,
}

impl Layout {
    const fn new(command: &'static str, field: &'static str, channels: usize) -> Self {
        Self {
            command,
            field,
            channels,
        }
    }
}

const IMAGE: Layout = Layout::new("getImage", "image_data", 4);
const IMAGE_RGBA8: Layout = Layout::new("getImageRGBA8", "image_data", 4);
const IMAGE_GRAY32F: Layout = Layout::new("getImageGray32F", "image_data", 1);
const IMAGE_GRAY8: Layout = Layout::new("getImageGray8", "image_data", 1);
const DEPTH_MAP: Layout = Layout::new("getDepthMap", "depth_data", 1);
const NORMAL_MAP: Layout = Layout::new("getNormalMap", "normal_data", 3);
const LOS_MAP: Layout = Layout::new("getLOSMap", "los_data", 3);
const TIME_MAP: Layout = Layout::new("getTimeMap", "time_data", 1);

/// Payload bytes of `field`, decompressed when the response says so.
fn payload<'a>(response: &'a VariantMap, field: &str) -> Result<Cow<'a, [u8]>> {
    let raw = response.bytes_field(field)?;
    if response.bool_field("compressed")? {
        Ok(Cow::Owned(ZlibCodec::decompress(raw)?))
    } else {
        Ok(Cow::Borrowed(raw))
    }
}

fn dimensions(response: &VariantMap) -> Result<(usize, usize)> {
    Ok((response.usize_field("w")?, response.usize_field("h")?))
}

fn decode<T: Sample>(response: &VariantMap, layout: &Layout) -> Result<Image<T>> {
    let (width, height) = dimensions(response)?;
    let bytes = payload(response, layout.field)?;
    Ok(Image::from_le_bytes(width, height, layout.channels, &bytes)?.flipped())
}

impl Session {
    async fn fetch<T: Sample>(&self, layout: &Layout) -> Result<Image<T>> {
        let response = self.call(layout.command, VariantMap::new()).await?;
        decode(&response, layout)
    }

    /// `None` when the server has nothing to report (zero-sized map).
    async fn fetch_optional<T: Sample>(&self, layout: &Layout) -> Result<Option<Image<T>>> {
        let response = self.call(layout.command, VariantMap::new()).await?;
        let (width, height) = dimensions(&response)?;
        if width == 0 || height == 0 {
            return Ok(None);
        }
        decode(&response, layout).map(Some)
    }

    /// The last rendered image, four float channels.
    pub async fn get_image(&self) -> Result<Image<f32>> {
        self.fetch(&IMAGE).await
    }

    /// The last rendered image, four 8-bit channels.
    pub async fn get_image_rgba8(&self) -> Result<Image<u8>> {
        self.fetch(&IMAGE_RGBA8).await
    }

    /// Mean of the first three channels, as float.
    pub async fn get_image_gray32f(&self) -> Result<Image<f32>> {
        self.fetch(&IMAGE_GRAY32F).await
    }

    /// Mean of the first three channels, 8-bit.
    pub async fn get_image_gray8(&self) -> Result<Image<u8>> {
        self.fetch(&IMAGE_GRAY8).await
    }

    /// Depth of the last rendered image in double precision.
    pub async fn get_depth_map(&self) -> Result<Image<f64>> {
        self.fetch(&DEPTH_MAP).await
    }

    pub async fn get_normal_map(&self) -> Result<Image<f32>> {
        self.fetch(&NORMAL_MAP).await
    }

    /// Average line of sight per pixel of the last raytraced image.
    pub async fn get_los_map(&self) -> Result<Option<Image<f32>>> {
        self.fetch_optional(&LOS_MAP).await
    }

    /// Average time per pixel of the last raytraced image. Empty pixels are NaN.
    pub async fn get_time_map(&self) -> Result<Option<Image<f32>>> {
        self.fetch_optional(&TIME_MAP).await
    }

    /// Projection of each pixel onto `spectrum`, one float channel.
    pub async fn get_image_spectrum_projection(&self, spectrum: &[f64]) -> Result<Image<f32>> {
        let response = self
            .call(
                "getImageSpectrumProjection",
                params([("spectrum", spectrum.into())]),
            )
            .await?;

        let (width, height) = dimensions(&response)?;
        let raw = response.bytes_field("image_data")?;
        let bytes = if response.bool_field("compressed")? {
            let planar = ZlibCodec::decompress(raw)?;
            Cow::Owned(interleave_byte_planes(&planar, SPECTRUM_PLANES)?)
        } else {
            Cow::Borrowed(raw)
        };

        Ok(Image::from_le_bytes(width, height, 1, &bytes)?.flipped())
    }
}
