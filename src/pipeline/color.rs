use anyhow::{Result, anyhow};
#[cfg(feature = "camera-nokhwa")]
use nokhwa::{Buffer, utils::FrameFormat};
use rayon::prelude::*;
use yuv::{
    YuvBiPlanarImage, YuvConversionMode, YuvPackedImage, YuvRange, YuvStandardMatrix,
    yuv_nv12_to_rgba, yuyv422_to_rgba,
};
use zune_jpeg::{
    JpegDecoder,
    zune_core::{bytestream::ZCursor, colorspace::ColorSpace, options::DecoderOptions},
};

use crate::types::{DisplayFrame, Frame};

#[derive(Debug)]
pub struct RgbaImage {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Decode a camera buffer into a raw BGR frame.
#[cfg(feature = "camera-nokhwa")]
pub fn convert_camera_frame(frame: &Buffer) -> Result<Frame> {
    let resolution = frame.resolution();
    let width = resolution.width_x;
    let height = resolution.height_y;
    let data = frame.buffer();

    let bgr = match frame.source_frame_format() {
        FrameFormat::NV12 => rgba_to_bgr(&nv12_to_rgba(data, width, height)?),
        FrameFormat::YUYV => rgba_to_bgr(&yuyv_to_rgba(data, width, height)?),
        FrameFormat::MJPEG => {
            let decoded = decode_mjpeg(data)?;
            if decoded.width != width || decoded.height != height {
                log::debug!(
                    "MJPEG frame is {}x{}, camera reported {width}x{height}",
                    decoded.width,
                    decoded.height
                );
            }
            return Ok(Frame::new(
                rgba_to_bgr(&decoded.rgba),
                decoded.width,
                decoded.height,
            ));
        }
        FrameFormat::RAWRGB => swap_rb(checked(data, width, height, 3, "RGB")?),
        FrameFormat::RAWBGR => checked(data, width, height, 3, "BGR")?.to_vec(),
        FrameFormat::GRAY => gray_to_bgr(checked(data, width, height, 1, "GRAY")?),
    };

    Ok(Frame::new(bgr, width, height))
}

fn checked<'a>(data: &'a [u8], width: u32, height: u32, channels: usize, label: &str) -> Result<&'a [u8]> {
    let expected_len = width as usize * height as usize * channels;
    if data.len() < expected_len {
        return Err(anyhow!(
            "{label} buffer too small: got {}, expected {}",
            data.len(),
            expected_len
        ));
    }
    Ok(&data[..expected_len])
}

fn nv12_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let y_plane_len = width as usize * height as usize;
    let uv_plane_len = y_plane_len / 2;

    if data.len() < y_plane_len + uv_plane_len {
        return Err(anyhow!(
            "NV12 buffer too small: got {}, expected {}",
            data.len(),
            y_plane_len + uv_plane_len
        ));
    }

    let mut rgba = vec![0u8; y_plane_len * 4];
    let image = YuvBiPlanarImage {
        y_plane: &data[..y_plane_len],
        y_stride: width,
        uv_plane: &data[y_plane_len..y_plane_len + uv_plane_len],
        uv_stride: width,
        width,
        height,
    };

    yuv_nv12_to_rgba(
        &image,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
        YuvConversionMode::Balanced,
    )
    .map_err(|err| anyhow!("NV12→RGBA failed: {err:?}"))?;

    Ok(rgba)
}

fn yuyv_to_rgba(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let yuy = checked(data, width, height, 2, "YUYV")?;

    let mut rgba = vec![0u8; (width as usize * height as usize) * 4];
    let packed = YuvPackedImage {
        yuy,
        yuy_stride: width * 2,
        width,
        height,
    };

    yuyv422_to_rgba(
        &packed,
        &mut rgba,
        width * 4,
        YuvRange::Full,
        YuvStandardMatrix::Bt709,
    )
    .map_err(|err| anyhow!("YUYV422→RGBA failed: {err:?}"))?;

    Ok(rgba)
}

pub fn decode_mjpeg(data: &[u8]) -> Result<RgbaImage> {
    let options = DecoderOptions::default().jpeg_set_out_colorspace(ColorSpace::RGBA);
    let mut decoder = JpegDecoder::new_with_options(ZCursor::new(data), options);
    let rgba = decoder
        .decode()
        .map_err(|err| anyhow!("MJPEG decode failed: {err:?}"))?;

    let info = decoder
        .info()
        .ok_or_else(|| anyhow!("MJPEG decoder produced no image info"))?;
    let width = u32::try_from(info.width).map_err(|_| anyhow!("MJPEG width out of range"))?;
    let height = u32::try_from(info.height).map_err(|_| anyhow!("MJPEG height out of range"))?;
    let expected_len = width as usize * height as usize * 4;
    if rgba.len() < expected_len {
        return Err(anyhow!(
            "MJPEG decode produced too few bytes: got {}, expected {}",
            rgba.len(),
            expected_len
        ));
    }

    Ok(RgbaImage {
        rgba,
        width,
        height,
    })
}

pub fn rgba_to_bgr(rgba: &[u8]) -> Vec<u8> {
    let mut bgr = vec![0u8; rgba.len() / 4 * 3];
    bgr.par_chunks_mut(3)
        .zip(rgba.par_chunks_exact(4))
        .for_each(|(dst, src)| {
            dst[0] = src[2];
            dst[1] = src[1];
            dst[2] = src[0];
        });
    bgr
}

/// RGB→BGR and BGR→RGB are the same byte swap.
pub fn swap_rb(data: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; data.len() / 3 * 3];
    out.par_chunks_mut(3)
        .zip(data.par_chunks_exact(3))
        .for_each(|(dst, src)| {
            dst[0] = src[2];
            dst[1] = src[1];
            dst[2] = src[0];
        });
    out
}

fn gray_to_bgr(data: &[u8]) -> Vec<u8> {
    let mut bgr = vec![0u8; data.len() * 3];
    bgr.par_chunks_mut(3)
        .zip(data.par_iter().copied())
        .for_each(|(dst, value)| {
            dst.fill(value);
        });
    bgr
}

/// Build the display copy published to the frame buffer.
pub fn to_display(frame: &Frame, sequence: u64) -> DisplayFrame {
    let mut rgba = vec![0u8; (frame.width as usize * frame.height as usize) * 4];
    rgba.par_chunks_mut(4)
        .zip(frame.bgr.par_chunks_exact(3))
        .for_each(|(dst, src)| {
            dst[0] = src[2];
            dst[1] = src[1];
            dst[2] = src[0];
            dst[3] = 255;
        });

    DisplayFrame {
        rgba,
        width: frame.width,
        height: frame.height,
        sequence,
        timestamp: frame.timestamp,
    }
}

/// ITU-R BT.601 luma, matching the usual BGR→GRAY weights.
pub fn luma(bgr: &[u8]) -> Vec<u8> {
    bgr.par_chunks_exact(3)
        .map(|px| {
            let value = 0.114 * px[0] as f32 + 0.587 * px[1] as f32 + 0.299 * px[2] as f32;
            value.round().clamp(0.0, 255.0) as u8
        })
        .collect()
}
