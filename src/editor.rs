//! Still-image transforms offered by the `edit` subcommand.

use fast_image_resize as fir;
use image::{RgbImage, imageops};
use rayon::prelude::*;

use crate::pipeline::{color, motion::morphology};

pub struct Transform {
    pub name: &'static str,
    pub description: &'static str,
    pub apply: fn(&RgbImage) -> RgbImage,
}

pub const TRANSFORMS: &[Transform] = &[
    Transform {
        name: "blur",
        description: "8x8 box blur",
        apply: blur,
    },
    Transform {
        name: "erode",
        description: "3x3 per-channel erosion",
        apply: erode,
    },
    Transform {
        name: "sharpen",
        description: "3x3 sharpening kernel",
        apply: sharpen,
    },
    Transform {
        name: "cartoon",
        description: "smoothed colours masked by adaptive-threshold edges",
        apply: cartoon,
    },
];

pub fn find(name: &str) -> Option<&'static Transform> {
    TRANSFORMS.iter().find(|t| t.name.eq_ignore_ascii_case(name))
}

const BLUR_SIZE: usize = 8;

pub fn blur(image: &RgbImage) -> RgbImage {
    map_planes(image, |plane, w, h| box_filter(plane, w, h, BLUR_SIZE))
}

pub fn erode(image: &RgbImage) -> RgbImage {
    map_planes(image, |plane, w, h| {
        morphology::erode(plane, w as u32, h as u32, 3)
    })
}

pub fn sharpen(image: &RgbImage) -> RgbImage {
    const KERNEL: [f32; 9] = [0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0];
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return image.clone();
    }
    // filter3x3 leaves the outer ring unset, so filter a replicate-padded copy.
    let padded = RgbImage::from_fn(width + 2, height + 2, |x, y| {
        *image.get_pixel(x.saturating_sub(1).min(width - 1), y.saturating_sub(1).min(height - 1))
    });
    let filtered: RgbImage = imageops::filter3x3(&padded, &KERNEL);
    imageops::crop_imm(&filtered, 1, 1, width, height).to_image()
}

/// Down-sample smoothing, AND-combined with a binary edge mask.
pub fn cartoon(image: &RgbImage) -> RgbImage {
    let (width, height) = image.dimensions();
    if width < 4 || height < 4 {
        return image.clone();
    }

    let smoothed = smooth_colors(image).unwrap_or_else(|err| {
        log::warn!("cartoon smoothing failed, using original colours: {err}");
        image.clone()
    });

    let bgr = color::swap_rb(image.as_raw());
    let gray = color::luma(&bgr);
    let gray = median_filter(&gray, width as usize, height as usize, 2);
    let edges = adaptive_threshold(&gray, width as usize, height as usize, 4, 2);

    let mut out = smoothed;
    for (px, edge) in out.pixels_mut().zip(edges) {
        for channel in px.0.iter_mut() {
            *channel &= edge;
        }
    }
    out
}

fn smooth_colors(image: &RgbImage) -> anyhow::Result<RgbImage> {
    let (width, height) = image.dimensions();
    let (small_w, small_h) = ((width / 4).max(1), (height / 4).max(1));

    let src = fir::images::Image::from_vec_u8(
        width,
        height,
        image.as_raw().clone(),
        fir::PixelType::U8x3,
    )?;
    let mut small = fir::images::Image::new(small_w, small_h, fir::PixelType::U8x3);
    let mut resizer = fir::Resizer::new();
    let down = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Box));
    resizer.resize(&src, &mut small, Some(&down))?;

    let small = RgbImage::from_raw(small_w, small_h, small.into_vec())
        .ok_or_else(|| anyhow::anyhow!("downscaled buffer has the wrong size"))?;
    let mut softened = small;
    for _ in 0..3 {
        softened = imageops::blur(&softened, 1.0);
    }

    let src = fir::images::Image::from_vec_u8(
        small_w,
        small_h,
        softened.into_raw(),
        fir::PixelType::U8x3,
    )?;
    let mut full = fir::images::Image::new(width, height, fir::PixelType::U8x3);
    let up = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    resizer.resize(&src, &mut full, Some(&up))?;

    RgbImage::from_raw(width, height, full.into_vec())
        .ok_or_else(|| anyhow::anyhow!("upscaled buffer has the wrong size"))
}

fn map_planes(image: &RgbImage, op: impl Fn(&[u8], usize, usize) -> Vec<u8> + Sync) -> RgbImage {
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);
    let planes: Vec<Vec<u8>> = (0..3)
        .into_par_iter()
        .map(|c| {
            let plane: Vec<u8> = image.as_raw().iter().skip(c).step_by(3).copied().collect();
            op(&plane, w, h)
        })
        .collect();

    let mut out = RgbImage::new(width, height);
    for (i, px) in out.pixels_mut().enumerate() {
        px.0 = [planes[0][i], planes[1][i], planes[2][i]];
    }
    out
}

/// Mean over a `size`×`size` window anchored at its centre; edges replicate.
fn box_filter(plane: &[u8], w: usize, h: usize, size: usize) -> Vec<u8> {
    let before = size / 2;
    let after = size - before - 1;
    let clamp = |v: isize, max: usize| v.clamp(0, max as isize - 1) as usize;

    let mut rows = vec![0u32; w * h];
    rows.par_chunks_mut(w).enumerate().for_each(|(y, dst)| {
        let row = &plane[y * w..(y + 1) * w];
        for (x, sum) in dst.iter_mut().enumerate() {
            *sum = (x as isize - before as isize..=x as isize + after as isize)
                .map(|xx| row[clamp(xx, w)] as u32)
                .sum();
        }
    });

    let area = (size * size) as u32;
    let mut out = vec![0u8; w * h];
    out.par_chunks_mut(w).enumerate().for_each(|(y, dst)| {
        for (x, value) in dst.iter_mut().enumerate() {
            let total: u32 = (y as isize - before as isize..=y as isize + after as isize)
                .map(|yy| rows[clamp(yy, h) * w + x])
                .sum();
            *value = ((total + area / 2) / area) as u8;
        }
    });
    out
}

/// 3x3 integer convolution with replicated edges, saturated to `u8`.
fn median_filter(plane: &[u8], w: usize, h: usize, radius: usize) -> Vec<u8> {
    let mut out = vec![0u8; w * h];
    out.par_chunks_mut(w).enumerate().for_each(|(y, dst)| {
        let mut window = Vec::with_capacity((2 * radius + 1).pow(2));
        for (x, value) in dst.iter_mut().enumerate() {
            window.clear();
            for yy in y.saturating_sub(radius)..=(y + radius).min(h - 1) {
                for xx in x.saturating_sub(radius)..=(x + radius).min(w - 1) {
                    window.push(plane[yy * w + xx]);
                }
            }
            window.sort_unstable();
            *value = window[window.len() / 2];
        }
    });
    out
}

/// 255 where a pixel is brighter than its neighbourhood mean minus `offset`.
fn adaptive_threshold(plane: &[u8], w: usize, h: usize, radius: usize, offset: i32) -> Vec<u8> {
    let mean = box_filter(plane, w, h, 2 * radius + 1);
    plane
        .par_iter()
        .zip(mean.par_iter())
        .map(|(&v, &m)| if v as i32 > m as i32 - offset { 255 } else { 0 })
        .collect()
}
