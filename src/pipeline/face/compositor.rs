use fast_image_resize as fir;
use rayon::prelude::*;

use super::{landmarks::FaceLandmarks, ornaments::OrnamentAsset};
use crate::{
    error::{CaptureError, Result},
    types::{Frame, Rect},
};

const FILL: u8 = 255;

/// Packed BGR working image.
#[derive(Clone, Debug, PartialEq)]
pub struct BgrImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Scale, tilt and AND-blend `ornament` onto `frame` at the landmarks given
/// by its recipe. Returns the covered rectangle.
///
/// A placement that is not fully inside the frame is rejected with
/// `InvalidGeometry` and the frame is left untouched.
pub fn composite(
    frame: &mut Frame,
    landmarks: &FaceLandmarks,
    ornament: &OrnamentAsset,
) -> Result<Rect> {
    let recipe = ornament.recipe;
    let reference = landmarks.distance(recipe.scale_anchors.0, recipe.scale_anchors.1);
    let scale = reference * recipe.factor / ornament.width as f32;
    let width = (ornament.width as f32 * scale).round() as i64;
    let height = (ornament.height as f32 * scale).round() as i64;

    let (cx, cy) = landmarks.midpoint(recipe.placement_anchors.0, recipe.placement_anchors.1);
    // Far-off anchors saturate instead of wrapping.
    let (cx, cy) = (cx as i64, cy as i64);
    let (left, top) = (cx.saturating_sub(width / 2), cy.saturating_sub(height / 2));

    let clamp = |v: i64| v.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
    let rect = Rect::new(clamp(left), clamp(top), clamp(width), clamp(height));
    let exact = [left, top, width, height]
        .iter()
        .all(|v| i32::try_from(*v).is_ok());
    if !exact || !rect.fits_within(frame.width, frame.height) {
        return Err(CaptureError::InvalidGeometry {
            rect,
            width: frame.width,
            height: frame.height,
        });
    }
    let (width, height) = (width as u32, height as u32);

    let scaled = scale_nearest(&ornament.bgr, ornament.width, ornament.height, width, height)?;
    let angle = landmarks.tilt(recipe.tilt_anchors.0, recipe.tilt_anchors.1);
    let rotated = rotate_about_centre(&scaled, angle);
    and_onto(frame, rect, &rotated);
    Ok(rect)
}

/// Nearest-neighbour resize of a packed BGR buffer.
pub fn scale_nearest(
    bgr: &[u8],
    width: u32,
    height: u32,
    new_width: u32,
    new_height: u32,
) -> Result<BgrImage> {
    let src = fir::images::Image::from_vec_u8(width, height, bgr.to_vec(), fir::PixelType::U8x3)
        .map_err(|err| CaptureError::Model(format!("ornament buffer rejected: {err}")))?;
    let mut dst = fir::images::Image::new(new_width, new_height, fir::PixelType::U8x3);
    let mut resizer = fir::Resizer::new();
    let options = fir::ResizeOptions::new().resize_alg(fir::ResizeAlg::Nearest);
    resizer
        .resize(&src, &mut dst, Some(&options))
        .map_err(|err| CaptureError::Model(format!("ornament resize failed: {err}")))?;
    Ok(BgrImage {
        data: dst.into_vec(),
        width: new_width,
        height: new_height,
    })
}

/// Rotate clockwise (as displayed) by `angle` radians about the image centre,
/// keeping the original size. Exposed corners are white.
pub fn rotate_about_centre(image: &BgrImage, angle: f32) -> BgrImage {
    if angle == 0.0 {
        return image.clone();
    }
    let (w, h) = (image.width as usize, image.height as usize);
    let cx = (w as f32 - 1.0) / 2.0;
    let cy = (h as f32 - 1.0) / 2.0;
    let (sin, cos) = angle.sin_cos();

    let mut data = vec![FILL; w * h * 3];
    data.par_chunks_mut(w * 3).enumerate().for_each(|(y, row)| {
        let v = y as f32 - cy;
        for x in 0..w {
            let u = x as f32 - cx;
            let sx = u * cos + v * sin + cx;
            let sy = -u * sin + v * cos + cy;
            row[x * 3..x * 3 + 3].copy_from_slice(&sample_bilinear(image, sx, sy));
        }
    });

    BgrImage {
        data,
        width: image.width,
        height: image.height,
    }
}

fn sample_bilinear(image: &BgrImage, x: f32, y: f32) -> [u8; 3] {
    let (w, h) = (image.width as i32, image.height as i32);
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (ix, iy) = (x0 as i32, y0 as i32);

    let fetch = |px: i32, py: i32| -> [f32; 3] {
        if px < 0 || py < 0 || px >= w || py >= h {
            return [FILL as f32; 3];
        }
        let idx = (py as usize * w as usize + px as usize) * 3;
        [
            image.data[idx] as f32,
            image.data[idx + 1] as f32,
            image.data[idx + 2] as f32,
        ]
    };

    let c00 = fetch(ix, iy);
    let c10 = fetch(ix + 1, iy);
    let c01 = fetch(ix, iy + 1);
    let c11 = fetch(ix + 1, iy + 1);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let mut out = [0u8; 3];
    for c in 0..3 {
        let value = lerp(lerp(c00[c], c10[c], fx), lerp(c01[c], c11[c], fx), fy);
        out[c] = value.round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Per-channel bitwise AND of `overlay` into the `rect` region of `frame`.
/// `rect` must already fit the frame and match the overlay size.
fn and_onto(frame: &mut Frame, rect: Rect, overlay: &BgrImage) {
    let frame_stride = frame.width as usize * 3;
    let row_len = overlay.width as usize * 3;
    let x0 = rect.x as usize * 3;
    for (row, src) in overlay.data.chunks_exact(row_len).enumerate() {
        let start = (rect.y as usize + row) * frame_stride + x0;
        for (dst, src) in frame.bgr[start..start + row_len].iter_mut().zip(src) {
            *dst &= *src;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        pipeline::face::landmarks::{
            LEFT_EYE_OUTER, MOUTH_LEFT, MOUTH_RIGHT, NOSE_BASE, RIGHT_EYE_OUTER, UPPER_LIP_TOP,
            tests::landmarks_with,
        },
        types::OverlayKind,
    };

    const SHADE: u8 = 0b1011_0110;

    fn black_glasses() -> OrnamentAsset {
        OrnamentAsset::from_bgr(OverlayKind::Glasses, vec![0; 20 * 10 * 3], 20, 10).unwrap()
    }

    /// Eyes 20 px apart, centred at (cx, cy).
    fn eyes_at(cx: f32, cy: f32) -> FaceLandmarks {
        landmarks_with(
            (cx, cy),
            &[
                (RIGHT_EYE_OUTER, (cx - 10.0, cy)),
                (LEFT_EYE_OUTER, (cx + 10.0, cy)),
            ],
        )
    }

    #[test]
    fn level_glasses_cover_a_scaled_centred_rect() {
        let mut frame = Frame::filled(100, 100, [SHADE; 3]);
        let rect = composite(&mut frame, &eyes_at(50.0, 50.0), &black_glasses()).unwrap();
        assert_eq!(rect, Rect::new(35, 43, 30, 15));

        for y in 0..100i32 {
            for x in 0..100i32 {
                let idx = ((y * 100 + x) * 3) as usize;
                let inside = x >= rect.x && x < rect.right() && y >= rect.y && y < rect.bottom();
                let expected = if inside { 0 } else { SHADE };
                assert_eq!(frame.bgr[idx], expected, "pixel ({x}, {y})");
            }
        }
    }

    #[test]
    fn placements_one_pixel_outside_are_skipped() {
        // Rect is 30x15 at (cx - 15, cy - 7).
        let inside = [(15.0, 50.0), (85.0, 50.0), (50.0, 7.0), (50.0, 92.0)];
        let outside = [(14.0, 50.0), (86.0, 50.0), (50.0, 6.0), (50.0, 93.0)];

        for (cx, cy) in inside {
            let mut frame = Frame::filled(100, 100, [SHADE; 3]);
            assert!(composite(&mut frame, &eyes_at(cx, cy), &black_glasses()).is_ok());
        }
        for (cx, cy) in outside {
            let mut frame = Frame::filled(100, 100, [SHADE; 3]);
            let before = frame.bgr.clone();
            let err = composite(&mut frame, &eyes_at(cx, cy), &black_glasses()).unwrap_err();
            assert!(matches!(err, CaptureError::InvalidGeometry { .. }));
            assert_eq!(frame.bgr, before, "frame touched for centre ({cx}, {cy})");
        }
    }

    #[test]
    fn far_off_placement_anchors_are_skipped() {
        let mustache =
            OrnamentAsset::from_bgr(OverlayKind::Mustache, vec![0; 20 * 10 * 3], 20, 10).unwrap();
        for far in [5e9, -5e9, 1e30, f32::MAX] {
            let landmarks = landmarks_with(
                (50.0, 50.0),
                &[
                    (MOUTH_RIGHT, (40.0, 70.0)),
                    (MOUTH_LEFT, (60.0, 70.0)),
                    (NOSE_BASE, (far, 50.0)),
                    (UPPER_LIP_TOP, (far, 50.0)),
                ],
            );
            let mut frame = Frame::filled(100, 100, [SHADE; 3]);
            let err = composite(&mut frame, &landmarks, &mustache).unwrap_err();
            assert!(matches!(err, CaptureError::InvalidGeometry { .. }), "anchor at {far}");
            assert!(frame.bgr.iter().all(|v| *v == SHADE));
        }
    }

    #[test]
    fn tilted_glasses_keep_white_corners_inside_the_placement() {
        let landmarks = landmarks_with(
            (50.0, 50.0),
            &[
                (RIGHT_EYE_OUTER, (40.0, 45.0)),
                (LEFT_EYE_OUTER, (60.0, 55.0)),
            ],
        );
        let mut frame = Frame::filled(100, 100, [SHADE; 3]);
        let rect = composite(&mut frame, &landmarks, &black_glasses()).unwrap();
        // Eye distance sqrt(500) * 1.5 gives 34x17 around the midpoint.
        assert_eq!(rect, Rect::new(33, 42, 34, 17));

        let px = |x: i32, y: i32| frame.bgr[((y * 100 + x) * 3) as usize];
        let mut darkened = 0;
        for y in 0..100 {
            for x in 0..100 {
                let inside = x >= rect.x && x < rect.right() && y >= rect.y && y < rect.bottom();
                if !inside {
                    assert_eq!(px(x, y), SHADE, "outside pixel ({x}, {y})");
                } else if px(x, y) != SHADE {
                    darkened += 1;
                }
            }
        }
        // Rotation exposed white fill at the placement corners.
        for (x, y) in [
            (rect.x, rect.y),
            (rect.right() - 1, rect.y),
            (rect.x, rect.bottom() - 1),
            (rect.right() - 1, rect.bottom() - 1),
        ] {
            assert_eq!(px(x, y), SHADE, "corner ({x}, {y})");
        }
        assert_eq!(px(50, 50), 0);
        assert!(darkened > 0 && darkened < 34 * 17);
    }

    #[test]
    fn white_ornament_pixels_leave_the_frame_unchanged() {
        let mut bgr = vec![255u8; 20 * 10 * 3];
        bgr[..3].copy_from_slice(&[0x0f, 0xf0, 0x00]);
        let ornament = OrnamentAsset::from_bgr(OverlayKind::Glasses, bgr, 20, 10).unwrap();
        let mut frame = Frame::filled(100, 100, [SHADE; 3]);
        let rect = composite(&mut frame, &eyes_at(50.0, 50.0), &ornament).unwrap();

        let corner = ((rect.y * 100 + rect.x) * 3) as usize;
        assert_eq!(&frame.bgr[corner..corner + 3], &[SHADE & 0x0f, SHADE & 0xf0, 0]);
        let centre = ((50 * 100 + 50) * 3) as usize;
        assert_eq!(&frame.bgr[centre..centre + 3], &[SHADE; 3]);
    }

    #[test]
    fn rotation_exposes_white_corners_and_keeps_the_centre() {
        let image = BgrImage {
            data: vec![0; 30 * 15 * 3],
            width: 30,
            height: 15,
        };
        let rotated = rotate_about_centre(&image, 30f32.to_radians());
        assert_eq!((rotated.width, rotated.height), (30, 15));
        assert_eq!(&rotated.data[..3], &[255, 255, 255]);
        let centre = ((7 * 30 + 15) * 3) as usize;
        assert_eq!(&rotated.data[centre..centre + 3], &[0, 0, 0]);
    }

    #[test]
    fn positive_tilt_turns_clockwise_on_screen() {
        // A dark pixel just right of centre moves down when tilted clockwise.
        let (w, h) = (21u32, 21u32);
        let mut data = vec![255u8; (w * h * 3) as usize];
        let at = |x: u32, y: u32| ((y * w + x) * 3) as usize;
        data[at(18, 10)..at(18, 10) + 3].fill(0);
        let image = BgrImage { data, width: w, height: h };

        let rotated = rotate_about_centre(&image, std::f32::consts::FRAC_PI_2);
        assert_eq!(rotated.data[at(10, 18)], 0);
        assert_eq!(rotated.data[at(18, 10)], 255);
    }

    #[test]
    fn nearest_scaling_keeps_hard_edges() {
        let bgr = vec![0, 0, 0, 255, 255, 255];
        let scaled = scale_nearest(&bgr, 2, 1, 4, 2).unwrap();
        assert_eq!((scaled.width, scaled.height), (4, 2));
        assert!(scaled.data.iter().all(|v| *v == 0 || *v == 255));
        assert_eq!(&scaled.data[..3], &[0, 0, 0]);
        assert_eq!(&scaled.data[9..12], &[255, 255, 255]);
    }
}
