//! Annotation primitives drawn directly onto raw BGR frames.

use crate::types::{Frame, Rect};

/// BGR red, used for motion boxes and face boxes.
pub const RED: [u8; 3] = [0, 0, 255];
pub const LANDMARK_RADIUS: i32 = 2;

/// Outline `rect` with a line of the given thickness; clipped to the frame.
pub fn draw_rect(frame: &mut Frame, rect: Rect, color: [u8; 3], thickness: i32) {
    if rect.width <= 0 || rect.height <= 0 {
        return;
    }
    let (x1, y1) = (rect.x, rect.y);
    let (x2, y2) = (rect.right() - 1, rect.bottom() - 1);
    draw_line(frame, (x1, y1), (x2, y1), color, thickness);
    draw_line(frame, (x2, y1), (x2, y2), color, thickness);
    draw_line(frame, (x2, y2), (x1, y2), color, thickness);
    draw_line(frame, (x1, y2), (x1, y1), color, thickness);
}

pub fn draw_line(
    frame: &mut Frame,
    p0: (i32, i32),
    p1: (i32, i32),
    color: [u8; 3],
    thickness: i32,
) {
    let (mut x0, mut y0) = p0;
    let (x1, y1) = p1;
    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    let radius = (thickness.max(1) - 1) / 2;

    loop {
        put_pixel_safe(frame, x0, y0, color);
        if radius > 0 {
            for ox in -radius..=radius {
                for oy in -radius..=radius {
                    if (ox != 0 || oy != 0) && ox.abs() + oy.abs() <= radius {
                        put_pixel_safe(frame, x0 + ox, y0 + oy, color);
                    }
                }
            }
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

pub fn draw_circle(frame: &mut Frame, center: (i32, i32), radius: i32, color: [u8; 3]) {
    let (cx, cy) = center;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put_pixel_safe(frame, cx.saturating_add(dx), cy.saturating_add(dy), color);
            }
        }
    }
}

fn put_pixel_safe(frame: &mut Frame, x: i32, y: i32, color: [u8; 3]) {
    if x < 0 || y < 0 {
        return;
    }
    let (ux, uy) = (x as u32, y as u32);
    if ux >= frame.width || uy >= frame.height {
        return;
    }
    let idx = ((uy * frame.width + ux) as usize) * 3;
    if idx + 2 < frame.bgr.len() {
        frame.bgr[idx..idx + 3].copy_from_slice(&color);
    }
}
