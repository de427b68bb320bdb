use crate::types::Rect;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Contour {
    pub bounds: Rect,
    /// Inner boundary around a background hole enclosed by foreground.
    pub is_hole: bool,
}

/// Outer boundaries of 8-connected foreground regions plus the boundaries of
/// the holes they enclose (4-connected background not reaching the border).
pub fn find_contours(mask: &[u8], width: u32, height: u32) -> Vec<Contour> {
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 || mask.len() < w * h {
        return Vec::new();
    }

    let mut visited = vec![false; w * h];
    let mut contours = Vec::new();
    let mut stack = Vec::new();

    for start in 0..w * h {
        if visited[start] {
            continue;
        }
        let foreground = mask[start] != 0;
        let region = flood(mask, w, h, start, foreground, &mut visited, &mut stack);

        if foreground {
            contours.push(Contour {
                bounds: region.rect(),
                is_hole: false,
            });
        } else if !region.touches_border(w, h) {
            // The traced inner boundary runs over the enclosing foreground pixels.
            let inner = region.rect();
            let x = (inner.x - 1).max(0);
            let y = (inner.y - 1).max(0);
            let right = (inner.right() + 1).min(w as i32);
            let bottom = (inner.bottom() + 1).min(h as i32);
            contours.push(Contour {
                bounds: Rect::new(x, y, right - x, bottom - y),
                is_hole: true,
            });
        }
    }

    contours
}

struct Region {
    min_x: usize,
    min_y: usize,
    max_x: usize,
    max_y: usize,
}

impl Region {
    fn rect(&self) -> Rect {
        Rect::new(
            self.min_x as i32,
            self.min_y as i32,
            (self.max_x - self.min_x + 1) as i32,
            (self.max_y - self.min_y + 1) as i32,
        )
    }

    fn touches_border(&self, w: usize, h: usize) -> bool {
        self.min_x == 0 || self.min_y == 0 || self.max_x == w - 1 || self.max_y == h - 1
    }
}

fn flood(
    mask: &[u8],
    w: usize,
    h: usize,
    start: usize,
    foreground: bool,
    visited: &mut [bool],
    stack: &mut Vec<usize>,
) -> Region {
    let mut region = Region {
        min_x: start % w,
        min_y: start / w,
        max_x: start % w,
        max_y: start / w,
    };
    // Foreground connects through diagonals, background does not.
    let diagonal = foreground;

    visited[start] = true;
    stack.clear();
    stack.push(start);
    while let Some(idx) = stack.pop() {
        let (x, y) = (idx % w, idx / w);
        region.min_x = region.min_x.min(x);
        region.max_x = region.max_x.max(x);
        region.min_y = region.min_y.min(y);
        region.max_y = region.max_y.max(y);

        for dy in -1i32..=1 {
            for dx in -1i32..=1 {
                if (dx == 0 && dy == 0) || (!diagonal && dx != 0 && dy != 0) {
                    continue;
                }
                let nx = x as i32 + dx;
                let ny = y as i32 + dy;
                if nx < 0 || ny < 0 || nx >= w as i32 || ny >= h as i32 {
                    continue;
                }
                let nidx = ny as usize * w + nx as usize;
                if !visited[nidx] && (mask[nidx] != 0) == foreground {
                    visited[nidx] = true;
                    stack.push(nidx);
                }
            }
        }
    }
    region
}
