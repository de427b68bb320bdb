use rayon::prelude::*;

/// Map every value above `cut` to 255 and everything else to 0.
pub fn threshold(mask: &mut [u8], cut: u8) {
    mask.par_iter_mut()
        .for_each(|v| *v = if *v > cut { 255 } else { 0 });
}

/// Minimum filter with a `size`×`size` square; pixels outside the plane are ignored.
pub fn erode(src: &[u8], width: u32, height: u32, size: u32) -> Vec<u8> {
    square_filter(src, width, height, size, u8::min)
}

/// Maximum filter with a `size`×`size` square, applied `iterations` times.
pub fn dilate(src: &[u8], width: u32, height: u32, size: u32, iterations: u32) -> Vec<u8> {
    let mut out = src.to_vec();
    for _ in 0..iterations {
        out = square_filter(&out, width, height, size, u8::max);
    }
    out
}

fn square_filter(src: &[u8], width: u32, height: u32, size: u32, pick: fn(u8, u8) -> u8) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 || src.len() < w * h {
        return src.to_vec();
    }
    let radius = (size.max(1) / 2) as usize;

    // The square kernel is separable: rows first, then columns.
    let mut rows = vec![0u8; w * h];
    rows.par_chunks_mut(w)
        .zip(src.par_chunks(w))
        .for_each(|(dst, row)| {
            for x in 0..w {
                let lo = x.saturating_sub(radius);
                let hi = (x + radius).min(w - 1);
                dst[x] = row[lo + 1..=hi].iter().fold(row[lo], |acc, &v| pick(acc, v));
            }
        });

    let mut out = vec![0u8; w * h];
    out.par_chunks_mut(w).enumerate().for_each(|(y, dst)| {
        let lo = y.saturating_sub(radius);
        let hi = (y + radius).min(h - 1);
        for (x, value) in dst.iter_mut().enumerate() {
            let mut acc = rows[lo * w + x];
            for yy in lo + 1..=hi {
                acc = pick(acc, rows[yy * w + x]);
            }
            *value = acc;
        }
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_mask(w: u32, h: u32, x0: u32, y0: u32, side: u32) -> Vec<u8> {
        let mut mask = vec![0u8; (w * h) as usize];
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                mask[(y * w + x) as usize] = 255;
            }
        }
        mask
    }

    fn count_on(mask: &[u8]) -> usize {
        mask.iter().filter(|&&v| v == 255).count()
    }

    #[test]
    fn erosion_removes_speckles_smaller_than_the_kernel() {
        let mask = square_mask(40, 40, 10, 10, 5);
        let eroded = erode(&mask, 40, 40, 9);
        assert_eq!(count_on(&eroded), 0);
    }

    #[test]
    fn erosion_then_dilation_grows_large_blobs() {
        let mask = square_mask(120, 120, 30, 30, 50);
        let eroded = erode(&mask, 120, 120, 9);
        assert_eq!(count_on(&eroded), 42 * 42);
        let dilated = dilate(&eroded, 120, 120, 9, 3);
        assert_eq!(count_on(&dilated), 66 * 66);
    }

    #[test]
    fn frame_border_does_not_erode() {
        let mask = vec![255u8; 100];
        assert_eq!(count_on(&erode(&mask, 10, 10, 9)), 100);
    }

    #[test]
    fn threshold_binarizes() {
        let mut mask = vec![0, 25, 26, 127, 255];
        threshold(&mut mask, 25);
        assert_eq!(mask, vec![0, 0, 255, 255, 255]);
    }
}
