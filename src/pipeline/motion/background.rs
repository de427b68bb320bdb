use rayon::prelude::*;

use super::MotionConfig;

/// Upper bound on Gaussian components tracked per pixel.
const MAX_MODES: usize = 3;

#[derive(Clone, Copy, Debug, Default)]
struct Mode {
    weight: f32,
    mean: f32,
    variance: f32,
}

/// Adaptive per-pixel Gaussian mixture over luminance.
///
/// Each pixel keeps up to `MAX_MODES` components sorted by weight. A sample is
/// background when it falls within `var_threshold` squared deviations of one of
/// the components that together make up `background_ratio` of the weight.
pub struct BackgroundModel {
    cfg: MotionConfig,
    width: u32,
    height: u32,
    modes: Vec<Mode>,
    used: Vec<u8>,
    frames_seen: u32,
}

impl BackgroundModel {
    pub fn new(cfg: MotionConfig) -> Self {
        Self {
            cfg,
            width: 0,
            height: 0,
            modes: Vec::new(),
            used: Vec::new(),
            frames_seen: 0,
        }
    }

    #[cfg(test)]
    pub fn frames_seen(&self) -> u32 {
        self.frames_seen
    }

    /// Feed one luminance plane; returns the foreground mask (0 or 255 per pixel).
    ///
    /// The first frame, and any frame whose geometry differs from the model,
    /// reseeds the model and yields an empty mask.
    pub fn apply(&mut self, luma: &[u8], width: u32, height: u32) -> Vec<u8> {
        let pixels = width as usize * height as usize;
        if self.frames_seen == 0 || width != self.width || height != self.height {
            self.seed(luma, width, height);
            return vec![0u8; pixels];
        }

        self.frames_seen = self.frames_seen.saturating_add(1);
        let alpha = 1.0 / self.frames_seen.min(self.cfg.history.max(1)) as f32;
        let cfg = self.cfg.clone();

        let mut mask = vec![0u8; pixels];
        self.modes
            .par_chunks_mut(MAX_MODES)
            .zip(self.used.par_iter_mut())
            .zip(luma.par_iter())
            .zip(mask.par_iter_mut())
            .for_each(|(((modes, used), &value), out)| {
                if update_pixel(modes, used, value as f32, alpha, &cfg) {
                    *out = 255;
                }
            });
        mask
    }

    fn seed(&mut self, luma: &[u8], width: u32, height: u32) {
        log::debug!("seeding background model at {width}x{height}");
        self.width = width;
        self.height = height;
        self.frames_seen = 1;
        self.modes = vec![Mode::default(); luma.len() * MAX_MODES];
        self.used = vec![1u8; luma.len()];
        for (modes, &value) in self.modes.chunks_mut(MAX_MODES).zip(luma) {
            modes[0] = Mode {
                weight: 1.0,
                mean: value as f32,
                variance: self.cfg.var_init,
            };
        }
    }
}

/// Returns `true` when the sample is foreground.
fn update_pixel(modes: &mut [Mode], used: &mut u8, x: f32, alpha: f32, cfg: &MotionConfig) -> bool {
    let n = *used as usize;
    let mut background = false;
    let mut matched = None;
    let mut cumulative = 0.0f32;

    for (idx, mode) in modes[..n].iter().enumerate() {
        let diff = x - mode.mean;
        let dist2 = diff * diff;
        if !background && cumulative < cfg.background_ratio && dist2 < cfg.var_threshold * mode.variance {
            background = true;
        }
        if matched.is_none() && dist2 < cfg.var_threshold_gen * mode.variance {
            matched = Some(idx);
        }
        cumulative += mode.weight;
    }

    for (idx, mode) in modes[..n].iter_mut().enumerate() {
        if Some(idx) == matched {
            mode.weight += alpha * (1.0 - mode.weight);
            let k = alpha / mode.weight;
            let diff = x - mode.mean;
            mode.mean += k * diff;
            mode.variance = (mode.variance + k * (diff * diff - mode.variance))
                .clamp(cfg.var_min, cfg.var_max);
        } else {
            mode.weight *= 1.0 - alpha;
        }
    }

    let n = if matched.is_none() {
        // Replace the weakest component once the slots are exhausted.
        let slot = n.min(MAX_MODES - 1);
        modes[slot] = Mode {
            weight: alpha,
            mean: x,
            variance: cfg.var_init,
        };
        let n = (slot + 1).max(n);
        *used = n as u8;
        n
    } else {
        n
    };

    let total: f32 = modes[..n].iter().map(|m| m.weight).sum();
    if total > 0.0 {
        for mode in &mut modes[..n] {
            mode.weight /= total;
        }
    }

    // Keep components ordered by weight, heaviest first.
    for i in 1..n {
        let mut j = i;
        while j > 0 && modes[j].weight > modes[j - 1].weight {
            modes.swap(j, j - 1);
            j -= 1;
        }
    }

    !background
}
