mod background;
mod contours;
pub(crate) mod morphology;

use crate::{
    pipeline::{color, draw},
    types::{Frame, Rect},
};

use self::background::BackgroundModel;
pub use self::contours::{Contour, find_contours};

#[derive(Clone, Debug)]
pub struct MotionConfig {
    /// Frames after which the learning rate stops decaying.
    pub history: u32,
    /// Squared deviation (in variances) within which a sample is background.
    pub var_threshold: f32,
    /// Squared deviation within which a sample updates an existing component.
    pub var_threshold_gen: f32,
    pub background_ratio: f32,
    pub var_init: f32,
    pub var_min: f32,
    pub var_max: f32,
    pub mask_threshold: u8,
    pub kernel_size: u32,
    pub dilate_iterations: u32,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            history: 500,
            var_threshold: 16.0,
            var_threshold_gen: 9.0,
            background_ratio: 0.9,
            var_init: 15.0,
            var_min: 4.0,
            var_max: 75.0,
            mask_threshold: 25,
            kernel_size: 9,
            dilate_iterations: 3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotionTransition {
    Started,
    Stopped,
}

#[derive(Clone, Debug)]
pub struct MotionReport {
    pub present: bool,
    pub transition: Option<MotionTransition>,
    pub regions: Vec<Rect>,
}

pub struct MotionDetector {
    cfg: MotionConfig,
    background: BackgroundModel,
    motion_detected: bool,
}

impl MotionDetector {
    pub fn new(cfg: MotionConfig) -> Self {
        Self {
            background: BackgroundModel::new(cfg.clone()),
            cfg,
            motion_detected: false,
        }
    }

    /// Advance the background model with `frame`, outline every contour found
    /// in the cleaned mask, and report edges of the motion signal.
    pub fn observe(&mut self, frame: &mut Frame) -> MotionReport {
        let (width, height) = frame.dimensions();
        let luma = color::luma(&frame.bgr);

        let mut mask = self.background.apply(&luma, width, height);
        morphology::threshold(&mut mask, self.cfg.mask_threshold);
        let mask = morphology::erode(&mask, width, height, self.cfg.kernel_size);
        let mask = morphology::dilate(
            &mask,
            width,
            height,
            self.cfg.kernel_size,
            self.cfg.dilate_iterations,
        );

        let contours = find_contours(&mask, width, height);
        let present = !contours.is_empty();
        let transition = self.update_hysteresis(present);

        let regions: Vec<Rect> = contours.iter().map(|c| c.bounds).collect();
        for rect in &regions {
            draw::draw_rect(frame, *rect, draw::RED, 1);
        }

        MotionReport {
            present,
            transition,
            regions,
        }
    }

    fn update_hysteresis(&mut self, present: bool) -> Option<MotionTransition> {
        match (self.motion_detected, present) {
            (false, true) => {
                self.motion_detected = true;
                log::info!("new motion detected");
                Some(MotionTransition::Started)
            }
            (true, false) => {
                self.motion_detected = false;
                log::info!("detected motion disappeared");
                Some(MotionTransition::Stopped)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const BACKGROUND: [u8; 3] = [40, 40, 40];

    /// 320×240 scene; `block` places a bright 50×50 square at that x offset.
    pub(crate) fn scene(block: Option<u32>) -> Frame {
        let (w, h) = (320u32, 240u32);
        let mut frame = Frame::filled(w, h, BACKGROUND);
        if let Some(x0) = block {
            for y in 90..140 {
                for x in x0..x0 + 50 {
                    let idx = ((y * w + x) * 3) as usize;
                    frame.bgr[idx..idx + 3].copy_from_slice(&[230, 230, 230]);
                }
            }
        }
        frame
    }

    /// Frames 1-3 static, 4-7 moving block, 8-10 static.
    pub(crate) fn ten_frame_sequence() -> Vec<Frame> {
        let mut frames = vec![scene(None), scene(None), scene(None)];
        for x0 in [20, 80, 140, 200] {
            frames.push(scene(Some(x0)));
        }
        frames.extend([scene(None), scene(None), scene(None)]);
        frames
    }

    #[test]
    fn ten_frame_scenario_starts_at_four_and_stops_at_eight() {
        let mut detector = MotionDetector::new(MotionConfig::default());
        let mut transitions = Vec::new();
        for (idx, mut frame) in ten_frame_sequence().into_iter().enumerate() {
            let report = detector.observe(&mut frame);
            if let Some(t) = report.transition {
                transitions.push((idx + 1, t));
            }
        }
        assert_eq!(
            transitions,
            vec![(4, MotionTransition::Started), (8, MotionTransition::Stopped)]
        );
    }

    #[test]
    fn starts_and_stops_alternate_for_arbitrary_sequences() {
        let mut detector = MotionDetector::new(MotionConfig::default());
        let pattern = [
            None,
            Some(10),
            Some(200),
            None,
            None,
            Some(60),
            None,
            Some(150),
            Some(30),
            Some(250),
            None,
            None,
        ];
        let mut last = None;
        for block in pattern {
            let mut frame = scene(block);
            if let Some(t) = detector.observe(&mut frame).transition {
                assert_ne!(Some(t), last, "two consecutive {t:?} signals");
                last = Some(t);
            }
        }
    }

    #[test]
    fn single_noisy_speck_is_cleaned_away() {
        let mut detector = MotionDetector::new(MotionConfig::default());
        detector.observe(&mut scene(None));
        let mut noisy = scene(None);
        for x in 100..104 {
            let idx = ((50 * 320 + x) * 3) as usize;
            noisy.bgr[idx..idx + 3].copy_from_slice(&[255, 255, 255]);
        }
        let report = detector.observe(&mut noisy);
        assert!(!report.present);
        assert_eq!(report.transition, None);
    }

    #[test]
    fn motion_regions_are_outlined_on_the_frame() {
        let mut detector = MotionDetector::new(MotionConfig::default());
        detector.observe(&mut scene(None));
        let mut frame = scene(Some(100));
        let report = detector.observe(&mut frame);
        assert_eq!(report.regions.len(), 1);
        let rect = report.regions[0];
        let idx = ((rect.y as u32 * 320 + rect.x as u32) * 3) as usize;
        assert_eq!(&frame.bgr[idx..idx + 3], &draw::RED);
    }
}
