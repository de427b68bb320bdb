pub mod compositor;
pub mod landmarks;
pub mod ornaments;
pub mod ort;

use crate::{
    error::Result,
    pipeline::draw,
    types::{Frame, OverlayFlags, OverlayKind, Rect},
};

pub use self::{
    landmarks::FaceLandmarks,
    ornaments::{OrnamentAsset, load_all as load_ornaments},
};

#[derive(Clone, Debug, PartialEq)]
pub struct FaceRegion {
    pub bounds: Rect,
    pub score: f32,
}

/// Face detection plus 68-point landmark fitting.
pub trait FaceAnalyzer: Send {
    fn detect_faces(&mut self, frame: &Frame) -> Result<Vec<FaceRegion>>;

    fn fit_landmarks(&mut self, frame: &Frame, face: &FaceRegion) -> Result<FaceLandmarks>;
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FaceReport {
    pub faces: usize,
    pub ornaments_placed: usize,
}

/// Draws the enabled overlays onto every detected face.
pub struct FaceOverlay {
    analyzer: Box<dyn FaceAnalyzer>,
    ornaments: Vec<OrnamentAsset>,
    overlays: OverlayFlags,
}

impl FaceOverlay {
    pub fn new(analyzer: Box<dyn FaceAnalyzer>, ornaments: Vec<OrnamentAsset>) -> Self {
        Self {
            analyzer,
            ornaments,
            overlays: OverlayFlags::default(),
        }
    }

    pub fn with_overlays(mut self, overlays: OverlayFlags) -> Self {
        self.overlays = overlays;
        self
    }

    pub fn set_overlay(&mut self, kind: OverlayKind, on: bool) {
        log::debug!("overlay {} {}", kind.label(), if on { "on" } else { "off" });
        self.overlays.set(kind, on);
    }

    pub fn apply(&mut self, frame: &mut Frame) -> FaceReport {
        if !self.overlays.any() {
            return FaceReport::default();
        }

        let faces = match self.analyzer.detect_faces(frame) {
            Ok(faces) => faces,
            Err(err) => {
                log::warn!("face detection failed: {err}");
                return FaceReport::default();
            }
        };

        // Fit everything on the untouched frame before drawing.
        let fitted: Vec<(FaceRegion, Option<FaceLandmarks>)> = faces
            .into_iter()
            .map(|face| {
                let landmarks = if self.overlays.any_needing_landmarks() {
                    self.analyzer
                        .fit_landmarks(frame, &face)
                        .map_err(|err| log::warn!("landmark fitting failed: {err}"))
                        .ok()
                } else {
                    None
                };
                (face, landmarks)
            })
            .collect();

        let mut report = FaceReport {
            faces: fitted.len(),
            ornaments_placed: 0,
        };
        for (face, landmarks) in &fitted {
            if self.overlays.face_box {
                draw::draw_rect(frame, face.bounds, draw::RED, 1);
            }
            let Some(landmarks) = landmarks else {
                continue;
            };
            if self.overlays.landmarks {
                for (x, y) in landmarks.points() {
                    draw::draw_circle(
                        frame,
                        (*x as i32, *y as i32),
                        draw::LANDMARK_RADIUS,
                        draw::RED,
                    );
                }
            }
            for ornament in &self.ornaments {
                if !self.overlays.is_on(ornament.kind) {
                    continue;
                }
                match compositor::composite(frame, landmarks, ornament) {
                    Ok(_) => report.ornaments_placed += 1,
                    Err(err) => log::warn!("{} skipped: {err}", ornament.kind.label()),
                }
            }
        }
        report
    }
}
