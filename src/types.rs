use std::{sync::Arc, time::Instant};

/// A raw acquired frame in BGR byte order, as handed out by a `FrameSource`.
#[derive(Clone, Debug)]
pub struct Frame {
    pub bgr: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(bgr: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            bgr,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    pub fn filled(width: u32, height: u32, color: [u8; 3]) -> Self {
        let mut bgr = Vec::with_capacity(width as usize * height as usize * 3);
        for _ in 0..(width as usize * height as usize) {
            bgr.extend_from_slice(&color);
        }
        Self::new(bgr, width, height)
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.bgr.len() == self.width as usize * self.height as usize * 3
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Display-ready copy of a frame (RGBA). Never mutated after publication.
#[derive(Clone, Debug)]
pub struct DisplayFrame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u64,
    pub timestamp: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x >= 0
            && self.y >= 0
            && self.x as i64 + self.width as i64 <= width as i64
            && self.y as i64 + self.height as i64 <= height as i64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverlayKind {
    FaceBox,
    Landmarks,
    Glasses,
    Mustache,
    MouseNose,
}

impl OverlayKind {
    pub const ALL: [OverlayKind; 5] = [
        OverlayKind::FaceBox,
        OverlayKind::Landmarks,
        OverlayKind::Glasses,
        OverlayKind::Mustache,
        OverlayKind::MouseNose,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            OverlayKind::FaceBox => "box",
            OverlayKind::Landmarks => "landmarks",
            OverlayKind::Glasses => "glasses",
            OverlayKind::Mustache => "mustache",
            OverlayKind::MouseNose => "mouse-nose",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.label() == label)
    }

    pub fn needs_landmarks(&self) -> bool {
        !matches!(self, OverlayKind::FaceBox)
    }
}

/// One named switch per overlay kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OverlayFlags {
    pub face_box: bool,
    pub landmarks: bool,
    pub glasses: bool,
    pub mustache: bool,
    pub mouse_nose: bool,
}

impl OverlayFlags {
    pub fn set(&mut self, kind: OverlayKind, on: bool) {
        *self.slot(kind) = on;
    }

    pub fn is_on(&self, kind: OverlayKind) -> bool {
        match kind {
            OverlayKind::FaceBox => self.face_box,
            OverlayKind::Landmarks => self.landmarks,
            OverlayKind::Glasses => self.glasses,
            OverlayKind::Mustache => self.mustache,
            OverlayKind::MouseNose => self.mouse_nose,
        }
    }

    pub fn any(&self) -> bool {
        OverlayKind::ALL.iter().any(|kind| self.is_on(*kind))
    }

    pub fn any_needing_landmarks(&self) -> bool {
        OverlayKind::ALL
            .iter()
            .any(|kind| kind.needs_landmarks() && self.is_on(*kind))
    }

    fn slot(&mut self, kind: OverlayKind) -> &mut bool {
        match kind {
            OverlayKind::FaceBox => &mut self.face_box,
            OverlayKind::Landmarks => &mut self.landmarks,
            OverlayKind::Glasses => &mut self.glasses,
            OverlayKind::Mustache => &mut self.mustache,
            OverlayKind::MouseNose => &mut self.mouse_nose,
        }
    }
}

/// Requests from the collaborator, applied at the top of the next iteration.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    TakePhoto,
    BeginRecording,
    EndRecording,
    SetOverlay(OverlayKind, bool),
    SetMotionDetection(bool),
    SetRecordOnMotion(bool),
    SampleThroughput,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArtifactKind {
    Photo,
    Clip,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopReason {
    Requested,
    EndOfStream,
    SourceUnavailable,
}

#[derive(Clone, Debug)]
pub enum Notification {
    FrameAvailable(Arc<DisplayFrame>),
    PhotoSaved(String),
    ClipSaved(String),
    ThroughputMeasured(f32),
    MotionStarted,
    MotionStopped,
    ArtifactFailed { kind: ArtifactKind, reason: String },
    SourceUnavailable(String),
    Stopped(StopReason),
}
