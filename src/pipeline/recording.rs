use crate::{
    storage::{ArtifactStore, ClipWriter, new_artifact_name},
    types::Frame,
};

/// Frame rate used when no throughput measurement is available.
pub const DEFAULT_FPS: f32 = 30.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordingStatus {
    Stopped,
    Starting,
    Started,
    Stopping,
}

/// Outcome of one `advance` the capture loop reports to collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingEvent {
    Opened { name: String },
    Saved { name: String, frames: u32 },
    Failed { name: String, reason: String },
}

struct Session {
    name: String,
    width: u32,
    height: u32,
    writer: Box<dyn ClipWriter>,
    rejected: u32,
}

enum State {
    Stopped,
    Starting,
    Started(Session),
    Stopping(Session),
}

/// Four-state recorder. Requests only move Stopped→Starting and
/// Started→Stopping; the capture thread completes each transition in `advance`.
pub struct RecordingController {
    state: State,
    naming: Box<dyn FnMut() -> String + Send>,
    default_fps: f32,
}

impl Default for RecordingController {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingController {
    pub fn new() -> Self {
        Self::with_naming(new_artifact_name)
    }

    pub fn with_naming(naming: impl FnMut() -> String + Send + 'static) -> Self {
        Self {
            state: State::Stopped,
            naming: Box::new(naming),
            default_fps: DEFAULT_FPS,
        }
    }

    /// Frame rate for sessions opened before any throughput measurement.
    pub fn with_default_fps(mut self, fps: f32) -> Self {
        if fps.is_finite() && fps > 0.0 {
            self.default_fps = fps;
        }
        self
    }

    pub fn status(&self) -> RecordingStatus {
        match self.state {
            State::Stopped => RecordingStatus::Stopped,
            State::Starting => RecordingStatus::Starting,
            State::Started(_) => RecordingStatus::Started,
            State::Stopping(_) => RecordingStatus::Stopping,
        }
    }

    pub fn request_begin(&mut self) -> bool {
        if matches!(self.state, State::Stopped) {
            log::debug!("recording: Stopped -> Starting");
            self.state = State::Starting;
            true
        } else {
            log::debug!("begin ignored while {:?}", self.status());
            false
        }
    }

    pub fn request_end(&mut self) -> bool {
        match std::mem::replace(&mut self.state, State::Stopped) {
            State::Started(session) => {
                log::debug!("recording: Started -> Stopping");
                self.state = State::Stopping(session);
                true
            }
            other => {
                self.state = other;
                log::debug!("end ignored while {:?}", self.status());
                false
            }
        }
    }

    /// Complete any pending transition, then append `frame` if a session is
    /// open. Covers are written from the same frame that opens a session.
    pub fn advance(
        &mut self,
        frame: &Frame,
        fps: Option<f32>,
        store: &mut dyn ArtifactStore,
    ) -> Vec<RecordingEvent> {
        let mut events = Vec::new();

        match std::mem::replace(&mut self.state, State::Stopped) {
            State::Starting => match self.open(frame, fps, store) {
                Ok(session) => {
                    events.push(RecordingEvent::Opened {
                        name: session.name.clone(),
                    });
                    self.state = State::Started(session);
                }
                Err(event) => events.push(event),
            },
            State::Stopping(session) => events.push(close(session)),
            other => self.state = other,
        }

        if let State::Started(session) = &mut self.state {
            if frame.dimensions() != (session.width, session.height) {
                session.rejected += 1;
                log::warn!(
                    "{}: dropping {}x{} frame, clip is {}x{} ({} rejected)",
                    session.name,
                    frame.width,
                    frame.height,
                    session.width,
                    session.height,
                    session.rejected
                );
            } else if let Err(err) = session.writer.append(frame) {
                log::warn!("{}: frame not written: {err}", session.name);
            }
        }

        events
    }

    /// Close an open or closing session when the loop exits.
    pub fn close_on_exit(&mut self) -> Option<RecordingEvent> {
        match std::mem::replace(&mut self.state, State::Stopped) {
            State::Started(session) | State::Stopping(session) => Some(close(session)),
            State::Starting | State::Stopped => None,
        }
    }

    fn open(
        &mut self,
        frame: &Frame,
        fps: Option<f32>,
        store: &mut dyn ArtifactStore,
    ) -> Result<Session, RecordingEvent> {
        let name = (self.naming)();
        let fps = fps
            .filter(|f| f.is_finite() && *f > 0.0)
            .unwrap_or(self.default_fps);

        if let Err(err) = store.save_cover(&name, frame) {
            log::warn!("{name}: cover still not saved: {err}");
        }

        match store.open_clip(&name, frame.width, frame.height, fps) {
            Ok(writer) => {
                log::debug!("recording: Starting -> Started ({name})");
                Ok(Session {
                    name,
                    width: frame.width,
                    height: frame.height,
                    writer,
                    rejected: 0,
                })
            }
            Err(err) => {
                log::error!("{name}: cannot open clip writer: {err}");
                Err(RecordingEvent::Failed {
                    name,
                    reason: err.to_string(),
                })
            }
        }
    }
}

fn close(session: Session) -> RecordingEvent {
    let Session {
        name,
        writer,
        rejected,
        ..
    } = session;
    let frames = writer.frames_written();
    if rejected > 0 {
        log::info!("{name}: {rejected} frames rejected for mismatched size");
    }
    match writer.finish() {
        Ok(()) => {
            log::debug!("recording: Stopping -> Stopped ({name})");
            RecordingEvent::Saved { name, frames }
        }
        Err(err) => {
            log::error!("{name}: clip not finalized: {err}");
            RecordingEvent::Failed {
                name,
                reason: err.to_string(),
            }
        }
    }
}
