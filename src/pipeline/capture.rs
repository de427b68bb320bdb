use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded, unbounded};

use super::{
    color,
    face::FaceOverlay,
    frame_buffer::FrameBuffer,
    motion::{MotionDetector, MotionTransition},
    recording::{DEFAULT_FPS, RecordingController, RecordingEvent},
    source::FrameSource,
    throughput::ThroughputEstimator,
};
use crate::{
    error::Result,
    storage::{ArtifactStore, new_artifact_name},
    types::{ArtifactKind, Command, DisplayFrame, Frame, Notification, StopReason},
};

const NOTIFY_TIMEOUT: Duration = Duration::from_millis(100);

/// Per-frame analysis step. Each application variant runs one of these.
pub enum Analyzer {
    None,
    Motion(MotionDetector),
    Face(FaceOverlay),
}

#[derive(Clone, Debug)]
pub struct CaptureOptions {
    pub motion_detection: bool,
    pub record_on_motion: bool,
    /// Clip frame rate until a throughput sample has been taken.
    pub default_fps: f32,
    pub notification_capacity: usize,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            motion_detection: true,
            record_on_motion: false,
            default_fps: DEFAULT_FPS,
            notification_capacity: 32,
        }
    }
}

/// State owned by the capture thread.
pub struct CaptureLoop {
    analyzer: Analyzer,
    motion_detection: bool,
    record_on_motion: bool,
    recorder: RecordingController,
    throughput: ThroughputEstimator,
    store: Box<dyn ArtifactStore>,
    frame_buffer: Arc<FrameBuffer>,
    notify_tx: Sender<Notification>,
    command_rx: Receiver<Command>,
    photo_requested: bool,
    sequence: u64,
}

impl CaptureLoop {
    pub fn new(
        analyzer: Analyzer,
        store: Box<dyn ArtifactStore>,
        options: &CaptureOptions,
        frame_buffer: Arc<FrameBuffer>,
        notify_tx: Sender<Notification>,
        command_rx: Receiver<Command>,
    ) -> Self {
        Self {
            analyzer,
            motion_detection: options.motion_detection,
            record_on_motion: options.record_on_motion,
            recorder: RecordingController::new().with_default_fps(options.default_fps),
            throughput: ThroughputEstimator::default(),
            store,
            frame_buffer,
            notify_tx,
            command_rx,
            photo_requested: false,
            sequence: 0,
        }
    }

    pub fn with_recorder(mut self, recorder: RecordingController) -> Self {
        self.recorder = recorder;
        self
    }

    /// Pull frames until `running` clears or the source ends. Always finishes
    /// with a `Stopped` notification.
    pub fn run(mut self, mut source: Box<dyn FrameSource>, running: &AtomicBool) -> StopReason {
        log::info!("capture loop started on {}", source.describe());
        let reason = loop {
            if !running.load(Ordering::Relaxed) {
                break StopReason::Requested;
            }
            self.apply_commands();

            let frame = match source.read() {
                Ok(Some(frame)) if frame.is_valid() => frame,
                Ok(Some(_)) => {
                    log::warn!("{}: invalid frame, treating as end of stream", source.describe());
                    break StopReason::EndOfStream;
                }
                Ok(None) => break StopReason::EndOfStream,
                Err(err) => {
                    log::warn!("{}: read failed, ending stream: {err}", source.describe());
                    break StopReason::EndOfStream;
                }
            };
            self.process(frame);
        };
        drop(source);

        if let Some(event) = self.recorder.close_on_exit() {
            self.report_recording(event);
        }
        log::info!("capture loop stopped ({reason:?})");
        self.notify(Notification::Stopped(reason.clone()));
        reason
    }

    fn apply_commands(&mut self) {
        loop {
            match self.command_rx.try_recv() {
                Ok(command) => self.apply(command),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
    }

    fn apply(&mut self, command: Command) {
        log::debug!("command {command:?}");
        match command {
            Command::TakePhoto => self.photo_requested = true,
            Command::BeginRecording => {
                self.recorder.request_begin();
            }
            Command::EndRecording => {
                self.recorder.request_end();
            }
            Command::SetOverlay(kind, on) => match &mut self.analyzer {
                Analyzer::Face(overlay) => overlay.set_overlay(kind, on),
                _ => log::debug!("no face analyzer, ignoring overlay {}", kind.label()),
            },
            Command::SetMotionDetection(on) => self.motion_detection = on,
            Command::SetRecordOnMotion(on) => self.record_on_motion = on,
            Command::SampleThroughput => {
                self.throughput.begin_sample(Instant::now());
            }
        }
    }

    fn process(&mut self, mut frame: Frame) {
        if self.photo_requested {
            self.photo_requested = false;
            self.save_photo(&frame);
        }

        self.analyze(&mut frame);

        let fps = self.throughput.last_fps();
        for event in self.recorder.advance(&frame, fps, self.store.as_mut()) {
            self.report_recording(event);
        }

        self.sequence += 1;
        let display = Arc::new(color::to_display(&frame, self.sequence));
        self.frame_buffer.publish(display.clone());
        self.publish_frame(display);

        if let Some(fps) = self.throughput.record_frame(Instant::now()) {
            log::info!("measured {fps:.1} fps");
            self.notify(Notification::ThroughputMeasured(fps));
        }
    }

    fn save_photo(&mut self, frame: &Frame) {
        let name = new_artifact_name();
        match self.store.save_photo(&name, frame) {
            Ok(path) => {
                log::info!("photo saved to {}", path.display());
                self.notify(Notification::PhotoSaved(name));
            }
            Err(err) => {
                log::warn!("photo {name} not saved: {err}");
                self.notify(Notification::ArtifactFailed {
                    kind: ArtifactKind::Photo,
                    reason: err.to_string(),
                });
            }
        }
    }

    fn analyze(&mut self, frame: &mut Frame) {
        let transition = match &mut self.analyzer {
            Analyzer::Motion(detector) if self.motion_detection => {
                detector.observe(frame).transition
            }
            Analyzer::Face(overlay) => {
                overlay.apply(frame);
                None
            }
            _ => None,
        };

        match transition {
            Some(MotionTransition::Started) => {
                if self.record_on_motion {
                    self.recorder.request_begin();
                }
                self.notify(Notification::MotionStarted);
            }
            Some(MotionTransition::Stopped) => {
                if self.record_on_motion {
                    self.recorder.request_end();
                }
                self.notify(Notification::MotionStopped);
            }
            None => {}
        }
    }

    fn report_recording(&self, event: RecordingEvent) {
        match event {
            RecordingEvent::Opened { name } => log::info!("recording {name}"),
            RecordingEvent::Saved { name, frames } => {
                log::info!("clip {name} saved with {frames} frames");
                self.notify(Notification::ClipSaved(name));
            }
            RecordingEvent::Failed { name, reason } => {
                log::warn!("clip {name} failed: {reason}");
                self.notify(Notification::ArtifactFailed {
                    kind: ArtifactKind::Clip,
                    reason,
                });
            }
        }
    }

    fn publish_frame(&self, display: Arc<DisplayFrame>) {
        // Viewers that fall behind simply miss frames.
        let _ = self.notify_tx.try_send(Notification::FrameAvailable(display));
    }

    fn notify(&self, notification: Notification) {
        if let Err(err) = self.notify_tx.send_timeout(notification, NOTIFY_TIMEOUT) {
            log::warn!("notification dropped: {:?}", err.into_inner());
        }
    }
}

/// Handle to a running capture thread. Dropping it stops and joins the thread.
#[derive(Debug)]
pub struct CaptureHandle {
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
    command_tx: Sender<Command>,
    notifications: Receiver<Notification>,
    frame_buffer: Arc<FrameBuffer>,
}

/// Spawn the capture thread. The source is opened on that thread; failure to
/// open it is reported as `SourceUnavailable` then `Stopped`.
pub fn start_capture<F>(
    open_source: F,
    analyzer: Analyzer,
    store: Box<dyn ArtifactStore>,
    options: CaptureOptions,
) -> Result<CaptureHandle>
where
    F: FnOnce() -> Result<Box<dyn FrameSource>> + Send + 'static,
{
    let (command_tx, command_rx) = unbounded();
    let (notify_tx, notifications) = bounded(options.notification_capacity.max(1));
    let frame_buffer = Arc::new(FrameBuffer::new());
    let running = Arc::new(AtomicBool::new(true));

    let capture = CaptureLoop::new(
        analyzer,
        store,
        &options,
        frame_buffer.clone(),
        notify_tx.clone(),
        command_rx,
    );
    let running_flag = running.clone();

    let handle = thread::Builder::new()
        .name("capture".into())
        .spawn(move || {
            let source = match open_source() {
                Ok(source) => source,
                Err(err) => {
                    log::error!("failed to open video source: {err}");
                    let _ = notify_tx.send_timeout(
                        Notification::SourceUnavailable(err.to_string()),
                        NOTIFY_TIMEOUT,
                    );
                    let _ = notify_tx.send_timeout(
                        Notification::Stopped(StopReason::SourceUnavailable),
                        NOTIFY_TIMEOUT,
                    );
                    running_flag.store(false, Ordering::SeqCst);
                    return;
                }
            };
            capture.run(source, &running_flag);
            running_flag.store(false, Ordering::SeqCst);
        })?;

    Ok(CaptureHandle {
        running,
        handle: Some(handle),
        command_tx,
        notifications,
        frame_buffer,
    })
}

impl CaptureHandle {
    /// Queue a command for the top of the next iteration.
    pub fn send(&self, command: Command) {
        if self.command_tx.send(command).is_err() {
            log::debug!("capture thread already gone, command dropped");
        }
    }

    pub fn take_photo(&self) {
        self.send(Command::TakePhoto);
    }

    pub fn begin_recording(&self) {
        self.send(Command::BeginRecording);
    }

    pub fn end_recording(&self) {
        self.send(Command::EndRecording);
    }

    pub fn sample_throughput(&self) {
        self.send(Command::SampleThroughput);
    }

    /// Sender for threads that issue commands independently of the handle.
    pub fn commands(&self) -> Sender<Command> {
        self.command_tx.clone()
    }

    pub fn notifications(&self) -> &Receiver<Notification> {
        &self.notifications
    }

    pub fn latest_frame(&self) -> Option<Arc<DisplayFrame>> {
        self.frame_buffer.latest()
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            // Keep the loop from blocking on a full notification queue.
            while !handle.is_finished() {
                while self.notifications.try_recv().is_ok() {}
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::{
        error::CaptureError,
        pipeline::{
            draw,
            face::tests::FixedFace,
            motion::{
                MotionConfig,
                tests::{ten_frame_sequence, scene},
            },
            source::tests::ScriptedSource,
        },
        storage::memory::MemoryArtifacts,
        types::OverlayKind,
    };

    struct Harness {
        capture: CaptureLoop,
        commands: Sender<Command>,
        notifications: Receiver<Notification>,
        frame_buffer: Arc<FrameBuffer>,
    }

    fn harness(analyzer: Analyzer, store: MemoryArtifacts, options: CaptureOptions) -> Harness {
        let (command_tx, command_rx) = unbounded();
        let (notify_tx, notifications) = bounded(256);
        let frame_buffer = Arc::new(FrameBuffer::new());
        let capture = CaptureLoop::new(
            analyzer,
            Box::new(store),
            &options,
            frame_buffer.clone(),
            notify_tx,
            command_rx,
        );
        Harness {
            capture,
            commands: command_tx,
            notifications,
            frame_buffer,
        }
    }

    fn drain(rx: &Receiver<Notification>) -> Vec<Notification> {
        rx.try_iter().collect()
    }

    fn without_frames(notifications: &[Notification]) -> Vec<&Notification> {
        notifications
            .iter()
            .filter(|n| !matches!(n, Notification::FrameAvailable(_)))
            .collect()
    }

    /// Endless gray frames, a millisecond apart.
    struct EndlessSource {
        reads: Arc<AtomicUsize>,
    }

    impl FrameSource for EndlessSource {
        fn read(&mut self) -> Result<Option<Frame>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(1));
            Ok(Some(Frame::filled(16, 12, [90, 90, 90])))
        }

        fn describe(&self) -> String {
            "endless".into()
        }
    }

    #[test]
    fn photo_holds_the_raw_frame_while_display_is_annotated() {
        let store = MemoryArtifacts::default();
        let face = FixedFace::default();
        let mut overlay = FaceOverlay::new(Box::new(face), Vec::new());
        overlay.set_overlay(OverlayKind::FaceBox, true);
        let h = harness(Analyzer::Face(overlay), store.clone(), CaptureOptions::default());

        let raw = Frame::filled(100, 100, [10, 20, 30]);
        h.commands.send(Command::TakePhoto).unwrap();
        let running = AtomicBool::new(true);
        let reason = h
            .capture
            .run(Box::new(ScriptedSource::new(vec![raw.clone()])), &running);
        assert_eq!(reason, StopReason::EndOfStream);

        let recorded = store.recorded.lock().unwrap();
        assert_eq!(recorded.photos.len(), 1);
        assert_eq!(recorded.photos[0].1.bgr, raw.bgr);

        let display = h.frame_buffer.latest().unwrap();
        let corner = ((20 * 100 + 20) * 4) as usize;
        let [b, g, r] = draw::RED;
        assert_eq!(&display.rgba[corner..corner + 4], &[r, g, b, 255]);

        let events = drain(&h.notifications);
        assert!(matches!(without_frames(&events)[..], [Notification::PhotoSaved(_), Notification::Stopped(StopReason::EndOfStream)]));
    }

    #[test]
    fn ten_frame_motion_scenario_records_one_clip() {
        let store = MemoryArtifacts::default();
        let options = CaptureOptions {
            record_on_motion: true,
            ..Default::default()
        };
        let h = harness(
            Analyzer::Motion(MotionDetector::new(MotionConfig::default())),
            store.clone(),
            options,
        );
        let running = AtomicBool::new(true);
        h.capture
            .with_recorder(RecordingController::with_naming(|| "motion".into()))
            .run(Box::new(ScriptedSource::new(ten_frame_sequence())), &running);

        let events = drain(&h.notifications);
        let signals: Vec<String> = without_frames(&events)
            .iter()
            .map(|n| match n {
                Notification::MotionStarted => "started".to_string(),
                Notification::MotionStopped => "stopped".to_string(),
                Notification::ClipSaved(name) => format!("saved {name}"),
                Notification::Stopped(reason) => format!("{reason:?}"),
                other => format!("{other:?}"),
            })
            .collect();
        assert_eq!(signals, vec!["started", "stopped", "saved motion", "EndOfStream"]);

        let recorded = store.recorded.lock().unwrap();
        assert_eq!(recorded.clips.len(), 1);
        assert!(recorded.clips[0].finished);
        assert_eq!(recorded.clips[0].frames.len(), 4);
        assert_eq!(recorded.covers.len(), 1);
    }

    #[test]
    fn motion_without_auto_record_leaves_the_recorder_alone() {
        let store = MemoryArtifacts::default();
        let h = harness(
            Analyzer::Motion(MotionDetector::new(MotionConfig::default())),
            store.clone(),
            CaptureOptions::default(),
        );
        let running = AtomicBool::new(true);
        h.capture
            .run(Box::new(ScriptedSource::new(ten_frame_sequence())), &running);
        assert!(store.recorded.lock().unwrap().clips.is_empty());
    }

    #[test]
    fn disabled_motion_detection_draws_nothing() {
        let h = harness(
            Analyzer::Motion(MotionDetector::new(MotionConfig::default())),
            MemoryArtifacts::default(),
            CaptureOptions {
                motion_detection: false,
                ..Default::default()
            },
        );
        let running = AtomicBool::new(true);
        h.capture.run(
            Box::new(ScriptedSource::new(vec![scene(None), scene(Some(100))])),
            &running,
        );
        let events = drain(&h.notifications);
        assert!(!events.iter().any(|n| matches!(n, Notification::MotionStarted)));
        let display = h.frame_buffer.latest().unwrap();
        assert!(display.rgba.chunks_exact(4).all(|px| px[0] == px[2]));
    }

    #[test]
    fn session_left_open_is_closed_on_exit() {
        let store = MemoryArtifacts::default();
        let h = harness(Analyzer::None, store.clone(), CaptureOptions::default());
        h.commands.send(Command::BeginRecording).unwrap();
        let frames = (0..5).map(|_| Frame::filled(8, 8, [1, 2, 3])).collect();
        let running = AtomicBool::new(true);
        h.capture
            .run(Box::new(ScriptedSource::new(frames)), &running);

        let recorded = store.recorded.lock().unwrap();
        assert_eq!(recorded.clips[0].frames.len(), 5);
        assert!(recorded.clips[0].finished);
        let events = drain(&h.notifications);
        assert!(matches!(
            without_frames(&events)[..],
            [Notification::ClipSaved(_), Notification::Stopped(StopReason::EndOfStream)]
        ));
    }

    #[test]
    fn clip_open_failure_is_reported_and_the_loop_continues() {
        let store = MemoryArtifacts {
            fail_clip_open: true,
            ..Default::default()
        };
        let h = harness(Analyzer::None, store, CaptureOptions::default());
        h.commands.send(Command::BeginRecording).unwrap();
        let frames = (0..3).map(|_| Frame::filled(8, 8, [1, 2, 3])).collect();
        let running = AtomicBool::new(true);
        h.capture
            .run(Box::new(ScriptedSource::new(frames)), &running);

        let events = drain(&h.notifications);
        let frames_seen = events
            .iter()
            .filter(|n| matches!(n, Notification::FrameAvailable(_)))
            .count();
        assert_eq!(frames_seen, 3);
        assert!(events.iter().any(|n| matches!(
            n,
            Notification::ArtifactFailed {
                kind: ArtifactKind::Clip,
                ..
            }
        )));
    }

    #[test]
    fn throughput_sample_reports_once() {
        let h = harness(Analyzer::None, MemoryArtifacts::default(), CaptureOptions::default());
        h.commands.send(Command::SampleThroughput).unwrap();
        let frames = (0..150).map(|_| Frame::filled(4, 4, [0, 0, 0])).collect();
        let running = AtomicBool::new(true);
        h.capture
            .run(Box::new(ScriptedSource::new(frames)), &running);

        let measured: Vec<f32> = drain(&h.notifications)
            .into_iter()
            .filter_map(|n| match n {
                Notification::ThroughputMeasured(fps) => Some(fps),
                _ => None,
            })
            .collect();
        assert_eq!(measured.len(), 1);
        assert!(measured[0] > 0.0);
    }

    #[test]
    fn published_frames_carry_increasing_sequence_numbers() {
        let h = harness(Analyzer::None, MemoryArtifacts::default(), CaptureOptions::default());
        let frames = (0..4).map(|_| Frame::filled(4, 4, [0, 0, 0])).collect();
        let running = AtomicBool::new(true);
        h.capture
            .run(Box::new(ScriptedSource::new(frames)), &running);

        let sequences: Vec<u64> = drain(&h.notifications)
            .into_iter()
            .filter_map(|n| match n {
                Notification::FrameAvailable(frame) => Some(frame.sequence),
                _ => None,
            })
            .collect();
        assert_eq!(sequences, vec![1, 2, 3, 4]);
        assert_eq!(h.frame_buffer.latest().map(|f| f.sequence), Some(4));
    }

    #[test]
    fn unavailable_source_stops_the_thread_with_a_reason() {
        let handle = start_capture(
            || Err(CaptureError::SourceUnavailable("camera #7".into())),
            Analyzer::None,
            Box::new(MemoryArtifacts::default()),
            CaptureOptions::default(),
        )
        .unwrap();

        let rx = handle.notifications().clone();
        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(first, Notification::SourceUnavailable(msg) if msg.contains("camera #7")));
        assert!(matches!(
            second,
            Notification::Stopped(StopReason::SourceUnavailable)
        ));
        handle.stop();
    }

    #[test]
    fn stop_request_ends_a_live_stream() {
        let reads = Arc::new(AtomicUsize::new(0));
        let source_reads = reads.clone();
        let handle = start_capture(
            move || Ok(Box::new(EndlessSource { reads: source_reads }) as Box<dyn FrameSource>),
            Analyzer::None,
            Box::new(MemoryArtifacts::default()),
            CaptureOptions::default(),
        )
        .unwrap();

        let rx = handle.notifications().clone();
        loop {
            match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                Notification::FrameAvailable(_) => break,
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(handle.latest_frame().is_some());

        handle.running_flag().store(false, Ordering::SeqCst);
        let stopped = loop {
            match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                Notification::Stopped(reason) => break reason,
                _ => continue,
            }
        };
        assert_eq!(stopped, StopReason::Requested);
        handle.stop();
        assert!(reads.load(Ordering::SeqCst) >= 1);
    }
}
