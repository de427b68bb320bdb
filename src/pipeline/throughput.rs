use std::time::Instant;

/// Acquisitions counted per measurement.
pub const SAMPLE_FRAMES: u32 = 100;

/// One-shot frames-per-second measurement over the next `SAMPLE_FRAMES` acquisitions.
#[derive(Debug)]
pub struct ThroughputEstimator {
    sample_frames: u32,
    in_flight: Option<Sample>,
    last_fps: Option<f32>,
}

#[derive(Debug)]
struct Sample {
    started: Instant,
    counted: u32,
}

impl Default for ThroughputEstimator {
    fn default() -> Self {
        Self::new(SAMPLE_FRAMES)
    }
}

impl ThroughputEstimator {
    pub fn new(sample_frames: u32) -> Self {
        Self {
            sample_frames: sample_frames.max(1),
            in_flight: None,
            last_fps: None,
        }
    }

    /// Arm a measurement. Ignored while one is already running.
    pub fn begin_sample(&mut self, now: Instant) -> bool {
        if self.in_flight.is_some() {
            log::debug!("throughput sample already in flight, ignoring request");
            return false;
        }
        self.in_flight = Some(Sample {
            started: now,
            counted: 0,
        });
        true
    }

    pub fn is_sampling(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Most recent completed measurement.
    pub fn last_fps(&self) -> Option<f32> {
        self.last_fps
    }

    /// Count one acquisition; returns the measurement when the sample completes.
    pub fn record_frame(&mut self, now: Instant) -> Option<f32> {
        let sample = self.in_flight.as_mut()?;
        sample.counted += 1;
        if sample.counted < self.sample_frames {
            return None;
        }

        let elapsed = now.duration_since(sample.started).as_secs_f32();
        self.in_flight = None;
        if elapsed <= 0.0 {
            log::warn!("throughput sample finished with no elapsed time");
            return None;
        }

        let fps = self.sample_frames as f32 / elapsed;
        self.last_fps = Some(fps);
        Some(fps)
    }
}
