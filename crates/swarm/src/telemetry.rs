const SAMPLE_COUNT: usize = 60;

/// Rolling frame-rate average over the last [`SAMPLE_COUNT`] timed frames.
///
/// Samples live in a fixed ring indexed by the timed-frame count, with a running sum
/// so each frame costs one subtraction and one addition.
#[derive(Debug)]
pub struct FrameStats {
    window: [f32; SAMPLE_COUNT],
    window_sum: f32,
    timed: u64,
    frames: u64,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameStats {
    pub fn new() -> Self {
        Self {
            window: [0.0; SAMPLE_COUNT],
            window_sum: 0.0,
            timed: 0,
            frames: 0,
        }
    }

    /// Counts every frame; only positive durations enter the average.
    pub fn record_frame(&mut self, dt: f32) {
        self.frames += 1;
        if dt <= 0.0 {
            return;
        }

        let slot = (self.timed % SAMPLE_COUNT as u64) as usize;
        self.window_sum += dt - self.window[slot];
        self.window[slot] = dt;
        self.timed += 1;
    }

    pub fn fps(&self) -> f32 {
        let filled = self.timed.min(SAMPLE_COUNT as u64) as f32;
        if filled == 0.0 || self.window_sum <= 0.0 {
            return 0.0;
        }
        filled / self.window_sum
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}
