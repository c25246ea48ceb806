/// Fires at a fixed rate independent of the frame rate.
///
/// At most one interval is consumed per call, and no more than one interval of backlog
/// is kept beyond the one that is due, so a stalled frame cannot cause a burst.
#[derive(Debug, Clone)]
pub struct SendTimer {
    rate: u32,
    interval: f32,
    accumulator: f32,
}

impl SendTimer {
    pub fn new(rate: u32) -> Self {
        let rate = rate.max(1);
        Self {
            rate,
            interval: 1.0 / rate as f32,
            accumulator: 0.0,
        }
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn accumulate(&mut self, dt: f32) {
        self.accumulator = (self.accumulator + dt.max(0.0)).min(self.interval * 2.0);
    }

    pub fn consume(&mut self) -> bool {
        if self.accumulator >= self.interval {
            self.accumulator -= self.interval;
            true
        } else {
            false
        }
    }
}
