/// Tick counter that fires once every `threshold` ticks.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    count: u32,
    threshold: u32,
}

impl Heartbeat {
    pub fn new(threshold: u32) -> Self {
        Self {
            count: 0,
            threshold: threshold.max(1),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Returns true when the liveness message is due; the counter then wraps to 0.
    pub fn tick(&mut self) -> bool {
        self.count += 1;
        if self.count >= self.threshold {
            self.count = 0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fires(heartbeat: &mut Heartbeat, ticks: u32) -> usize {
        (0..ticks).filter(|_| heartbeat.tick()).count()
    }

    #[test]
    fn fires_once_per_threshold() {
        let mut heartbeat = Heartbeat::new(30);
        assert_eq!(fires(&mut heartbeat, 29), 0);
        assert_eq!(heartbeat.count(), 29);

        assert!(heartbeat.tick());
        assert_eq!(heartbeat.count(), 0);
    }

    #[test]
    fn thirty_ticks_fire_exactly_once() {
        let mut heartbeat = Heartbeat::new(30);
        assert_eq!(fires(&mut heartbeat, 30), 1);
    }

    #[test]
    fn keeps_period_across_wraps() {
        let mut heartbeat = Heartbeat::new(30);
        assert_eq!(fires(&mut heartbeat, 95), 3);
        assert_eq!(heartbeat.count(), 5);
    }

    #[test]
    fn zero_threshold_fires_every_tick() {
        let mut heartbeat = Heartbeat::new(0);
        assert_eq!(heartbeat.threshold(), 1);
        assert_eq!(fires(&mut heartbeat, 4), 4);
    }
}
