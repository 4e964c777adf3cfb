use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub type EpochMillis = u64;

/// Source of wall-clock time.
///
/// Peers compare target instants against their own clock only; there is no
/// offset estimation between peers, so the alignment is as good as the OS
/// time sync on each machine.
pub trait Clock {
    fn now_millis(&self) -> EpochMillis;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> EpochMillis {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as EpochMillis)
            .unwrap_or(0)
    }
}

/// Signed milliseconds from `now` until `target`. Negative when `target`
/// has already passed. Saturates at the `i64` range.
pub fn delay_until(target: EpochMillis, now: EpochMillis) -> i64 {
    let delay = i128::from(target) - i128::from(now);
    delay.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tokio::time::Instant;

    /// Wall clock that follows tokio's (possibly paused) timer clock, so
    /// `tokio::time::advance` moves both together.
    #[derive(Debug, Clone, Copy)]
    pub struct TimerClock {
        origin_millis: EpochMillis,
        origin: Instant,
    }

    impl TimerClock {
        pub fn starting_at(origin_millis: EpochMillis) -> Self {
            Self {
                origin_millis,
                origin: Instant::now(),
            }
        }
    }

    impl Clock for TimerClock {
        fn now_millis(&self) -> EpochMillis {
            self.origin_millis + self.origin.elapsed().as_millis() as EpochMillis
        }
    }
}
