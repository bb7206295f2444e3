//! Absolute time bound shared by every wait of one attempt.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    end: Instant,
}

impl Deadline {
    pub(crate) fn after(budget: Duration) -> Self {
        Self {
            end: Instant::now() + budget,
        }
    }

    pub(crate) fn at(end: Instant) -> Self {
        Self { end }
    }

    pub(crate) fn end(&self) -> Instant {
        self.end
    }

    pub(crate) fn remaining(&self) -> Duration {
        self.end.saturating_duration_since(Instant::now())
    }

    pub(crate) fn expired(&self) -> bool {
        Instant::now() >= self.end
    }

    /// `wait` shortened so it never runs past the deadline.
    pub(crate) fn cap(&self, wait: Duration) -> Duration {
        wait.min(self.remaining())
    }

    /// Sleep for `wait`, or until the deadline if that comes first.
    pub(crate) async fn pause(&self, wait: Duration) {
        tokio::time::sleep(self.cap(wait)).await;
    }

    /// A later deadline, `extra` past this one.
    pub(crate) fn extended(&self, extra: Duration) -> Self {
        Self::at(self.end + extra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_cap_and_expiry() {
        let deadline = Deadline::after(Duration::from_secs(5));
        assert_eq!(deadline.cap(Duration::from_secs(2)), Duration::from_secs(2));
        deadline.pause(Duration::from_secs(4)).await;
        assert_eq!(deadline.cap(Duration::from_secs(2)), Duration::from_secs(1));
        deadline.pause(Duration::from_secs(60)).await;
        assert!(deadline.expired());
        assert_eq!(deadline.cap(Duration::from_secs(2)), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extended_outlives_original() {
        let deadline = Deadline::after(Duration::from_secs(1));
        let outer = deadline.extended(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(deadline.expired());
        assert!(!outer.expired());
        assert_eq!(outer.end() - deadline.end(), Duration::from_secs(30));
    }
}
