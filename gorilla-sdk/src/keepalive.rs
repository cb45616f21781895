//! Link liveness: decides when to ping the server and when to give up on it.

use std::time::Duration;

use tokio::time::Instant;

/// Silence after which the server gets pinged.
pub const IDLE_THRESHOLD: Duration = Duration::from_secs(150);
/// How long an unanswered ping may stay outstanding.
pub const PING_TIMEOUT: Duration = Duration::from_secs(60);

/// What the receive loop should do after a liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepaliveAction {
    /// Traffic is recent enough, or a ping is still within its timeout.
    Idle,
    /// The link has been quiet too long and no ping is outstanding.
    SendPing,
    /// A ping went unanswered; drop the link and reconnect.
    LinkDead,
}

/// Tracks last-received and last-ping timestamps for one session.
#[derive(Debug, Clone)]
pub struct KeepaliveMonitor {
    idle_threshold: Duration,
    ping_timeout: Duration,
    last_received: Instant,
    last_ping_sent: Option<Instant>,
}

impl KeepaliveMonitor {
    pub fn new(idle_threshold: Duration, ping_timeout: Duration, now: Instant) -> Self {
        Self {
            idle_threshold,
            ping_timeout,
            last_received: now,
            last_ping_sent: None,
        }
    }

    /// Start over for a fresh session.
    pub fn reset(&mut self, now: Instant) {
        self.last_received = now;
        self.last_ping_sent = None;
    }

    pub fn record_received(&mut self, now: Instant) {
        self.last_received = now;
    }

    pub fn record_ping(&mut self, now: Instant) {
        self.last_ping_sent = Some(now);
    }

    pub fn last_received(&self) -> Instant {
        self.last_received
    }

    pub fn last_ping_sent(&self) -> Option<Instant> {
        self.last_ping_sent
    }

    /// A ping is outstanding when it was sent after the last received line.
    pub fn ping_outstanding(&self) -> bool {
        self.last_ping_sent
            .is_some_and(|ping| ping >= self.last_received)
    }

    pub fn check(&self, now: Instant) -> KeepaliveAction {
        if now.saturating_duration_since(self.last_received) <= self.idle_threshold {
            return KeepaliveAction::Idle;
        }
        match self.last_ping_sent {
            Some(ping) if ping >= self.last_received => {
                if now.saturating_duration_since(ping) > self.ping_timeout {
                    KeepaliveAction::LinkDead
                } else {
                    KeepaliveAction::Idle
                }
            }
            _ => KeepaliveAction::SendPing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn quiet_link_is_pinged_once_then_declared_dead() {
        let t = Instant::now();
        let mut ka = KeepaliveMonitor::new(IDLE_THRESHOLD, PING_TIMEOUT, t);

        assert_eq!(ka.check(t + secs(150)), KeepaliveAction::Idle);
        assert_eq!(ka.check(t + secs(151)), KeepaliveAction::SendPing);
        ka.record_ping(t + secs(151));

        // Outstanding ping: no second ping while waiting.
        for s in 152..=211 {
            assert_eq!(ka.check(t + secs(s)), KeepaliveAction::Idle, "at {s}s");
        }
        assert_eq!(ka.check(t + secs(151 + 61)), KeepaliveAction::LinkDead);
    }

    #[test]
    fn traffic_after_ping_clears_it() {
        let t = Instant::now();
        let mut ka = KeepaliveMonitor::new(IDLE_THRESHOLD, PING_TIMEOUT, t);
        ka.record_ping(t + secs(151));
        assert!(ka.ping_outstanding());
        ka.record_received(t + secs(160));
        assert!(!ka.ping_outstanding());
        assert_eq!(ka.check(t + secs(300)), KeepaliveAction::Idle);
        assert_eq!(ka.check(t + secs(311)), KeepaliveAction::SendPing);
    }

    #[test]
    fn reset_forgets_old_ping() {
        let t = Instant::now();
        let mut ka = KeepaliveMonitor::new(IDLE_THRESHOLD, PING_TIMEOUT, t);
        ka.record_ping(t + secs(151));
        ka.reset(t + secs(400));
        assert_eq!(ka.last_ping_sent(), None);
        assert_eq!(ka.check(t + secs(500)), KeepaliveAction::Idle);
    }
}
