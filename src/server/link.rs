//! Per-connection sleep/throttle state machine
//!
//! ```text
//!              first contact
//!                   │
//!                   ▼
//!             ┌───────────┐  warm-up window over   ┌─────────┐
//!             │ Throttled │ ─────────────────────► │  Awake  │
//!             └───────────┘                        └─────────┘
//!                   │  CannotReceive / unreachable /  ▲
//!                   │  no ack within sleep timeout    │ CanReceive / ack
//!                   ▼                                 │
//!             ┌──────────────────────────────────────────┐
//!             │                  Asleep                  │
//!             └──────────────────────────────────────────┘
//! ```
//!
//! Only lossy (UDP) links sleep or throttle. Stream and serial links are
//! always awake; a write failure closes them instead.

use std::time::Duration;

use tokio::time::Instant;

/// Reachability signal for a destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessEvent {
    /// Reachability acknowledgement from an external monitor
    Ack,
    /// Unreachable/NACK notification from an external monitor
    Unreachable,
    /// Client says it can receive (woke up)
    CanReceive,
    /// Client says it cannot receive (going to sleep)
    CannotReceive,
}

impl LivenessEvent {
    /// Parse a client signaling datagram
    ///
    /// Accepts `CAN_RECEIVE`/`WAKE` and `CANNOT_RECEIVE`/`SLEEP`, ASCII,
    /// case-insensitive, surrounding whitespace and NULs ignored.
    pub fn parse_datagram(data: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(data).ok()?;
        let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        if text.eq_ignore_ascii_case("CAN_RECEIVE") || text.eq_ignore_ascii_case("WAKE") {
            Some(LivenessEvent::CanReceive)
        } else if text.eq_ignore_ascii_case("CANNOT_RECEIVE") || text.eq_ignore_ascii_case("SLEEP") {
            Some(LivenessEvent::CannotReceive)
        } else {
            None
        }
    }
}

/// Delivery state of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Awake,
    Throttled,
    Asleep,
}

impl LinkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkStatus::Awake => "awake",
            LinkStatus::Throttled => "throttled",
            LinkStatus::Asleep => "asleep",
        }
    }
}

/// Sleep/throttle thresholds
#[derive(Debug, Clone)]
pub struct LinkPolicy {
    pub sleep_enabled: bool,
    /// Missing acks put the link to sleep
    pub require_ack: bool,
    pub sleep_timeout: Duration,
    pub unreachable_window: Duration,
    pub throttle_enabled: bool,
    pub throttle_window: Duration,
}

impl Default for LinkPolicy {
    fn default() -> Self {
        Self {
            sleep_enabled: true,
            require_ack: false,
            sleep_timeout: Duration::from_secs(10),
            unreachable_window: Duration::from_secs(5),
            throttle_enabled: true,
            throttle_window: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LinkState {
    policy: LinkPolicy,
    lossy: bool,
    first_contact: Instant,
    last_ack: Option<Instant>,
    last_unreachable: Option<Instant>,
    explicit_sleep: bool,
    last_status: LinkStatus,
}

impl LinkState {
    /// State for a lossy (UDP) link first seen at `now`
    pub fn lossy(policy: LinkPolicy, now: Instant) -> Self {
        let mut state = Self {
            policy,
            lossy: true,
            first_contact: now,
            last_ack: None,
            last_unreachable: None,
            explicit_sleep: false,
            last_status: LinkStatus::Awake,
        };
        state.last_status = state.status(now);
        state
    }

    /// State for a stream or serial link: always awake
    pub fn reliable(now: Instant) -> Self {
        Self {
            policy: LinkPolicy::default(),
            lossy: false,
            first_contact: now,
            last_ack: None,
            last_unreachable: None,
            explicit_sleep: false,
            last_status: LinkStatus::Awake,
        }
    }

    pub fn is_lossy(&self) -> bool {
        self.lossy
    }

    pub fn on_event(&mut self, event: LivenessEvent, now: Instant) {
        match event {
            LivenessEvent::Ack => self.last_ack = Some(now),
            LivenessEvent::Unreachable => self.last_unreachable = Some(now),
            LivenessEvent::CanReceive => {
                self.explicit_sleep = false;
                self.last_unreachable = None;
                self.last_ack = Some(now);
            }
            LivenessEvent::CannotReceive => self.explicit_sleep = true,
        }
    }

    pub fn is_sleeping(&self, now: Instant) -> bool {
        if !self.lossy || !self.policy.sleep_enabled {
            return false;
        }
        if self.explicit_sleep {
            return true;
        }
        let recently_unreachable = self
            .last_unreachable
            .is_some_and(|t| now.saturating_duration_since(t) < self.policy.unreachable_window);
        if recently_unreachable {
            return true;
        }
        if self.policy.require_ack {
            let baseline = self.last_ack.unwrap_or(self.first_contact);
            return now.saturating_duration_since(baseline) > self.policy.sleep_timeout;
        }
        false
    }

    pub fn is_throttled(&self, now: Instant) -> bool {
        self.lossy
            && self.policy.throttle_enabled
            && now.saturating_duration_since(self.first_contact) < self.policy.throttle_window
    }

    /// Sleep wins over throttle
    pub fn status(&self, now: Instant) -> LinkStatus {
        if self.is_sleeping(now) {
            LinkStatus::Asleep
        } else if self.is_throttled(now) {
            LinkStatus::Throttled
        } else {
            LinkStatus::Awake
        }
    }

    /// Recompute the status; returns `(old, new)` when it changed
    pub fn update(&mut self, now: Instant) -> Option<(LinkStatus, LinkStatus)> {
        let status = self.status(now);
        if status == self.last_status {
            return None;
        }
        let old = std::mem::replace(&mut self.last_status, status);
        Some((old, status))
    }
}
