//! Outbound message kinds and their delivery policy
//!
//! Priority is data: every kind maps to one row of [`POLICY_TABLE`].
//! Lower priority values are more urgent.
//!
//! | kind              | prio | ttl  | queueable | critical | capability  |
//! |-------------------|------|------|-----------|----------|-------------|
//! | Heartbeat         | -20  | 1s   | no        | yes      | GDL90       |
//! | DeviceHeartbeat   | -20  | 1s   | no        | yes      | GDL90       |
//! | DeviceId          | -15  | 1s   | no        | yes      | GDL90       |
//! | Ownship           | -10  | 2s   | yes       | yes      | GDL90       |
//! | OwnshipGeoAltitude| -10  | 2s   | yes       | yes      | GDL90       |
//! | Ahrs              | -5   | 1s   | no        | no       | AHRS_GDL90  |
//! | Traffic           | 0    | 6s   | yes       | no       | GDL90       |
//! | Uplink            | 10   | 30s  | yes       | no       | GDL90       |

use std::fmt;
use std::time::Duration;

use bytes::Bytes;

use crate::server::Capabilities;

/// What an outbound frame carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Heartbeat,
    DeviceHeartbeat,
    DeviceId,
    Ownship,
    OwnshipGeoAltitude,
    Ahrs,
    Traffic,
    Uplink,
}

/// How a kind is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessagePolicy {
    pub priority: i32,
    /// Lifetime once queued
    pub ttl: Duration,
    /// May wait in a queue for a sleeping or throttled client
    pub queueable: bool,
    /// Bypasses the warm-up throttle
    pub critical: bool,
    /// Destinations must accept this capability
    pub capability: Capabilities,
}

const fn policy(
    priority: i32,
    ttl_secs: u64,
    queueable: bool,
    critical: bool,
    capability: Capabilities,
) -> MessagePolicy {
    MessagePolicy {
        priority,
        ttl: Duration::from_secs(ttl_secs),
        queueable,
        critical,
        capability,
    }
}

/// Indexed by `MessageKind as usize`
pub const POLICY_TABLE: [MessagePolicy; 8] = [
    policy(-20, 1, false, true, Capabilities::GDL90),
    policy(-20, 1, false, true, Capabilities::GDL90),
    policy(-15, 1, false, true, Capabilities::GDL90),
    policy(-10, 2, true, true, Capabilities::GDL90),
    policy(-10, 2, true, true, Capabilities::GDL90),
    policy(-5, 1, false, false, Capabilities::AHRS_GDL90),
    policy(0, 6, true, false, Capabilities::GDL90),
    policy(10, 30, true, false, Capabilities::GDL90),
];

impl MessageKind {
    pub const ALL: [MessageKind; 8] = [
        MessageKind::Heartbeat,
        MessageKind::DeviceHeartbeat,
        MessageKind::DeviceId,
        MessageKind::Ownship,
        MessageKind::OwnshipGeoAltitude,
        MessageKind::Ahrs,
        MessageKind::Traffic,
        MessageKind::Uplink,
    ];

    pub fn policy(self) -> &'static MessagePolicy {
        &POLICY_TABLE[self as usize]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Heartbeat => "heartbeat",
            MessageKind::DeviceHeartbeat => "device-heartbeat",
            MessageKind::DeviceId => "device-id",
            MessageKind::Ownship => "ownship",
            MessageKind::OwnshipGeoAltitude => "ownship-geo-altitude",
            MessageKind::Ahrs => "ahrs",
            MessageKind::Traffic => "traffic",
            MessageKind::Uplink => "uplink",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A framed message (or batch of frames) ready for delivery
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub kind: MessageKind,
    pub frame: Bytes,
}

impl OutboundMessage {
    pub fn new(kind: MessageKind, frame: Bytes) -> Self {
        Self { kind, frame }
    }

    pub fn policy(&self) -> &'static MessagePolicy {
        self.kind.policy()
    }
}
