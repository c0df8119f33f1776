//! Broadcaster configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-subscriber delivery limits.
///
/// Both limits exist so that one slow or dead consumer can never stall
/// the publisher or the other subscribers of its room. Durations are
/// written in milliseconds (`send_timeout_ms`, `idle_timeout_ms`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Frames that may wait in a subscriber's outbound queue. A publish
    /// that finds the queue full evicts the subscriber.
    pub outbound_capacity: usize,

    /// Deadline for writing one frame to the transport. A write that
    /// misses it evicts the subscriber.
    #[serde(rename = "send_timeout_ms", with = "duration_ms")]
    pub send_timeout: Duration,

    /// Close connections that send nothing (not even a pong) for this
    /// long. While set, the server pings every half interval, so a client
    /// that answers pings stays open. `None` keeps quiet connections open
    /// indefinitely.
    #[serde(rename = "idle_timeout_ms", with = "duration_ms::option")]
    pub idle_timeout: Option<Duration>,
}

impl BroadcastConfig {
    /// Zero-capacity queues cannot hold a single frame.
    pub const MIN_OUTBOUND_CAPACITY: usize = 1;

    /// Clamps out-of-range values so the config is safe to use.
    pub fn validated(mut self) -> Self {
        if self.outbound_capacity < Self::MIN_OUTBOUND_CAPACITY {
            tracing::warn!(
                capacity = self.outbound_capacity,
                "outbound_capacity too small, clamping"
            );
            self.outbound_capacity = Self::MIN_OUTBOUND_CAPACITY;
        }
        if self.send_timeout.is_zero() {
            tracing::warn!("send_timeout is zero, using default");
            self.send_timeout = Self::default().send_timeout;
        }
        self
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 64,
            send_timeout: Duration::from_secs(5),
            idle_timeout: None,
        }
    }
}

/// Serde adapter storing a [`Duration`] as whole milliseconds.
pub mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }

    /// The same for `Option<Duration>`.
    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
            match d {
                Some(d) => s.serialize_some(&(d.as_millis() as u64)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
            Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
        }
    }
}
