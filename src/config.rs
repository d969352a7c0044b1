//! # Global runtime configuration.
//!
//! Provides [`Config`], the centralized settings for a [`Runtime`](crate::Runtime)
//! and for the managers built on top of it.
//!
//! ## Sentinel values
//! - `assembly_ttl = 0s` → partial messages are kept until complete (never evicted)
//! - `subscriber_capacity = 0` → each subscriber's own [`Subscribe::queue_capacity`](crate::Subscribe::queue_capacity) is used

use std::time::Duration;

use crate::policies::ReconnectPolicy;

/// Global configuration for the manager-stub runtime.
///
/// ## Field semantics
/// - `bus_capacity`: runtime event bus ring buffer size (min 1; clamped by Bus)
/// - `callback_delay`: completion delay used until the transport reports one
/// - `assembly_ttl`: age after which an incomplete multi-part message is dropped (`0s` = never)
/// - `reconnect`: delay policy for re-establishing the inbound event stream
/// - `subscriber_capacity`: override for every subscriber queue (`0` = per-subscriber default)
///
/// ## Notes
/// All fields are public. Prefer the helper accessors to avoid sprinkling
/// sentinel checks (`0`) across the codebase.
#[derive(Clone, Debug)]
pub struct Config {
    /// Capacity of the runtime event bus broadcast channel.
    ///
    /// Slow receivers lagging behind more than `bus_capacity` events skip older items.
    pub bus_capacity: usize,

    /// Default artificial delay applied before completion callbacks.
    ///
    /// Models transport latency. A manager replaces it with the delay carried by
    /// the transport's init reply.
    pub callback_delay: Duration,

    /// Maximum age of an incomplete multi-part message.
    ///
    /// - `Duration::ZERO` = keep partial messages forever (missing segments are waited on indefinitely)
    /// - `> 0` = assemblies older than this are evicted on the next ingest
    pub assembly_ttl: Duration,

    /// Delay policy between event-source connection attempts.
    pub reconnect: ReconnectPolicy,

    /// Queue capacity forced on every subscriber (`0` = let each subscriber decide).
    pub subscriber_capacity: usize,
}

impl Config {
    /// Returns the assembly TTL as an `Option`.
    ///
    /// - `None` → never evict
    /// - `Some(d)` → evict assemblies older than `d`
    #[inline]
    pub fn assembly_ttl(&self) -> Option<Duration> {
        if self.assembly_ttl == Duration::ZERO {
            None
        } else {
            Some(self.assembly_ttl)
        }
    }

    /// Returns the subscriber queue capacity override as an `Option`.
    #[inline]
    pub fn subscriber_capacity(&self) -> Option<usize> {
        if self.subscriber_capacity == 0 {
            None
        } else {
            Some(self.subscriber_capacity)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `bus_capacity = 1024`
    /// - `callback_delay = 100ms`
    /// - `assembly_ttl = 0s` (never evict)
    /// - `reconnect = ReconnectPolicy::default()` (constant 100ms)
    /// - `subscriber_capacity = 0` (per-subscriber default)
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            callback_delay: Duration::from_millis(100),
            assembly_ttl: Duration::ZERO,
            reconnect: ReconnectPolicy::default(),
            subscriber_capacity: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_assemblies_forever() {
        let cfg = Config::default();
        assert_eq!(cfg.assembly_ttl(), None);
        assert_eq!(cfg.callback_delay, Duration::from_millis(100));
    }

    #[test]
    fn sentinels() {
        let cfg = Config {
            assembly_ttl: Duration::from_secs(30),
            subscriber_capacity: 8,
            bus_capacity: 0,
            ..Config::default()
        };
        assert_eq!(cfg.assembly_ttl(), Some(Duration::from_secs(30)));
        assert_eq!(cfg.subscriber_capacity(), Some(8));
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
