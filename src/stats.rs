//! Monotonic connection/traffic counters, exported as an immutable
//! snapshot. Plain atomics, no metrics crate -- the counters here are
//! simple enough that `std::sync::atomic` is the idiomatic choice.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use time::OffsetDateTime;

#[derive(Debug, Default)]
pub struct Statistics {
    alive_connections: AtomicI64,
    pooled_buffers: AtomicI64,
    lifetime_connects: AtomicU64,
    lifetime_hits: AtomicU64,
    waiting_for_header: AtomicI64,
    serving_http_body: AtomicI64,
    serving_websockets: AtomicI64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    pub alive_connections: i64,
    pub pooled_buffers: i64,
    pub lifetime_connects: u64,
    pub lifetime_hits: u64,
    pub waiting_for_header: i64,
    pub serving_http_body: i64,
    pub serving_websockets: i64,
    pub taken_at_unix_seconds: i64,
}

macro_rules! counter_ops {
    ($incr:ident, $decr:ident, $field:ident) => {
        pub fn $incr(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }

        pub fn $decr(&self) {
            self.$field.fetch_sub(1, Ordering::Relaxed);
        }
    };
}

impl Statistics {
    pub fn new() -> Self {
        Statistics::default()
    }

    counter_ops!(connection_opened, connection_closed, alive_connections);
    counter_ops!(buffer_pooled, buffer_unpooled, pooled_buffers);
    counter_ops!(enter_waiting_for_header, leave_waiting_for_header, waiting_for_header);
    counter_ops!(enter_serving_http_body, leave_serving_http_body, serving_http_body);
    counter_ops!(enter_serving_websocket, leave_serving_websocket, serving_websockets);

    /// Used by the accept loop's overload guard; a plain relaxed read,
    /// same staleness tolerance as `snapshot`.
    pub fn alive_connections(&self) -> i64 {
        self.alive_connections.load(Ordering::Relaxed)
    }

    pub fn record_connect(&self) {
        self.lifetime_connects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hit(&self) {
        self.lifetime_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies every field without taking a lock; readers accept per-field
    /// (but not cross-field) staleness.
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            alive_connections: self.alive_connections.load(Ordering::Relaxed),
            pooled_buffers: self.pooled_buffers.load(Ordering::Relaxed),
            lifetime_connects: self.lifetime_connects.load(Ordering::Relaxed),
            lifetime_hits: self.lifetime_hits.load(Ordering::Relaxed),
            waiting_for_header: self.waiting_for_header.load(Ordering::Relaxed),
            serving_http_body: self.serving_http_body.load(Ordering::Relaxed),
            serving_websockets: self.serving_websockets.load(Ordering::Relaxed),
            taken_at_unix_seconds: OffsetDateTime::now_utc().unix_timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment_and_decrement() {
        let s = Statistics::new();
        s.connection_opened();
        s.connection_opened();
        s.connection_closed();
        assert_eq!(s.snapshot().alive_connections, 1);
    }

    #[test]
    fn lifetime_counters_only_go_up() {
        let s = Statistics::new();
        s.record_connect();
        s.record_connect();
        s.record_hit();
        let snap = s.snapshot();
        assert_eq!(snap.lifetime_connects, 2);
        assert_eq!(snap.lifetime_hits, 1);
    }
}
