//! In-process counters for events that are otherwise indistinguishable from
//! normal traffic (unknown-order webhooks, duplicate deliveries, decode failures).

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct Metrics {
    webhooks_received: AtomicU64,
    webhooks_rejected: AtomicU64,
    unknown_orders: AtomicU64,
    duplicate_deliveries: AtomicU64,
    ignored_transitions: AtomicU64,
    licenses_issued: AtomicU64,
    notify_failures: AtomicU64,
    decode_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Counter {
    WebhooksReceived,
    WebhooksRejected,
    UnknownOrders,
    DuplicateDeliveries,
    IgnoredTransitions,
    LicensesIssued,
    NotifyFailures,
    DecodeFailures,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub webhooks_received: u64,
    pub webhooks_rejected: u64,
    pub unknown_orders: u64,
    pub duplicate_deliveries: u64,
    pub ignored_transitions: u64,
    pub licenses_issued: u64,
    pub notify_failures: u64,
    pub decode_failures: u64,
}

impl Metrics {
    fn counter(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::WebhooksReceived => &self.webhooks_received,
            Counter::WebhooksRejected => &self.webhooks_rejected,
            Counter::UnknownOrders => &self.unknown_orders,
            Counter::DuplicateDeliveries => &self.duplicate_deliveries,
            Counter::IgnoredTransitions => &self.ignored_transitions,
            Counter::LicensesIssued => &self.licenses_issued,
            Counter::NotifyFailures => &self.notify_failures,
            Counter::DecodeFailures => &self.decode_failures,
        }
    }

    pub fn incr(&self, counter: Counter) {
        self.counter(counter).fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counter(counter).load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            webhooks_received: self.get(Counter::WebhooksReceived),
            webhooks_rejected: self.get(Counter::WebhooksRejected),
            unknown_orders: self.get(Counter::UnknownOrders),
            duplicate_deliveries: self.get(Counter::DuplicateDeliveries),
            ignored_transitions: self.get(Counter::IgnoredTransitions),
            licenses_issued: self.get(Counter::LicensesIssued),
            notify_failures: self.get(Counter::NotifyFailures),
            decode_failures: self.get(Counter::DecodeFailures),
        }
    }
}
