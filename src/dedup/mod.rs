#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::DedupConfig;

/// Decision for one delivery attempt of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// First delivery inside the window; the caller should process it.
    FirstSeen,
    /// A redelivery of an event already admitted; acknowledge and drop.
    Duplicate,
}

/// An inbound event as delivered by the messaging platform, possibly more
/// than once for the same `event_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub event_id: String,
    pub text: String,
    pub channel: String,
    pub ts: String,
    pub thread_ts: Option<String>,
}

impl InboundEvent {
    /// The timestamp replies should thread under.
    #[inline]
    pub fn reply_thread_ts(&self) -> &str {
        self.thread_ts.as_deref().unwrap_or(&self.ts)
    }
}

/// Admits each event id once per TTL window.
///
/// The check and the claim are a single operation under one lock, so two
/// concurrent deliveries of the same id can never both be admitted.
#[derive(Debug)]
pub struct DedupGate {
    ttl: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl DedupGate {
    #[inline]
    pub fn new(config: &DedupConfig) -> Self {
        Self {
            ttl: Duration::from_secs(config.ttl_seconds),
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Atomically claim an event id. Expired entries are purged on the way
    /// through, so the map stays bounded by recent traffic.
    #[inline]
    pub fn admit(&self, event_id: &str) -> Admission {
        let now = Instant::now();
        let mut seen = self
            .seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        seen.retain(|_, admitted_at| now.duration_since(*admitted_at) < self.ttl);

        match seen.entry(event_id.to_string()) {
            Entry::Occupied(_) => Admission::Duplicate,
            Entry::Vacant(slot) => {
                slot.insert(now);
                Admission::FirstSeen
            }
        }
    }
}

/// Run `processor` for an event exactly once per TTL window. Always returns
/// normally so the caller can acknowledge the delivery either way; retrying
/// a duplicate would defeat the gate.
#[inline]
pub fn handle_event<F>(gate: &DedupGate, event: &InboundEvent, processor: F) -> Admission
where
    F: FnOnce(&InboundEvent),
{
    match gate.admit(&event.event_id) {
        Admission::FirstSeen => {
            debug!("Processing event {}", event.event_id);
            processor(event);
            Admission::FirstSeen
        }
        Admission::Duplicate => {
            debug!("Dropping duplicate delivery of event {}", event.event_id);
            Admission::Duplicate
        }
    }
}
