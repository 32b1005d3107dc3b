//! The Event Bus: monotonic sequencing, bounded fan-out, and retention for
//! the annotation broker's event log. Durable storage of event rows lives in
//! whichever Store backing is active; this crate only knows the backing
//! through the `EventLog` contract from `agentation-core`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration as StdDuration;

use agentation_core::{CoreError, Event, EventLog, EventPayload, EventType};
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const DEFAULT_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_RETENTION_DAYS: i64 = 7;
const SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(3600);

struct Subscriber {
    session_filter: Option<String>,
    tx: mpsc::Sender<Event>,
}

pub struct EventBus {
    sequence: AtomicU64,
    next_sub_id: AtomicU64,
    subscribers: parking_lot::RwLock<HashMap<u64, Subscriber>>,
    log: Arc<dyn EventLog>,
    retention: chrono::Duration,
    channel_capacity: usize,
}

/// Cancels the subscription on drop. Dropping the paired `Receiver` is
/// sufficient too (a dead channel is pruned on the next publish); this
/// handle exists mainly so callers can cancel without waiting for that.
pub struct SubscriptionHandle {
    id: u64,
    bus: Weak<EventBus>,
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

impl EventBus {
    pub fn new(log: Arc<dyn EventLog>, retention_days: i64) -> Arc<Self> {
        Self::with_capacity(log, retention_days, DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(log: Arc<dyn EventLog>, retention_days: i64, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            sequence: AtomicU64::new(0),
            next_sub_id: AtomicU64::new(0),
            subscribers: parking_lot::RwLock::new(HashMap::new()),
            log,
            retention: chrono::Duration::days(retention_days.max(1)),
            channel_capacity: capacity,
        })
    }

    pub fn retention_days_default() -> i64 {
        DEFAULT_RETENTION_DAYS
    }

    /// Assigns the next sequence number, persists the event, and fans it out
    /// to matching subscribers — the single place sequence numbers originate.
    pub async fn publish(
        &self,
        event_type: EventType,
        session_id: impl Into<String>,
        payload: EventPayload,
    ) -> Result<Event, CoreError> {
        let event = Event {
            event_type,
            timestamp: Utc::now(),
            session_id: session_id.into(),
            sequence: self.next_sequence(),
            payload,
        };

        self.log.append_event(&event).await?;
        self.fan_out(&event);
        Ok(event)
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn fan_out(&self, event: &Event) {
        let mut dead = Vec::new();
        {
            let subs = self.subscribers.read();
            for (id, sub) in subs.iter() {
                if let Some(filter) = &sub.session_filter {
                    if filter != &event.session_id {
                        continue;
                    }
                }
                if sub.tx.try_send(event.clone()).is_err() {
                    dead.push(*id);
                }
            }
        }
        if !dead.is_empty() {
            let mut subs = self.subscribers.write();
            for id in dead {
                subs.remove(&id);
            }
        }
    }

    fn subscribe_internal(
        self: &Arc<Self>,
        session_filter: Option<String>,
    ) -> (SubscriptionHandle, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let id = self.next_sub_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers
            .write()
            .insert(id, Subscriber { session_filter, tx });
        (
            SubscriptionHandle {
                id,
                bus: Arc::downgrade(self),
            },
            rx,
        )
    }

    /// All events, regardless of session — used by the domain-filtered SSE
    /// stream and by outbound webhook delivery.
    pub fn subscribe(self: &Arc<Self>) -> (SubscriptionHandle, mpsc::Receiver<Event>) {
        self.subscribe_internal(None)
    }

    pub fn subscribe_session(
        self: &Arc<Self>,
        session_id: impl Into<String>,
    ) -> (SubscriptionHandle, mpsc::Receiver<Event>) {
        self.subscribe_internal(Some(session_id.into()))
    }

    fn unsubscribe(&self, id: u64) {
        self.subscribers.write().remove(&id);
    }

    pub async fn replay_since(
        &self,
        session_id: &str,
        last_sequence: u64,
        limit: usize,
    ) -> Result<Vec<Event>, CoreError> {
        self.log.events_since(session_id, last_sequence, limit).await
    }

    /// Spawns the hourly-or-more-often retention sweeper described in
    /// SPEC_FULL.md §4.2. The returned handle is for the supervisor's
    /// shutdown path; dropping it does not stop the sweep (use `abort()`).
    pub fn spawn_retention_sweeper(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                let cutoff = Utc::now() - self.retention;
                match self.log.delete_events_before(cutoff).await {
                    Ok(0) => {}
                    Ok(deleted) => {
                        tracing::info!(deleted, "retention sweep removed events");
                    }
                    Err(error) => {
                        tracing::warn!(%error, "retention sweep failed");
                    }
                }
            }
        })
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentation_core::Session;
    use async_trait::async_trait;
    use chrono::DateTime;

    #[derive(Default)]
    struct MemoryLog(parking_lot::Mutex<Vec<Event>>);

    #[async_trait]
    impl EventLog for MemoryLog {
        async fn append_event(&self, event: &Event) -> Result<(), CoreError> {
            self.0.lock().push(event.clone());
            Ok(())
        }

        async fn events_since(
            &self,
            session_id: &str,
            last_sequence: u64,
            limit: usize,
        ) -> Result<Vec<Event>, CoreError> {
            Ok(self
                .0
                .lock()
                .iter()
                .filter(|e| e.session_id == session_id && e.sequence > last_sequence)
                .take(limit)
                .cloned()
                .collect())
        }

        async fn delete_events_before(&self, cutoff: DateTime<Utc>) -> Result<u64, CoreError> {
            let mut log = self.0.lock();
            let before = log.len();
            log.retain(|e| e.timestamp >= cutoff);
            Ok((before - log.len()) as u64)
        }
    }

    fn fake_session(id: &str) -> Session {
        Session {
            id: id.to_string(),
            url: "http://localhost:3000".to_string(),
            project_id: None,
            status: agentation_core::SessionStatus::Active,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn sequence_is_strictly_increasing() {
        let bus = EventBus::new(Arc::new(MemoryLog::default()), 7);
        let e1 = bus
            .publish(
                EventType::SessionCreated,
                "s1",
                EventPayload::Session(fake_session("s1")),
            )
            .await
            .unwrap();
        let e2 = bus
            .publish(
                EventType::SessionCreated,
                "s2",
                EventPayload::Session(fake_session("s2")),
            )
            .await
            .unwrap();
        assert_eq!(e1.sequence, 1);
        assert_eq!(e2.sequence, 2);
    }

    #[tokio::test]
    async fn session_subscription_filters_other_sessions() {
        let bus = EventBus::new(Arc::new(MemoryLog::default()), 7);
        let (_handle, mut rx) = bus.subscribe_session("s1");

        bus.publish(
            EventType::SessionCreated,
            "s2",
            EventPayload::Session(fake_session("s2")),
        )
        .await
        .unwrap();
        bus.publish(
            EventType::SessionCreated,
            "s1",
            EventPayload::Session(fake_session("s1")),
        )
        .await
        .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.session_id, "s1");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn global_subscription_sees_every_session() {
        let bus = EventBus::new(Arc::new(MemoryLog::default()), 7);
        let (_handle, mut rx) = bus.subscribe();

        bus.publish(
            EventType::SessionCreated,
            "s1",
            EventPayload::Session(fake_session("s1")),
        )
        .await
        .unwrap();
        bus.publish(
            EventType::SessionCreated,
            "s2",
            EventPayload::Session(fake_session("s2")),
        )
        .await
        .unwrap();

        assert_eq!(rx.recv().await.unwrap().session_id, "s1");
        assert_eq!(rx.recv().await.unwrap().session_id, "s2");
    }

    #[tokio::test]
    async fn overflowing_subscriber_is_dropped_not_blocking() {
        let bus = EventBus::with_capacity(Arc::new(MemoryLog::default()), 7, 1);
        let (_handle, _rx) = bus.subscribe(); // never drained -> fills immediately

        for i in 0..5 {
            bus.publish(
                EventType::SessionCreated,
                format!("s{i}"),
                EventPayload::Session(fake_session(&format!("s{i}"))),
            )
            .await
            .unwrap();
        }

        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn unsubscribe_via_dropped_handle_stops_delivery() {
        let bus = EventBus::new(Arc::new(MemoryLog::default()), 7);
        let (handle, _rx) = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(handle);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn replay_since_returns_only_newer_events_for_session() {
        let bus = EventBus::new(Arc::new(MemoryLog::default()), 7);
        for i in 0..3u8 {
            bus.publish(
                EventType::SessionCreated,
                "s1",
                EventPayload::Session(fake_session("s1")),
            )
            .await
            .unwrap();
            let _ = i;
        }

        let replay = bus.replay_since("s1", 1, 10).await.unwrap();
        assert_eq!(replay.len(), 2);
        assert!(replay.iter().all(|e| e.sequence > 1));
    }
}
