//! In-memory doubles for the service's external seams.

use live_users_core::environment::{AnalyticsError, IdGenerator, PresenceAnalytics, SessionSample};
use live_users_core::event::SerializedEvent;
use live_users_core::event_bus::{EventBus, EventBusError, EventStream};
use live_users_core::slug::{SlugService, SlugServiceError};
use live_users_core::{Slug, UserId};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

/// Deterministic id generator: `user-1`, `user-2`, ...
#[derive(Debug, Default)]
pub struct SequentialIds {
    counter: AtomicU64,
}

impl SequentialIds {
    /// Create a generator starting at `user-1`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn generate(&self) -> UserId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        UserId::new(format!("user-{n}"))
    }
}

/// In-memory event bus that records every publish and fans events out to
/// per-topic subscribers.
pub struct InMemoryEventBus {
    published: Mutex<Vec<(String, SerializedEvent)>>,
    topics: Mutex<HashMap<String, broadcast::Sender<SerializedEvent>>>,
    fail_publish: AtomicBool,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            topics: Mutex::new(HashMap::new()),
            fail_publish: AtomicBool::new(false),
        }
    }

    /// Make every subsequent publish fail.
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Everything published to `topic`, in publish order.
    #[must_use]
    pub fn published_on(&self, topic: &str) -> Vec<SerializedEvent> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, e)| e.clone())
            .collect()
    }

    /// The event type tags published to `topic`, in publish order.
    #[must_use]
    pub fn event_types_on(&self, topic: &str) -> Vec<String> {
        self.published_on(topic)
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<SerializedEvent> {
        self.topics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(256).0)
            .clone()
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        event: SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        Box::pin(async move {
            if self.fail_publish.load(Ordering::SeqCst) {
                return Err(EventBusError::Publish {
                    topic,
                    reason: "injected failure".to_string(),
                });
            }
            let _ = self.sender_for(&topic).send(event.clone());
            self.published
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((topic, event));
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topic: &str,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let mut rx = self.sender_for(topic).subscribe();
        Box::pin(async move {
            let stream = async_stream::stream! {
                loop {
                    match rx.recv().await {
                        Ok(event) => yield Ok(event),
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            };
            Ok(Box::pin(stream) as EventStream)
        })
    }
}

#[derive(Default)]
struct SlugState {
    counter: u64,
    taken: HashMap<Slug, UserId>,
    redirects: HashMap<Slug, Slug>,
}

/// In-memory slug service tracking claims and redirects, with failure
/// injection per step.
#[derive(Default)]
pub struct InMemorySlugService {
    state: Mutex<SlugState>,
    fail_create: AtomicBool,
    fail_take: AtomicBool,
    fail_redirect: AtomicBool,
}

impl InMemorySlugService {
    /// Create an empty slug service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent create fail.
    pub fn fail_creates(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent take fail.
    pub fn fail_takes(&self, fail: bool) {
        self.fail_take.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent redirect fail.
    pub fn fail_redirects(&self, fail: bool) {
        self.fail_redirect.store(fail, Ordering::SeqCst);
    }

    /// Follow the redirect chain from `slug` to whatever it currently
    /// resolves to.
    #[must_use]
    pub fn resolve(&self, slug: &Slug) -> Slug {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut current = slug.clone();
        let mut hops = 0;
        while let Some(next) = state.redirects.get(&current) {
            current = next.clone();
            hops += 1;
            if hops > state.redirects.len() {
                break;
            }
        }
        current
    }

    /// Slugs taken by `user` that are not redirected away, i.e. the user's
    /// live handles.
    #[must_use]
    pub fn live_slugs_for(&self, user: &UserId) -> Vec<Slug> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .taken
            .iter()
            .filter(|(slug, owner)| *owner == user && !state.redirects.contains_key(slug))
            .map(|(slug, _)| slug.clone())
            .collect()
    }

    /// Total number of created slugs, including orphaned reservations.
    #[must_use]
    pub fn created_count(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .counter
    }
}

impl SlugService for InMemorySlugService {
    fn create(
        &self,
        group: &str,
        _user: &UserId,
    ) -> Pin<Box<dyn Future<Output = Result<Slug, SlugServiceError>> + Send + '_>> {
        let group = group.to_string();
        Box::pin(async move {
            if self.fail_create.load(Ordering::SeqCst) {
                return Err(SlugServiceError::Unavailable("injected failure".to_string()));
            }
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.counter += 1;
            Ok(Slug::new(format!("{group}-{}", state.counter)))
        })
    }

    fn take(
        &self,
        _group: &str,
        slug: &Slug,
        user: &UserId,
    ) -> Pin<Box<dyn Future<Output = Result<(), SlugServiceError>> + Send + '_>> {
        let slug = slug.clone();
        let user = user.clone();
        Box::pin(async move {
            if self.fail_take.load(Ordering::SeqCst) {
                return Err(SlugServiceError::Take {
                    slug,
                    reason: "injected failure".to_string(),
                });
            }
            self.state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .taken
                .insert(slug, user);
            Ok(())
        })
    }

    fn redirect(
        &self,
        _group: &str,
        from: &Slug,
        to: &Slug,
    ) -> Pin<Box<dyn Future<Output = Result<(), SlugServiceError>> + Send + '_>> {
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move {
            if self.fail_redirect.load(Ordering::SeqCst) {
                return Err(SlugServiceError::Redirect {
                    from,
                    to,
                    reason: "injected failure".to_string(),
                });
            }
            self.state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .redirects
                .insert(from, to);
            Ok(())
        })
    }
}

/// Analytics sink that records every sample, with failure injection.
#[derive(Default)]
pub struct RecordingAnalytics {
    samples: Mutex<Vec<SessionSample>>,
    fail: AtomicBool,
}

impl RecordingAnalytics {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent record fail.
    pub fn fail_records(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Everything recorded so far.
    #[must_use]
    pub fn samples(&self) -> Vec<SessionSample> {
        self.samples
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PresenceAnalytics for RecordingAnalytics {
    fn record_session(
        &self,
        sample: SessionSample,
    ) -> Pin<Box<dyn Future<Output = Result<(), AnalyticsError>> + Send + '_>> {
        Box::pin(async move {
            if self.fail.load(Ordering::SeqCst) {
                return Err(AnalyticsError::Sink("injected failure".to_string()));
            }
            self.samples
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(sample);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn bus_delivers_to_subscribers_and_keeps_a_log() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.subscribe("user-events").await.unwrap();

        let event = SerializedEvent::new("UserCreated.v1".to_string(), vec![1, 2, 3], None);
        bus.publish("user-events", event).await.unwrap();

        let received = stream.next().await.unwrap().unwrap();
        assert_eq!(received.event_type, "UserCreated.v1");
        assert_eq!(bus.event_types_on("user-events"), vec!["UserCreated.v1"]);
        assert!(bus.published_on("session-events").is_empty());
    }

    #[tokio::test]
    async fn failed_publishes_are_not_logged() {
        let bus = InMemoryEventBus::new();
        bus.fail_publishes(true);
        let event = SerializedEvent::new("UserDeleted.v1".to_string(), Vec::new(), None);
        assert!(bus.publish("user-events", event).await.is_err());
        assert!(bus.published_on("user-events").is_empty());
    }

    #[tokio::test]
    async fn slug_service_resolves_redirect_chains() {
        let slugs = InMemorySlugService::new();
        let user = UserId::new("u1".to_string());

        let first = slugs.create("user", &user).await.unwrap();
        slugs.take("user", &first, &user).await.unwrap();
        let second = slugs.create("user", &user).await.unwrap();
        slugs.take("user", &second, &user).await.unwrap();
        slugs.redirect("user", &first, &second).await.unwrap();

        assert_eq!(slugs.resolve(&first), second);
        assert_eq!(slugs.live_slugs_for(&user), vec![second]);
        assert_eq!(slugs.created_count(), 2);
    }
}

