//! Event handler registration

use crate::constants::ALL_EVENTS;
use crate::event::Event;
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// A registered event callback. Each invocation runs in its own task and is
/// handed a shared reference to the dispatched event.
pub type EventHandler = Arc<dyn Fn(Arc<Event>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Event-name → ordered handler list.
///
/// Built before a session starts and read-only afterwards. The registered
/// names double as the session's event subscription: registering under
/// [`ALL_EVENTS`] subscribes to everything and supersedes specific names.
///
/// ```no_run
/// use fsswitch::HandlerMap;
///
/// let handlers = HandlerMap::new().on("HEARTBEAT", |event| async move {
///     println!("uptime: {}", event.get("Up-Time", "?"));
/// });
/// ```
#[derive(Clone, Default)]
pub struct HandlerMap {
    entries: HashMap<String, Vec<EventHandler>>,
}

impl HandlerMap {
    /// An empty table. A session with no handlers receives no asynchronous
    /// events at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an event name, appending to any already
    /// registered under the same name.
    pub fn on<F, Fut>(mut self, event_name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: EventHandler = Arc::new(move |event| Box::pin(handler(event)));
        self.entries
            .entry(event_name.into())
            .or_default()
            .push(handler);
        self
    }

    /// Handlers registered for an event name, in registration order.
    pub(crate) fn get(&self, event_name: &str) -> Option<&[EventHandler]> {
        self.entries
            .get(event_name)
            .map(|v| v.as_slice())
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.entries
            .is_empty()
    }

    /// The names to subscribe for. When [`ALL_EVENTS`] is among them it
    /// supersedes everything else — mixing `ALL` with specific names does
    /// not narrow the subscription.
    pub fn subscription_names(&self) -> Vec<String> {
        if self
            .entries
            .contains_key(ALL_EVENTS)
        {
            return vec![ALL_EVENTS.to_string()];
        }
        let mut names: Vec<String> = self
            .entries
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for HandlerMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut counts: Vec<(&str, usize)> = self
            .entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.len()))
            .collect();
        counts.sort();
        f.debug_struct("HandlerMap")
            .field("handlers", &counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn registration_appends_in_order() {
        let map = HandlerMap::new()
            .on("HEARTBEAT", |_| async {})
            .on("HEARTBEAT", |_| async {})
            .on("CHANNEL_ANSWER", |_| async {});

        assert_eq!(
            map.get("HEARTBEAT")
                .unwrap()
                .len(),
            2
        );
        assert_eq!(
            map.get("CHANNEL_ANSWER")
                .unwrap()
                .len(),
            1
        );
        assert!(map
            .get("CHANNEL_HANGUP")
            .is_none());
    }

    #[test]
    fn subscription_names_sorted() {
        let map = HandlerMap::new()
            .on("HEARTBEAT", |_| async {})
            .on("CHANNEL_ANSWER", |_| async {});
        assert_eq!(map.subscription_names(), vec![
            "CHANNEL_ANSWER".to_string(),
            "HEARTBEAT".to_string()
        ]);
    }

    #[test]
    fn all_sentinel_supersedes() {
        let map = HandlerMap::new()
            .on("HEARTBEAT", |_| async {})
            .on(ALL_EVENTS, |_| async {});
        assert_eq!(map.subscription_names(), vec![ALL_EVENTS.to_string()]);
    }

    #[tokio::test]
    async fn handlers_share_the_event() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let map = HandlerMap::new().on("HEARTBEAT", |event| async move {
            assert_eq!(event.get("Event-Name", ""), "HEARTBEAT");
            CALLS.fetch_add(1, Ordering::SeqCst);
        });

        let mut event = Event::new();
        event.set_header("Event-Name", "HEARTBEAT");
        let event = Arc::new(event);

        for handler in map
            .get("HEARTBEAT")
            .unwrap()
        {
            handler(event.clone()).await;
        }
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }
}
