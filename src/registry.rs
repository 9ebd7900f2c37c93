//! Explicit registration of per-event-type handlers.
//!
//! Applications register handlers against event names at construction time
//! and route incoming events through [`HandlerRegistry::dispatch`]. There is
//! no implicit discovery: a handler participates only if it was registered.

use crate::event::EventRecord;
use crate::headers::EventHeader;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Role a registered function plays during dispatch.
///
/// Both kinds are invoked identically; the kind is carried so callers can
/// filter (e.g. run state-maintenance handlers before notification callbacks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum HandlerKind {
    /// Application-level notification callback.
    Callback,
    /// State-maintenance handler.
    Handler,
}

/// A registered event handler.
pub type EventHandler = Arc<dyn Fn(&EventRecord) + Send + Sync>;

/// Table mapping event names to the handlers registered for them.
///
/// Multiple handlers may be registered for one event name; dispatch invokes
/// them in registration order. Events whose name has no registration are
/// ignored.
#[derive(Default)]
pub struct HandlerRegistry {
    table: RwLock<HashMap<String, Vec<(HandlerKind, EventHandler)>>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events named `event_name`.
    pub fn register<F>(&self, event_name: impl Into<String>, kind: HandlerKind, handler: F)
    where
        F: Fn(&EventRecord) + Send + Sync + 'static,
    {
        self.table
            .write()
            .entry(event_name.into())
            .or_default()
            .push((kind, Arc::new(handler)));
    }

    /// Whether any handler is registered for `event_name`.
    pub fn has_handlers(&self, event_name: &str) -> bool {
        self.table
            .read()
            .get(event_name)
            .is_some_and(|handlers| !handlers.is_empty())
    }

    /// Handlers registered for `event_name`, in registration order.
    pub fn handlers_for(&self, event_name: &str) -> Vec<(HandlerKind, EventHandler)> {
        self.table
            .read()
            .get(event_name)
            .cloned()
            .unwrap_or_default()
    }

    /// Route `event` to the handlers registered for its `Event-Name`.
    ///
    /// Returns the number of handlers invoked. Events without a name, or
    /// with a name nothing registered for, are dropped silently.
    pub fn dispatch(&self, event: &EventRecord) -> usize {
        let Some(name) = event.header(EventHeader::EventName) else {
            return 0;
        };
        let handlers = self.handlers_for(name);
        for (_, handler) in &handlers {
            handler(event);
        }
        handlers.len()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self
            .table
            .read();
        f.debug_struct("HandlerRegistry")
            .field("event_names", &table.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{EVENT_CHANNEL_ANSWER, EVENT_CHANNEL_CREATE};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(name: &str) -> EventRecord {
        EventRecord::new().with_header("Event-Name", name)
    }

    #[test]
    fn dispatch_routes_by_event_name() {
        let registry = HandlerRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let hits = Arc::clone(&hits);
            registry.register(EVENT_CHANNEL_CREATE, HandlerKind::Handler, move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(registry.dispatch(&event(EVENT_CHANNEL_CREATE)), 1);
        assert_eq!(registry.dispatch(&event(EVENT_CHANNEL_ANSWER)), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn multiple_handlers_run_in_registration_order() {
        let registry = HandlerRegistry::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            registry.register(EVENT_CHANNEL_ANSWER, HandlerKind::Callback, move |_| {
                order
                    .lock()
                    .push(tag);
            });
        }

        assert_eq!(registry.dispatch(&event(EVENT_CHANNEL_ANSWER)), 3);
        assert_eq!(&*order.lock(), &["first", "second", "third"]);
    }

    #[test]
    fn handlers_receive_the_event() {
        let registry = HandlerRegistry::new();
        let seen = Arc::new(parking_lot::Mutex::new(None));
        {
            let seen = Arc::clone(&seen);
            registry.register(EVENT_CHANNEL_CREATE, HandlerKind::Handler, move |e| {
                *seen.lock() = e
                    .header("Unique-ID")
                    .map(str::to_string);
            });
        }

        registry.dispatch(&event(EVENT_CHANNEL_CREATE).with_header("Unique-ID", "U1"));
        assert_eq!(&*seen.lock(), &Some("U1".to_string()));
    }

    #[test]
    fn nameless_event_is_dropped() {
        let registry = HandlerRegistry::new();
        registry.register(EVENT_CHANNEL_CREATE, HandlerKind::Handler, |_| {});
        assert_eq!(registry.dispatch(&EventRecord::new()), 0);
    }

    #[test]
    fn kind_is_queryable() {
        let registry = HandlerRegistry::new();
        registry.register(EVENT_CHANNEL_CREATE, HandlerKind::Handler, |_| {});
        registry.register(EVENT_CHANNEL_CREATE, HandlerKind::Callback, |_| {});

        assert!(registry.has_handlers(EVENT_CHANNEL_CREATE));
        assert!(!registry.has_handlers("CUSTOM"));
        let kinds: Vec<_> = registry
            .handlers_for(EVENT_CHANNEL_CREATE)
            .into_iter()
            .map(|(kind, _)| kind)
            .collect();
        assert_eq!(kinds, [HandlerKind::Handler, HandlerKind::Callback]);
    }
}
