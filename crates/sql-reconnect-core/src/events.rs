//! Event system for the reconnecting layer.
//!
//! Connection managers and statements emit events (connection lost,
//! reconnected, retries exhausted, statement recreated) to the listeners
//! registered on their connection's configuration. A listener either sees
//! every event or subscribes to a fixed set of event types.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

/// Trait for events emitted by the reconnecting layer.
pub trait ReconnectEvent: Send + Sync + fmt::Debug {
    /// Returns the kind of event (e.g. "connection_lost").
    fn event_type(&self) -> &'static str;

    /// Returns when this event occurred.
    fn timestamp(&self) -> Instant;

    /// Returns the name of the connection that emitted this event.
    fn connection_name(&self) -> &str;
}

/// Trait for listening to events.
pub trait EventListener<E: ReconnectEvent>: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &E);
}

/// Shared, type-erased event listener.
pub type BoxedEventListener<E> = Arc<dyn EventListener<E>>;

struct Subscription<E: ReconnectEvent> {
    /// `None` means every event type.
    event_types: Option<Arc<[&'static str]>>,
    listener: BoxedEventListener<E>,
}

impl<E: ReconnectEvent> Subscription<E> {
    fn wants(&self, event: &E) -> bool {
        match &self.event_types {
            None => true,
            Some(types) => types.contains(&event.event_type()),
        }
    }
}

impl<E: ReconnectEvent> Clone for Subscription<E> {
    fn clone(&self) -> Self {
        Self {
            event_types: self.event_types.clone(),
            listener: Arc::clone(&self.listener),
        }
    }
}

/// The listeners registered for one connection, in registration order.
pub struct EventListeners<E: ReconnectEvent> {
    connection: String,
    subscriptions: Vec<Subscription<E>>,
}

impl<E: ReconnectEvent> EventListeners<E> {
    /// Creates an empty listener set for an unnamed connection.
    pub fn new() -> Self {
        Self::for_connection("<unnamed>")
    }

    /// Creates an empty listener set owned by the named connection.
    pub fn for_connection(connection: impl Into<String>) -> Self {
        Self {
            connection: connection.into(),
            subscriptions: Vec::new(),
        }
    }

    /// Name of the connection these listeners belong to.
    pub fn connection(&self) -> &str {
        &self.connection
    }

    /// Renames the owning connection.
    pub fn set_connection(&mut self, connection: impl Into<String>) {
        self.connection = connection.into();
    }

    /// Registers a listener for every event type.
    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.subscriptions.push(Subscription {
            event_types: None,
            listener: Arc::new(listener),
        });
    }

    /// Registers a listener that only sees the given event types.
    pub fn add_for<L>(&mut self, event_types: &[&'static str], listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.subscriptions.push(Subscription {
            event_types: Some(event_types.into()),
            listener: Arc::new(listener),
        });
    }

    /// Delivers the event to every subscribed listener and returns how many
    /// received it.
    ///
    /// A panicking listener is contained so the rest still see the event and
    /// the database call that emitted it is not aborted. It does not count
    /// as a delivery.
    pub fn emit(&self, event: &E) -> usize {
        let mut delivered = 0;
        for subscription in self.subscriptions.iter().filter(|s| s.wants(event)) {
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                subscription.listener.on_event(event);
            }));

            match outcome {
                Ok(()) => delivered += 1,
                Err(_) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        connection = %self.connection,
                        event = event.event_type(),
                        "event listener panicked"
                    );
                }
            }
        }
        delivered
    }

    /// Returns true if nothing is listening.
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Returns the number of listeners.
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }
}

impl<E: ReconnectEvent> Clone for EventListeners<E> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            subscriptions: self.subscriptions.clone(),
        }
    }
}

impl<E: ReconnectEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ReconnectEvent> fmt::Debug for EventListeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListeners")
            .field("connection", &self.connection)
            .field("len", &self.subscriptions.len())
            .finish()
    }
}

/// A listener backed by a closure.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _event: PhantomData<fn(&E)>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    /// Wraps the closure as a listener.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _event: PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: ReconnectEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}
