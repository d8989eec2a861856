use crate::error::{constants, ProtocolError, Result};
use crate::protocol::event::{Event, EventKind};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};

type HandlerFn = dyn Fn(&Event) + Send + Sync + 'static;

#[derive(Default)]
struct Handlers {
    by_kind: HashMap<EventKind, Vec<Arc<HandlerFn>>>,
    any: Vec<Arc<HandlerFn>>,
}

/// Event bus keyed by event shape.
///
/// `fire` snapshots the matching handlers under the read lock and calls them
/// after releasing it, so a handler may register further handlers; those
/// only see later events. Handlers run synchronously in registration order,
/// shape-specific ones first, then catch-alls.
#[derive(Clone, Default)]
pub struct Dispatcher {
    handlers: Arc<RwLock<Handlers>>,
}

/// Non-owning handle, for handlers that need to fire follow-up events
/// without keeping their own dispatcher alive.
#[derive(Clone)]
pub struct WeakDispatcher {
    handlers: Weak<RwLock<Handlers>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<K, F>(&self, kind: K, handler: F) -> Result<()>
    where
        K: Into<EventKind>,
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.write().map_err(|_| {
            ProtocolError::Custom(constants::ERR_DISPATCHER_WRITE_LOCK.to_string())
        })?;

        handlers
            .by_kind
            .entry(kind.into())
            .or_default()
            .push(Arc::new(handler));
        Ok(())
    }

    /// Register a handler for every event.
    pub fn on_any<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.write().map_err(|_| {
            ProtocolError::Custom(constants::ERR_DISPATCHER_WRITE_LOCK.to_string())
        })?;

        handlers.any.push(Arc::new(handler));
        Ok(())
    }

    /// Invoke every handler for `event`; returns how many ran.
    pub fn fire(&self, event: &Event) -> usize {
        let matched: Vec<Arc<HandlerFn>> = {
            // Handlers never run under the lock, so poisoning cannot leave
            // the map half-updated.
            let handlers = self
                .handlers
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            handlers
                .by_kind
                .get(&event.kind())
                .into_iter()
                .flatten()
                .chain(handlers.any.iter())
                .cloned()
                .collect()
        };

        for handler in &matched {
            handler(event);
        }
        matched.len()
    }

    pub fn downgrade(&self) -> WeakDispatcher {
        WeakDispatcher {
            handlers: Arc::downgrade(&self.handlers),
        }
    }
}

impl WeakDispatcher {
    pub fn upgrade(&self) -> Option<Dispatcher> {
        self.handlers.upgrade().map(|handlers| Dispatcher { handlers })
    }

    /// Fire through the dispatcher if it is still alive.
    pub fn fire(&self, event: &Event) -> usize {
        self.upgrade().map_or(0, |d| d.fire(event))
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}
