//! The remote-object pattern.
//!
//! A remote stands for one named device on a VRPN server.  Callers register
//! change handlers, then drive the remote by calling its message pump; every
//! report that arrives is handed to every registered handler, inline, on the
//! task that pumped.
//!
//! # Overview
//!
//! - [`Remote`] – the trait every remote implements.
//! - [`AnalogRemote`][crate::analog::AnalogRemote] – `vrpn_Analog` channels.
//! - [`TrackerRemote`][crate::tracker::TrackerRemote] – `vrpn_Tracker`
//!   position/orientation reports.
//! - [`HandlerTable`] / [`Registration`] – shared handler storage; a
//!   registration removes its handler when dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use trackable_types::TrackableError;

/// Identifier of one registered change handler.
pub type HandlerId = u64;

type Handler<R> = Box<dyn FnMut(&R) + Send>;

struct TableInner<R> {
    next_id: HandlerId,
    handlers: Vec<(HandlerId, Handler<R>)>,
}

/// Change handlers of one remote.  Clones share the same table.
///
/// Handlers run while the table is locked, so a handler must not register or
/// unregister handlers on the same table.
pub struct HandlerTable<R> {
    inner: Arc<Mutex<TableInner<R>>>,
}

impl<R> Clone for HandlerTable<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> Default for HandlerTable<R> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(TableInner {
                next_id: 0,
                handlers: Vec::new(),
            })),
        }
    }
}

impl<R: 'static> HandlerTable<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `handler`.  It stays registered until the returned
    /// [`Registration`] is dropped or explicitly unregistered.
    pub fn register<F>(&self, handler: F) -> Registration<R>
    where
        F: FnMut(&R) + Send + 'static,
    {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.handlers.push((id, Box::new(handler)));
        Registration {
            table: self.clone(),
            id,
            active: true,
        }
    }

    /// Remove handler `id`.  Returns `false` if it was not registered.
    pub fn unregister(&self, id: HandlerId) -> bool {
        let mut inner = self.lock();
        let before = inner.handlers.len();
        inner.handlers.retain(|(hid, _)| *hid != id);
        inner.handlers.len() != before
    }

    /// Call every handler with `report`, in registration order.  Returns the
    /// number of handlers invoked.
    pub fn dispatch(&self, report: &R) -> usize {
        let mut inner = self.lock();
        for (_, handler) in inner.handlers.iter_mut() {
            handler(report);
        }
        inner.handlers.len()
    }

    pub fn len(&self) -> usize {
        self.lock().handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A panicking handler must not wedge the remote for later callers.
    fn lock(&self) -> MutexGuard<'_, TableInner<R>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scoped handler registration.
#[must_use = "dropping a Registration unregisters its handler immediately"]
pub struct Registration<R: 'static> {
    table: HandlerTable<R>,
    id: HandlerId,
    active: bool,
}

impl<R: 'static> Registration<R> {
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// Unregister now rather than at drop.
    pub fn unregister(mut self) -> bool {
        self.active = false;
        self.table.unregister(self.id)
    }
}

impl<R: 'static> Drop for Registration<R> {
    fn drop(&mut self) {
        if self.active {
            self.table.unregister(self.id);
        }
    }
}

/// One device on a VRPN server.
///
/// # Contract
///
/// * `pump` – wait until the connection has data, then dispatch every report
///   that is fully buffered.  May return `Ok(0)` when only control traffic or
///   other devices' messages arrived.
///
/// * `mainloop` – dispatch whatever is already buffered without waiting.
#[async_trait]
pub trait Remote: Send {
    /// Payload handed to change handlers.
    type Report: Clone + Send + Sync + 'static;

    /// The `device@host:port` token this remote was opened with.
    fn address(&self) -> &str;

    fn change_handlers(&self) -> &HandlerTable<Self::Report>;

    /// Await readiness, then dispatch buffered reports.  Returns the number
    /// of reports dispatched.
    async fn pump(&mut self) -> Result<usize, TrackableError>;

    /// Dispatch buffered reports without waiting.
    fn mainloop(&mut self) -> Result<usize, TrackableError>;

    fn register_change_handler<F>(&self, handler: F) -> Registration<Self::Report>
    where
        F: FnMut(&Self::Report) + Send + 'static,
        Self: Sized,
    {
        self.change_handlers().register(handler)
    }
}
