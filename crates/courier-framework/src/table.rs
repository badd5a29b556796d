//! The registration table.
//!
//! Registrations are kept in registration order and scanned newest first, so
//! a later registration shadows an earlier one for the events both accept.
//! Registrations are never removed; they can only be disabled.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, trace};

use crate::error::{DispatchError, DispatchResult};
use crate::handler::BoxedCallback;
use crate::registration::{HandlerId, HandlerRegistration, Verdict};
use courier_core::{ChatId, Event};

/// A registration and its mutable enabled flag.
struct Entry {
    registration: HandlerRegistration,
    enabled: bool,
}

impl fmt::Display for Entry {
    /// Formats as `<Registration: name (Async, Enabled)>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.registration.rule().is_concurrent() {
            "Async"
        } else {
            "Sync"
        };
        let state = if self.enabled { "Enabled" } else { "Disabled" };
        write!(
            f,
            "<Registration: {} ({mode}, {state})>",
            self.registration.name()
        )
    }
}

/// The handler selected for an event.
#[derive(Clone)]
pub struct Matched {
    /// Handle of the matched registration.
    pub id: HandlerId,
    /// Name of the matched registration.
    pub name: Arc<str>,
    /// Handler to run.
    pub callback: BoxedCallback,
    /// Whether the handler runs on its own task.
    pub concurrent: bool,
}

impl fmt::Debug for Matched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matched")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("concurrent", &self.concurrent)
            .finish_non_exhaustive()
    }
}

/// Ordered, shared collection of handler registrations.
///
/// Matching takes a read lock; registering and toggling take the write lock.
#[derive(Default)]
pub struct RegistrationTable {
    entries: RwLock<Vec<Entry>>,
}

impl RegistrationTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a registration and returns its handle.
    pub fn register(&self, registration: HandlerRegistration) -> HandlerId {
        let id = registration.id();
        let enabled = registration.rule().enabled_by_default();
        let entry = Entry {
            registration,
            enabled,
        };
        debug!(handler = %id, "Registered {entry}");
        self.entries.write().push(entry);
        id
    }

    /// Finds the handler for an event.
    ///
    /// Registrations are checked newest first. The first [`Verdict::Match`]
    /// wins and the first [`Verdict::Halt`] ends the scan with no handler.
    pub fn match_event(&self, event: &Event, self_id: &ChatId) -> Option<Matched> {
        let entries = self.entries.read();
        for entry in entries.iter().rev() {
            let registration = &entry.registration;
            match registration.rule().verdict(entry.enabled, event, self_id) {
                Verdict::Match => {
                    trace!(handler = %registration.id(), name = registration.name(), "Matched");
                    return Some(Matched {
                        id: registration.id(),
                        name: registration.name_arc(),
                        callback: Arc::clone(registration.callback()),
                        concurrent: registration.rule().is_concurrent(),
                    });
                }
                Verdict::Halt => {
                    trace!(handler = %registration.id(), name = registration.name(), "Matching halted");
                    return None;
                }
                Verdict::Skip => {}
            }
        }
        None
    }

    /// Enables one registration.
    pub fn enable(&self, id: HandlerId) -> DispatchResult<()> {
        self.set_enabled(id, true)
    }

    /// Disables one registration.
    pub fn disable(&self, id: HandlerId) -> DispatchResult<()> {
        self.set_enabled(id, false)
    }

    /// Enables every registration.
    pub fn enable_all(&self) {
        self.set_all(true);
    }

    /// Disables every registration.
    pub fn disable_all(&self) {
        self.set_all(false);
    }

    fn set_enabled(&self, id: HandlerId, enabled: bool) -> DispatchResult<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .iter_mut()
            .find(|entry| entry.registration.id() == id)
            .ok_or(DispatchError::UnknownHandler(id))?;
        entry.enabled = enabled;
        info!("{entry}");
        Ok(())
    }

    fn set_all(&self, enabled: bool) {
        let mut entries = self.entries.write();
        for entry in entries.iter_mut() {
            entry.enabled = enabled;
            info!("{entry}");
        }
    }

    /// Returns whether a registration is enabled, or `None` for unknown handles.
    pub fn is_enabled(&self, id: HandlerId) -> Option<bool> {
        self.entries
            .read()
            .iter()
            .find(|entry| entry.registration.id() == id)
            .map(|entry| entry.enabled)
    }

    /// Returns the handles of enabled registrations, in registration order.
    pub fn enabled_ids(&self) -> Vec<HandlerId> {
        self.ids_where(true)
    }

    /// Returns the handles of disabled registrations, in registration order.
    pub fn disabled_ids(&self) -> Vec<HandlerId> {
        self.ids_where(false)
    }

    fn ids_where(&self, enabled: bool) -> Vec<HandlerId> {
        self.entries
            .read()
            .iter()
            .filter(|entry| entry.enabled == enabled)
            .map(|entry| entry.registration.id())
            .collect()
    }

    /// Returns the number of registrations.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing has been registered.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
