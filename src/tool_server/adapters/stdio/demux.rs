//! Routing table from correlation identifiers to waiting callers.

use crate::tool_server::domain::{CorrelationId, PendingRequest};
use crate::tool_server::protocol::ResponseOutcome;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

/// What the reader hands a waiting caller.
pub(super) type Delivery = Result<ResponseOutcome, Undeliverable>;

/// Reasons a waiter receives no decoded response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Undeliverable {
    /// The line addressed to the request was not a valid response.
    Malformed(String),
    /// The stream ended before a response arrived.
    Lost(String),
}

#[derive(Debug)]
struct Slot {
    request: PendingRequest,
    sender: oneshot::Sender<Delivery>,
}

#[derive(Debug, Default)]
struct TableState {
    slots: HashMap<CorrelationId, Slot>,
    closed: Option<String>,
}

/// Outstanding requests keyed by correlation identifier.
///
/// Once closed, the table rejects new registrations so a request can never
/// wait on a stream nobody reads any more.
#[derive(Debug, Default)]
pub(super) struct PendingTable {
    state: Mutex<TableState>,
}

impl PendingTable {
    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a request and returns the receiver its response lands on.
    ///
    /// Returns the loss reason when the table is already closed.
    pub(super) fn register(
        &self,
        request: PendingRequest,
    ) -> Result<oneshot::Receiver<Delivery>, String> {
        let mut state = self.lock();
        if let Some(reason) = &state.closed {
            return Err(reason.clone());
        }
        let (sender, receiver) = oneshot::channel();
        state.slots.insert(request.id(), Slot { request, sender });
        Ok(receiver)
    }

    /// Hands `delivery` to the waiter for `id`.
    ///
    /// Returns `false` when no caller is waiting, either because the id was
    /// never issued or because the caller already gave up.
    pub(super) fn complete(&self, id: CorrelationId, delivery: Delivery) -> bool {
        let slot = self.lock().slots.remove(&id);
        slot.is_some_and(|found| found.sender.send(delivery).is_ok())
    }

    /// Forgets `id` without delivering anything.
    pub(super) fn abandon(&self, id: CorrelationId) -> Option<PendingRequest> {
        self.lock().slots.remove(&id).map(|slot| slot.request)
    }

    /// Fails every waiter with `reason` and refuses later registrations.
    ///
    /// Returns how many waiters were failed.
    pub(super) fn close_all(&self, reason: &str) -> usize {
        let drained: Vec<Slot> = {
            let mut state = self.lock();
            if state.closed.is_none() {
                state.closed = Some(reason.to_owned());
            }
            state.slots.drain().map(|(_, slot)| slot).collect()
        };
        let count = drained.len();
        for slot in drained {
            let _ignored = slot.sender.send(Err(Undeliverable::Lost(reason.to_owned())));
        }
        count
    }

    /// Returns a snapshot of outstanding requests ordered by identifier.
    pub(super) fn snapshot(&self) -> Vec<PendingRequest> {
        let mut requests: Vec<PendingRequest> = self
            .lock()
            .slots
            .values()
            .map(|slot| slot.request.clone())
            .collect();
        requests.sort_by_key(PendingRequest::id);
        requests
    }

    pub(super) fn len(&self) -> usize {
        self.lock().slots.len()
    }
}

/// Removes a pending entry when the waiting caller stops waiting.
///
/// Covers timeouts and futures dropped mid-flight, so a late response finds
/// no waiter and is logged instead of leaking the slot.
#[derive(Debug)]
pub(super) struct PendingGuard {
    table: Arc<PendingTable>,
    id: CorrelationId,
}

impl PendingGuard {
    pub(super) const fn new(table: Arc<PendingTable>, id: CorrelationId) -> Self {
        Self { table, id }
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        let _removed = self.table.abandon(self.id);
    }
}
