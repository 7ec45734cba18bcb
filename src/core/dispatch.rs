//! The deferred event-dispatch loop.
//!
//! Change records captured by the store's update hook are replayed here,
//! outside the hook's call stack, so reactions are free to mutate the store.
//! Writes made by a reaction enqueue new records but are NOT processed in the
//! same drain; they wait for the next outer-loop iteration. That one-batch
//! rule is what guarantees a drain terminates even when reactions keep
//! producing changes.

use crate::net::NetHandle;
use crate::store::change::{ChangeQueue, ChangeRecord};
use crate::store::{Store, StoreError};

/// An effect function matched to change records by table (and, for key/value
/// changes, by key name).
///
/// Reactions run synchronously, in the dispatcher's registration order. That
/// order is fixed and significant; a reaction must not assume anything about
/// its position beyond it.
pub trait Reaction {
    fn name(&self) -> &'static str;

    fn handle(
        &mut self,
        store: &Store,
        net: &mut NetHandle,
        change: &ChangeRecord,
    ) -> Result<(), StoreError>;
}

/// Replays captured change records through the registered reactions.
pub struct Dispatcher {
    queue: ChangeQueue,
    reactions: Vec<Box<dyn Reaction>>,
}

impl Dispatcher {
    pub fn new(queue: ChangeQueue) -> Self {
        Self { queue, reactions: Vec::new() }
    }

    /// The standard reaction set, in its declared order.
    pub fn standard(queue: ChangeQueue) -> Self {
        use crate::core::reactions::{
            HistoryFetcher, ListRebuilder, PendingTransmitter, SearchResetter,
        };
        let mut dispatcher = Self::new(queue);
        dispatcher.register(Box::new(HistoryFetcher));
        dispatcher.register(Box::new(PendingTransmitter));
        dispatcher.register(Box::new(ListRebuilder));
        dispatcher.register(Box::new(SearchResetter));
        dispatcher
    }

    pub fn register(&mut self, reaction: Box<dyn Reaction>) {
        self.reactions.push(reaction);
    }

    /// The registered reaction names, in invocation order.
    pub fn reaction_names(&self) -> Vec<&'static str> {
        self.reactions.iter().map(|r| r.name()).collect()
    }

    /// Process the batch of records queued so far, invoking every reaction
    /// with each record in order. Returns whether anything was processed.
    pub fn drain(&mut self, store: &Store, net: &mut NetHandle) -> Result<bool, StoreError> {
        let batch = self.queue.take_batch();
        let did_process = !batch.is_empty();
        for change in &batch {
            log::trace!("dispatch {:?}", change);
            for reaction in &mut self.reactions {
                reaction.handle(store, net, change)?;
            }
        }
        Ok(did_process)
    }
}
