//! Stateful reducer over a stream's stored events.
//!
//! A `Projector` wraps an initial state and a reducer closure, and tracks
//! the last applied seq so `catch_up` can be invoked freely: events with
//! `seq <= last_seq` are ignored, making repeated catch-up calls idempotent.

use sa_domain::{Result, StoredEvent};
use sa_event_store::EventStore;

pub struct Projector<S, F>
where
    F: FnMut(&mut S, &StoredEvent),
{
    state: S,
    reducer: F,
    last_seq: u64,
}

impl<S, F> Projector<S, F>
where
    F: FnMut(&mut S, &StoredEvent),
{
    pub fn new(initial_state: S, reducer: F) -> Self {
        Self {
            state: initial_state,
            reducer,
            last_seq: 0,
        }
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    /// Applies `events` in order, skipping any with `seq <= last_seq`.
    pub fn apply(&mut self, events: &[StoredEvent]) {
        for event in events {
            if event.seq <= self.last_seq {
                continue;
            }
            (self.reducer)(&mut self.state, event);
            self.last_seq = event.seq;
        }
    }

    /// Replays everything since `last_seq` from `store` and applies it.
    pub fn catch_up(&mut self, store: &dyn EventStore, stream_id: &str) -> Result<()> {
        let events = store.replay(stream_id, sa_domain::ReplayQuery::from_seq(self.last_seq))?;
        self.apply(&events);
        Ok(())
    }
}
