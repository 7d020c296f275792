//! Which storage tiers a session write touches.
//!
//! In-progress state lives in the cache only. The durable store sees a
//! session when it is created and again when it becomes terminal.

/// The lifecycle transition that triggered a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A `new_game` produced the session.
    Created,
    /// An accepted move that left the session active.
    Advanced,
    /// An accepted move that set `game_over` or `victory`.
    Finished,
}

/// How the durable store is written for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurableWrite {
    None,
    Insert,
    /// Update the existing row, inserting it when missing.
    Upsert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePolicy {
    pub cache: bool,
    pub durable: DurableWrite,
}

impl WritePolicy {
    pub const fn for_event(event: SessionEvent) -> Self {
        match event {
            SessionEvent::Created => Self {
                cache: true,
                durable: DurableWrite::Insert,
            },
            SessionEvent::Advanced => Self {
                cache: true,
                durable: DurableWrite::None,
            },
            SessionEvent::Finished => Self {
                cache: true,
                durable: DurableWrite::Upsert,
            },
        }
    }

    /// Policy used when the cache tier is missing or just rejected a write.
    ///
    /// The durable store then carries every write so nothing is lost.
    pub const fn without_cache(self) -> Self {
        Self {
            cache: false,
            durable: DurableWrite::Upsert,
        }
    }
}

impl SessionEvent {
    pub fn for_session(created: bool, terminal: bool) -> Self {
        match (created, terminal) {
            (true, _) => SessionEvent::Created,
            (false, true) => SessionEvent::Finished,
            (false, false) => SessionEvent::Advanced,
        }
    }
}
