//! Shared types, error taxonomy, and identifiers for the transcript layer:
//! the vocabulary every other crate in this workspace builds on.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod event;
pub mod id;
pub mod message;
pub mod run;
pub mod trace;

pub use checkpoint::{Checkpoints, NoopCheckpoints};
pub use config::Config;
pub use error::{Error, Result};
pub use event::{ReplayQuery, StoredEvent, StreamEvent};
pub use id::{IdGenerator, SequentialIdGenerator, UlidGenerator};
pub use message::{CanonicalMessage, CanonicalPart, Role, CURRENT_SCHEMA_VERSION};
pub use run::{FinalizeStatus, RecoverAction, RunRecord, RunStatus};
pub use trace::TraceEvent;
