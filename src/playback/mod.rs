//! Scripted playback: Replays an authored sequence of timed steps into a
//! live message log.
//!
//! A run streams text word by word, morphs skeleton placeholders into
//! content, and shows transient thinking indicators. Runs are bound to a
//! generation: starting or resetting supersedes whatever was in flight, and
//! completion is persisted so a finished playback is not replayed.

pub mod clock;
pub mod completion;
pub mod engine;
pub mod generation;
pub mod history;
pub mod interpreter;
pub mod log;
pub mod pacing;
pub mod record;
pub mod state;
pub mod step;
pub mod streamer;

pub use completion::CompletionFlag;
pub use engine::{PlaybackEngine, RunHandle};
pub use generation::{Cancelled, Generation, RunToken};
pub use history::{HistoryStore, spawn_history_sync};
pub use log::{LogEvent, MessageLog};
pub use pacing::{MinimumPacing, Pacing, RandomPacing, SeededPacing};
pub use record::{MessageKind, MessageRecord, Role};
pub use state::{PlaybackPhase, RunOutcome, RunStatus};
pub use step::{Sequence, Step};
