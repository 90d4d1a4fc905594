//! Run generations and their cancellation tokens.
//!
//! Every run is bound to a generation id. Advancing the generation cancels
//! every token bound to an older id; stopping cancels the current one. Tokens
//! compare ids by value and never share a mutable flag across runs.

use tokio::sync::watch;

/// Marker returned when a run observes that it has been superseded or stopped.
///
/// Not an error: it is the designed early-exit path of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct GenerationState {
    current: u64,
    stopped: bool,
}

impl GenerationState {
    fn cancels(&self, id: u64) -> bool {
        id != self.current || self.stopped
    }
}

/// Monotonic run counter owning the single active token.
#[derive(Debug)]
pub struct Generation {
    tx: watch::Sender<GenerationState>,
}

impl Generation {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(GenerationState::default());
        Self { tx }
    }

    /// Start a new generation and return its token. Older tokens are cancelled.
    pub fn advance(&self) -> RunToken {
        let mut id = 0;
        self.tx.send_modify(|state| {
            state.current += 1;
            state.stopped = false;
            id = state.current;
        });
        RunToken {
            id,
            rx: self.tx.subscribe(),
        }
    }

    /// Cancel the current generation without starting a new one.
    pub fn stop(&self) {
        self.tx.send_if_modified(|state| {
            let changed = !state.stopped;
            state.stopped = true;
            changed
        });
    }

    /// The id of the most recently started generation (0 before the first run).
    pub fn current(&self) -> u64 {
        self.tx.borrow().current
    }

    /// Whether the current generation is live (started and not stopped).
    pub fn is_active(&self) -> bool {
        let state = *self.tx.borrow();
        state.current > 0 && !state.stopped
    }
}

impl Default for Generation {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancellation token bound to one generation id.
#[derive(Debug, Clone)]
pub struct RunToken {
    id: u64,
    rx: watch::Receiver<GenerationState>,
}

impl RunToken {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// True once the generation was superseded, stopped, or its owner dropped.
    pub fn is_cancelled(&self) -> bool {
        if self.rx.has_changed().is_err() {
            return true;
        }
        self.rx.borrow().cancels(self.id)
    }

    /// `Err(Cancelled)` if the token is cancelled.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve once this token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let id = self.id;
        // An error means the owner is gone, which also cancels.
        let _ = rx.wait_for(|state| state.cancels(id)).await;
    }
}
