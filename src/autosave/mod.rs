use std::time::{Duration, Instant};

use time::OffsetDateTime;

/// Save state surfaced to the status line and the scratch overlay.
#[derive(Debug, Clone)]
pub enum SaveStatus {
    Idle,
    Pending { since: OffsetDateTime },
    Saved { at: OffsetDateTime },
}

/// Debounced single-slot write scheduler. `schedule` replaces whatever is
/// pending and restarts the quiet window, so a burst of calls yields one
/// write carrying the final payload. Due-checks take an explicit `now`;
/// nothing in here reads the clock on its own except `schedule` itself.
#[derive(Debug)]
pub struct WriteScheduler {
    debounce: Duration,
    pending: Option<PendingWrite>,
    last_saved_at: Option<OffsetDateTime>,
}

#[derive(Debug)]
struct PendingWrite {
    payload: String,
    due_at: Instant,
    since: OffsetDateTime,
}

impl WriteScheduler {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            pending: None,
            last_saved_at: None,
        }
    }

    pub fn schedule(&mut self, payload: String) {
        self.pending = Some(PendingWrite {
            payload,
            due_at: Instant::now() + self.debounce,
            since: OffsetDateTime::now_utc(),
        });
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Hands out the pending payload once its quiet window has elapsed at
    /// `now`. At most one caller ever observes a given payload.
    pub fn take_due(&mut self, now: Instant) -> Option<String> {
        let due = self
            .pending
            .as_ref()
            .map(|pending| now >= pending.due_at)
            .unwrap_or(false);
        if !due {
            return None;
        }
        self.pending.take().map(|pending| pending.payload)
    }

    /// Takes the pending payload regardless of the window. Used on shutdown
    /// so a quick exit does not drop the last edits.
    pub fn flush(&mut self) -> Option<String> {
        self.pending.take().map(|pending| pending.payload)
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn mark_saved(&mut self, at: OffsetDateTime) {
        self.last_saved_at = Some(at);
    }

    pub fn status(&self) -> SaveStatus {
        if let Some(pending) = &self.pending {
            return SaveStatus::Pending {
                since: pending.since,
            };
        }
        match self.last_saved_at {
            Some(at) => SaveStatus::Saved { at },
            None => SaveStatus::Idle,
        }
    }
}
