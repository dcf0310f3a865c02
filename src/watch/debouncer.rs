//! Event debouncing.
//!
//! The first event in an empty window arms a 500 ms timer; later events
//! append to the pending list without extending it. When the timer fires
//! the whole list is taken at once, so a burst of notifications produces a
//! single processing pass.

use std::path::PathBuf;
use std::time::{Duration, Instant};

pub const DEBOUNCE_MS: u64 = 500;

/// What the watcher reported for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    Add,
    Change,
    Unlink,
}

/// One raw watch notification.
#[derive(Debug, Clone)]
pub struct FsEvent {
    pub kind: FsEventKind,
    pub path: PathBuf,
}

pub struct Debouncer {
    pending: Vec<FsEvent>,
    window_started: Option<Instant>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            window_started: None,
        }
    }

    /// Append a notify event's paths to the pending list.
    pub fn add_notify(&mut self, event: &notify::Event) {
        use notify::EventKind;

        let kind = match event.kind {
            EventKind::Create(_) => FsEventKind::Add,
            EventKind::Remove(_) => FsEventKind::Unlink,
            EventKind::Modify(modify) => {
                // Metadata-only changes (mtime/chmod noise) trigger rebuild loops
                if matches!(modify, notify::event::ModifyKind::Metadata(_)) {
                    return;
                }
                FsEventKind::Change
            }
            _ => return,
        };

        for path in &event.paths {
            self.add(FsEvent {
                kind,
                path: path.clone(),
            });
        }
    }

    pub fn add(&mut self, event: FsEvent) {
        if self.pending.is_empty() {
            self.window_started = Some(Instant::now());
        }
        self.pending.push(event);
    }

    /// Atomically take the pending list once the window has elapsed.
    pub fn take_if_ready(&mut self) -> Option<Vec<FsEvent>> {
        let started = self.window_started?;
        if started.elapsed() < Duration::from_millis(DEBOUNCE_MS) {
            return None;
        }
        self.window_started = None;
        Some(std::mem::take(&mut self.pending))
    }

    /// Time until the window can fire; effectively forever when idle.
    pub fn sleep_duration(&self) -> Duration {
        match self.window_started {
            Some(started) => Duration::from_millis(DEBOUNCE_MS)
                .saturating_sub(started.elapsed())
                .max(Duration::from_millis(1)),
            None => Duration::from_secs(86_400),
        }
    }

    #[cfg(test)]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub fn force_ready(&mut self) {
        if let Some(started) = self.window_started.as_mut() {
            *started = Instant::now() - Duration::from_millis(DEBOUNCE_MS + 1);
        }
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new()
    }
}
