//! Dialog state machines for committing and merging.
//!
//! Each dialog is a plain value updated through explicit setter methods. The
//! dialogs never perform I/O: `submit` validates and returns the request the
//! owner should send, and the owner feeds the backend's answer back through
//! `on_result` together with the [`Ticket`] it got from `submit`.

pub mod commit;
pub mod merge;

pub use commit::{CommitDialog, CommitPhase, CommitRequest, SceneChanged};
pub use merge::{MergeDialog, MergeOptions, MergePhase, MergeReceipt, MergeRequest, MergeStrategy};

/// Identifies one submission attempt. A result carrying an older ticket
/// than the dialog's current one belongs to an abandoned attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(pub(crate) u64);

/// What happened to a response fed back into a dialog.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    /// The response matched the dialog's current state and was applied.
    Applied(T),
    /// The dialog moved on (cancelled, reselected) and the response was
    /// dropped.
    Stale,
}

impl<T> Outcome<T> {
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale)
    }

    pub fn applied(self) -> Option<T> {
        match self {
            Self::Applied(v) => Some(v),
            Self::Stale => None,
        }
    }
}

/// How a submission ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    Succeeded(T),
    /// Backend or network failure; the dialog is actionable again.
    Failed(String),
}
