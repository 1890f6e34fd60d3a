//! Transfer lifecycle rules.
//!
//! ```text
//! pending ──► transferring ◄──► paused
//!    │            │   │            │
//!    │            │   └► completed │
//!    └────────────┴──────► failed ◄┘
//! ```
//!
//! `completed` and `failed` are terminal. Cancellation is not a state: a
//! cancelled transfer is marked `failed` and leaves the registry.

use crate::TransferError;
use crate::types::{Transfer, TransferStatus};

impl TransferStatus {
    /// Returns `true` for `completed` and `failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Failed)
    }

    /// Returns `true` if `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: TransferStatus) -> bool {
        use crate::types::TransferStatus::*;
        matches!(
            (self, next),
            (Pending, Transferring)
                | (Pending, Failed)
                | (Transferring, Paused)
                | (Transferring, Completed)
                | (Transferring, Failed)
                | (Paused, Transferring)
                | (Paused, Failed)
        )
    }
}

impl Transfer {
    /// Moves the transfer to `next`, enforcing the lifecycle rules.
    ///
    /// Entering `completed` pins progress at 100% and the ETA at zero.
    pub fn transition_to(&mut self, next: TransferStatus) -> Result<(), TransferError> {
        if !self.status.can_transition_to(next) {
            return Err(TransferError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next == TransferStatus::Completed {
            self.progress = 100.0;
            self.eta_seconds = Some(0.0);
        }
        Ok(())
    }

    /// Like [`transition_to`](Self::transition_to) but only from `expected`.
    pub fn transition_from(
        &mut self,
        expected: TransferStatus,
        next: TransferStatus,
    ) -> Result<(), TransferError> {
        if self.status != expected {
            return Err(TransferError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.transition_to(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::TransferKey;
    use crate::types::Direction;
    use crate::types::TransferStatus::*;

    const ALL: [TransferStatus; 5] = [Pending, Transferring, Paused, Completed, Failed];

    fn transfer() -> Transfer {
        Transfer::new("t1", "f", 1, 1, 1, TransferKey::generate(), "", "p", Direction::Outgoing)
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for from in [Completed, Failed] {
            assert!(from.is_terminal());
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn pause_and_resume_only_between_transferring_and_paused() {
        assert!(Transferring.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Transferring));
        assert!(!Pending.can_transition_to(Paused));
        assert!(!Paused.can_transition_to(Completed));
        assert!(!Paused.can_transition_to(Paused));
    }

    #[test]
    fn no_path_back_to_pending() {
        for from in ALL {
            assert!(!from.can_transition_to(Pending));
        }
    }

    #[test]
    fn happy_path() {
        let mut t = transfer();
        t.transition_to(Transferring).unwrap();
        t.transition_to(Paused).unwrap();
        t.transition_to(Transferring).unwrap();
        t.progress = 42.0;
        t.transition_to(Completed).unwrap();
        assert_eq!(t.status, Completed);
        assert_eq!(t.progress, 100.0);
    }

    #[test]
    fn illegal_transition_is_reported() {
        let mut t = transfer();
        let err = t.transition_to(Completed).unwrap_err();
        match err {
            TransferError::InvalidTransition { id, from, to } => {
                assert_eq!(id, "t1");
                assert_eq!(from, Pending);
                assert_eq!(to, Completed);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(t.status, Pending);
    }

    #[test]
    fn transition_from_requires_expected_state() {
        let mut t = transfer();
        t.transition_to(Transferring).unwrap();
        t.transition_to(Paused).unwrap();
        // Paused -> Transferring is legal, but not when the caller expects Pending.
        assert!(t.transition_from(Pending, Transferring).is_err());
        t.transition_from(Paused, Transferring).unwrap();
    }
}
