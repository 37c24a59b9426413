use thiserror::Error;

use crate::error::VoteErrorKind;

/// Stages a single vote event moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteStage {
    /// Event accepted from the transport, not yet inspected.
    Received,
    /// Checking the voter's display name.
    Validating,
    /// Consulting the per-identity and per-origin cooldowns.
    RateChecking,
    /// Reading the poll and updating the voter record under the poll lock.
    Ledgering,
    /// Writing the updated poll back to storage.
    Persisting,
    /// Committing the cooldown and fanning the tally out to the room.
    Broadcasting,
    /// Terminal success.
    Done,
    /// Terminal failure, reported to the sender only.
    Errored(VoteErrorKind),
}

impl VoteStage {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, VoteStage::Done | VoteStage::Errored(_))
    }
}

/// Error returned when a stage change would move backwards or skip a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid vote transition: {from:?} -> {to:?}")]
pub struct InvalidTransition {
    /// Stage the flow was in.
    pub from: VoteStage,
    /// Stage that was requested.
    pub to: VoteStage,
}

/// Forward-only tracker of a vote event's progress.
///
/// The only non-adjacent move allowed is `Ledgering -> Broadcasting`, taken when
/// the voter re-submits the option they already hold and nothing needs to be
/// persisted.
#[derive(Debug, Clone)]
pub struct VoteFlow {
    stage: VoteStage,
    history: Vec<VoteStage>,
}

impl Default for VoteFlow {
    fn default() -> Self {
        Self {
            stage: VoteStage::Received,
            history: vec![VoteStage::Received],
        }
    }
}

impl VoteFlow {
    /// Start a flow in [`VoteStage::Received`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stage.
    pub fn stage(&self) -> VoteStage {
        self.stage
    }

    /// Every stage visited so far, in order.
    pub fn history(&self) -> &[VoteStage] {
        &self.history
    }

    /// Move to `next` if the transition is allowed.
    pub fn advance(&mut self, next: VoteStage) -> Result<VoteStage, InvalidTransition> {
        if !Self::allowed(self.stage, next) {
            return Err(InvalidTransition {
                from: self.stage,
                to: next,
            });
        }
        self.stage = next;
        self.history.push(next);
        Ok(next)
    }

    /// Terminate the flow with `kind`.
    pub fn fail(&mut self, kind: VoteErrorKind) -> Result<VoteStage, InvalidTransition> {
        self.advance(VoteStage::Errored(kind))
    }

    fn allowed(from: VoteStage, to: VoteStage) -> bool {
        use VoteStage::*;

        if from.is_terminal() {
            return false;
        }
        match (from, to) {
            (_, Errored(_)) => true,
            (Received, Validating)
            | (Validating, RateChecking)
            | (RateChecking, Ledgering)
            | (Ledgering, Persisting)
            | (Ledgering, Broadcasting)
            | (Persisting, Broadcasting)
            | (Broadcasting, Done) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(flow: &mut VoteFlow, stages: &[VoteStage]) {
        for stage in stages {
            flow.advance(*stage).unwrap();
        }
    }

    #[test]
    fn initial_stage_is_received() {
        let flow = VoteFlow::new();
        assert_eq!(flow.stage(), VoteStage::Received);
        assert_eq!(flow.history(), [VoteStage::Received]);
    }

    #[test]
    fn full_happy_path() {
        let mut flow = VoteFlow::new();
        walk(
            &mut flow,
            &[
                VoteStage::Validating,
                VoteStage::RateChecking,
                VoteStage::Ledgering,
                VoteStage::Persisting,
                VoteStage::Broadcasting,
                VoteStage::Done,
            ],
        );
        assert!(flow.stage().is_terminal());
        assert_eq!(flow.history().len(), 7);
    }

    #[test]
    fn unchanged_vote_skips_persisting() {
        let mut flow = VoteFlow::new();
        walk(
            &mut flow,
            &[
                VoteStage::Validating,
                VoteStage::RateChecking,
                VoteStage::Ledgering,
                VoteStage::Broadcasting,
                VoteStage::Done,
            ],
        );
        assert!(!flow.history().contains(&VoteStage::Persisting));
    }

    #[test]
    fn skipping_rate_check_is_rejected() {
        let mut flow = VoteFlow::new();
        flow.advance(VoteStage::Validating).unwrap();
        let err = flow.advance(VoteStage::Ledgering).unwrap_err();
        assert_eq!(err.from, VoteStage::Validating);
        assert_eq!(err.to, VoteStage::Ledgering);
        assert_eq!(flow.stage(), VoteStage::Validating);
    }

    #[test]
    fn moving_backwards_is_rejected() {
        let mut flow = VoteFlow::new();
        walk(&mut flow, &[VoteStage::Validating, VoteStage::RateChecking]);
        assert!(flow.advance(VoteStage::Validating).is_err());
    }

    #[test]
    fn errored_is_reachable_from_any_open_stage() {
        for stages in [
            &[][..],
            &[VoteStage::Validating][..],
            &[
                VoteStage::Validating,
                VoteStage::RateChecking,
                VoteStage::Ledgering,
                VoteStage::Persisting,
            ][..],
        ] {
            let mut flow = VoteFlow::new();
            walk(&mut flow, stages);
            assert_eq!(
                flow.fail(VoteErrorKind::StorageFailure).unwrap(),
                VoteStage::Errored(VoteErrorKind::StorageFailure)
            );
        }
    }

    #[test]
    fn terminal_stages_accept_nothing() {
        let mut flow = VoteFlow::new();
        flow.fail(VoteErrorKind::MalformedEvent).unwrap();
        assert!(flow.advance(VoteStage::Validating).is_err());
        assert!(flow.fail(VoteErrorKind::NotFound).is_err());
    }
}
