use crate::types::ProjectStatus;

/// State machine governing which status changes are legal.
///
/// `completed` is terminal. A request for the current status is not a
/// transition at all; [`StatusTransitionPolicy::decide`] reports it as
/// [`TransitionDecision::Unchanged`] so callers can skip the write.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusTransitionPolicy;

impl StatusTransitionPolicy {
    /// Returns the statuses reachable from `current` in one step.
    pub fn allowed_targets(current: ProjectStatus) -> &'static [ProjectStatus] {
        match current {
            ProjectStatus::Active => &[ProjectStatus::OnHold, ProjectStatus::Completed],
            ProjectStatus::OnHold => &[ProjectStatus::Active, ProjectStatus::Completed],
            ProjectStatus::Completed => &[],
        }
    }

    /// Returns `true` when `current -> requested` is an edge of the transition table.
    pub fn is_allowed(current: ProjectStatus, requested: ProjectStatus) -> bool {
        Self::allowed_targets(current).contains(&requested)
    }

    /// Classifies a requested change, treating same-status requests as no-ops.
    pub fn decide(current: ProjectStatus, requested: ProjectStatus) -> TransitionDecision {
        if current == requested {
            TransitionDecision::Unchanged
        } else if Self::is_allowed(current, requested) {
            TransitionDecision::Allowed
        } else {
            TransitionDecision::Rejected
        }
    }
}

/// Outcome of evaluating a status change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionDecision {
    Allowed,
    Unchanged,
    Rejected,
}

impl TransitionDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Unchanged => "unchanged",
            Self::Rejected => "rejected",
        }
    }
}
