//! Render phase state machine
//!
//! ```text
//! Empty → Preparing → Prepared → Rendering → Playing → Played
//!                  ↘ Errored (from any phase after Preparing)
//!                  ↘ Aborted (superseded before finishing)
//! any non-empty phase → Empty (teardown)
//! Played | Errored → Preparing (re-render with new args or globals)
//! ```

use crate::error::StoryError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase of one story render
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderPhase {
    /// Nothing mounted
    Empty,
    /// Resolving the prepared story and running loaders
    Preparing,
    /// Context built, ready to mount
    Prepared,
    /// Decorators applied, mount in progress
    Rendering,
    /// Play function running
    Playing,
    /// Finished
    Played,
    /// Failed
    Errored,
    /// Superseded by a newer render
    Aborted,
}

impl RenderPhase {
    /// Every phase
    pub const ALL: [RenderPhase; 8] = [
        Self::Empty,
        Self::Preparing,
        Self::Prepared,
        Self::Rendering,
        Self::Playing,
        Self::Played,
        Self::Errored,
        Self::Aborted,
    ];

    /// Wire name used in `storyRenderPhaseChanged`
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Preparing => "preparing",
            Self::Prepared => "prepared",
            Self::Rendering => "rendering",
            Self::Playing => "playing",
            Self::Played => "played",
            Self::Errored => "errored",
            Self::Aborted => "aborted",
        }
    }

    /// Parse a wire name
    #[must_use]
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == name)
    }

    /// Whether a run in this phase has finished (successfully or not)
    #[inline]
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Empty | Self::Played | Self::Errored | Self::Aborted)
    }
}

impl fmt::Display for RenderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate a phase transition
///
/// # Errors
/// [`StoryError::IllegalTransition`] when `to` is not reachable from `from`.
pub fn validate_transition(from: RenderPhase, to: RenderPhase) -> Result<(), StoryError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(StoryError::IllegalTransition { from, to })
    }
}

/// Phases reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: RenderPhase) -> Vec<RenderPhase> {
    use RenderPhase::*;
    match from {
        Empty => vec![Preparing],
        Preparing => vec![Prepared, Errored, Aborted, Empty],
        Prepared => vec![Rendering, Errored, Aborted, Empty],
        Rendering => vec![Playing, Played, Errored, Aborted, Empty],
        Playing => vec![Played, Errored, Aborted, Empty],
        Played | Errored => vec![Preparing, Empty],
        Aborted => vec![Empty],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn happy_path_is_allowed() {
        let path = [
            RenderPhase::Empty,
            RenderPhase::Preparing,
            RenderPhase::Prepared,
            RenderPhase::Rendering,
            RenderPhase::Playing,
            RenderPhase::Played,
            RenderPhase::Empty,
        ];
        for pair in path.windows(2) {
            assert!(validate_transition(pair[0], pair[1]).is_ok(), "{pair:?}");
        }
    }

    #[test]
    fn skipping_phases_is_rejected() {
        assert!(validate_transition(RenderPhase::Empty, RenderPhase::Rendering).is_err());
        assert!(validate_transition(RenderPhase::Prepared, RenderPhase::Played).is_err());
        assert!(validate_transition(RenderPhase::Aborted, RenderPhase::Preparing).is_err());
        assert!(validate_transition(RenderPhase::Empty, RenderPhase::Errored).is_err());
    }

    #[test]
    fn wire_names_round_trip() {
        for phase in RenderPhase::ALL {
            assert_eq!(RenderPhase::from_wire(phase.as_str()), Some(phase));
        }
        assert_eq!(RenderPhase::from_wire("loading"), None);
    }

    fn phase() -> impl Strategy<Value = RenderPhase> {
        prop::sample::select(RenderPhase::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn validation_agrees_with_allowed_set(from in phase(), to in phase()) {
            let allowed = allowed_transitions(from);
            prop_assert_eq!(validate_transition(from, to).is_ok(), allowed.contains(&to));
        }

        #[test]
        fn every_non_empty_phase_can_be_torn_down(from in phase()) {
            prop_assume!(from != RenderPhase::Empty);
            prop_assert!(validate_transition(from, RenderPhase::Empty).is_ok());
        }

        #[test]
        fn errored_reachable_after_preparing_only(from in phase()) {
            let reachable = validate_transition(from, RenderPhase::Errored).is_ok();
            let expected = matches!(
                from,
                RenderPhase::Preparing | RenderPhase::Prepared | RenderPhase::Rendering | RenderPhase::Playing
            );
            prop_assert_eq!(reachable, expected);
        }
    }
}
