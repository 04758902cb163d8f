use crate::CoreError;
use serde::Serialize;

/// Phases of one session, in order. `Waiting` is optional.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Opening,
    Running,
    Waiting,
    Finalizing,
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Opening => write!(f, "opening"),
            SessionState::Running => write!(f, "running"),
            SessionState::Waiting => write!(f, "waiting"),
            SessionState::Finalizing => write!(f, "finalizing"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

pub fn validate_transition(from: SessionState, to: SessionState) -> Result<(), CoreError> {
    let valid = matches!(
        (from, to),
        (SessionState::Idle, SessionState::Opening)
            | (SessionState::Opening, SessionState::Running)
            | (
                SessionState::Running,
                SessionState::Waiting | SessionState::Finalizing
            )
            | (SessionState::Waiting, SessionState::Finalizing)
            | (SessionState::Finalizing, SessionState::Closed)
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        assert!(validate_transition(SessionState::Idle, SessionState::Opening).is_ok());
        assert!(validate_transition(SessionState::Opening, SessionState::Running).is_ok());
        assert!(validate_transition(SessionState::Running, SessionState::Waiting).is_ok());
        assert!(validate_transition(SessionState::Running, SessionState::Finalizing).is_ok());
        assert!(validate_transition(SessionState::Waiting, SessionState::Finalizing).is_ok());
        assert!(validate_transition(SessionState::Finalizing, SessionState::Closed).is_ok());
    }

    #[test]
    fn invalid_transitions() {
        assert!(validate_transition(SessionState::Idle, SessionState::Running).is_err());
        assert!(validate_transition(SessionState::Opening, SessionState::Finalizing).is_err());
        assert!(validate_transition(SessionState::Waiting, SessionState::Running).is_err());
        assert!(validate_transition(SessionState::Finalizing, SessionState::Waiting).is_err());
        assert!(validate_transition(SessionState::Closed, SessionState::Opening).is_err());
        assert!(validate_transition(SessionState::Closed, SessionState::Closed).is_err());
    }

    #[test]
    fn invalid_transition_names_both_states() {
        let err = validate_transition(SessionState::Closed, SessionState::Running).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid session transition: closed -> running"
        );
    }
}
