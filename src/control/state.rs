// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Acquisition state.

use serde::Serialize;

use crate::core::RunType;

/// What the acquisition controller is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RunState {
    #[default]
    Idle,
    /// Ingesting into runs of this type
    Running(RunType),
    /// Shut down; no further collection is started
    Stopped,
}

impl RunState {
    pub fn is_idle(&self) -> bool {
        matches!(self, RunState::Idle)
    }

    pub fn run_type(&self) -> Option<RunType> {
        match self {
            RunState::Running(run_type) => Some(*run_type),
            _ => None,
        }
    }

    /// Whether a collection may start from this state.
    pub fn can_start(&self) -> bool {
        self.is_idle()
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Idle => f.write_str("idle"),
            RunState::Running(run_type) => write!(f, "running {run_type}"),
            RunState::Stopped => f.write_str("stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_queries() {
        assert!(RunState::default().can_start());
        let running = RunState::Running(RunType::Scurve);
        assert!(!running.can_start());
        assert_eq!(running.run_type(), Some(RunType::Scurve));
        assert_eq!(running.to_string(), "running SC");
        assert!(!RunState::Stopped.can_start());
        assert_eq!(RunState::Stopped.run_type(), None);
    }
}
