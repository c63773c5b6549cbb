//! Container lifecycle states.

use std::fmt;

/// Where a container is in its startup sequence.
///
/// `Open` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerState {
    /// Not opened yet, or a pending restore has just been cleared.
    Unopened,
    /// Executing a restore scheduled by a previous run.
    RestoringPending,
    /// Walking a store through migration stages.
    Migrating,
    /// Stores are open.
    Open,
    /// Startup failed; the stores cannot be used.
    Failed,
}

impl ContainerState {
    /// Check if no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, ContainerState::Open | ContainerState::Failed)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContainerState::Unopened => "unopened",
            ContainerState::RestoringPending => "restoring-pending",
            ContainerState::Migrating => "migrating",
            ContainerState::Open => "open",
            ContainerState::Failed => "failed",
        };
        f.write_str(name)
    }
}
