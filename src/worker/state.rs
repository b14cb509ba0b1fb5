use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Lifecycle of one interceptor instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Installing,
  /// Installed and waiting for the host to activate it
  Installed,
  Activating,
  Active,
  /// Superseded by a newer instance
  Redundant,
}

impl WorkerState {
  /// Whether moving from `self` to `next` is a legal transition.
  pub fn can_transition_to(self, next: WorkerState) -> bool {
    use WorkerState::{Activating, Active, Installed, Installing, Redundant};

    matches!(
      (self, next),
      (Installing, Installed)
        | (Installed, Activating)
        // purge failed, go back to waiting
        | (Activating, Installed)
        | (Activating, Active)
        | (Installed, Redundant)
        | (Active, Redundant)
    )
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Installing => "installing",
      Self::Installed => "installed",
      Self::Activating => "activating",
      Self::Active => "active",
      Self::Redundant => "redundant",
    }
  }
}

impl fmt::Display for WorkerState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Shared, thread-safe holder for a [`WorkerState`].
#[derive(Debug)]
pub(crate) struct Lifecycle {
  state: Mutex<WorkerState>,
}

impl Lifecycle {
  pub fn new(initial: WorkerState) -> Self {
    Self {
      state: Mutex::new(initial),
    }
  }

  pub fn get(&self) -> WorkerState {
    *self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Move to `next`, or return the current state if that is not allowed.
  pub fn transition(&self, next: WorkerState) -> Result<WorkerState, WorkerState> {
    let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
    if state.can_transition_to(next) {
      let previous = *state;
      *state = next;
      Ok(previous)
    } else {
      Err(*state)
    }
  }
}
