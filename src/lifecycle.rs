//! Component lifecycle state machine.
//!
//! ```text
//! Created --init--> Initialized --on_after_init--> Activated --on_stop--> Stopped
//! ```
//!
//! `on_stop` is accepted from any state except `Stopped`.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

use crate::error::LifecycleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum LifecycleState {
    Created = 0,
    Initialized = 1,
    /// Groups are running; registration is closed
    Activated = 2,
    Stopped = 3,
}

impl LifecycleState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Created,
            1 => Self::Initialized,
            2 => Self::Activated,
            _ => Self::Stopped,
        }
    }

    /// Whether groups may still be registered.
    #[must_use]
    pub fn accepts_registration(self) -> bool {
        matches!(self, Self::Created | Self::Initialized)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Initialized => "initialized",
            Self::Activated => "activated",
            Self::Stopped => "stopped",
        })
    }
}

/// Atomic holder so transitions work through `&self`.
#[derive(Debug)]
pub(crate) struct Lifecycle(AtomicU8);

impl Default for Lifecycle {
    fn default() -> Self {
        Self(AtomicU8::new(LifecycleState::Created as u8))
    }
}

impl Lifecycle {
    pub(crate) fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move `from -> to`, failing when the current state is not `from`.
    pub(crate) fn transition(
        &self,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<(), LifecycleError> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| LifecycleError::InvalidTransition {
                from: LifecycleState::from_u8(actual),
                to,
            })
    }

    /// Move to `Stopped` from anything else; returns the previous state.
    pub(crate) fn stop(&self) -> Result<LifecycleState, LifecycleError> {
        let previous =
            LifecycleState::from_u8(self.0.swap(LifecycleState::Stopped as u8, Ordering::AcqRel));
        if previous == LifecycleState::Stopped {
            return Err(LifecycleError::InvalidTransition {
                from: previous,
                to: LifecycleState::Stopped,
            });
        }
        Ok(previous)
    }
}
