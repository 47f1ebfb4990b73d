//! Lifecycle events and the trigger state machine.
//!
//! The trigger resource is the unit of work driving executor invocation: the
//! deployment system signals create/update/delete events against it, and each
//! event maps to exactly one executor invocation. This module defines the
//! event type, the state progression the trigger moves through, and the
//! payload forwarded to the executor.

use serde::{Deserialize, Serialize};

/// A lifecycle event signaled against the trigger resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleEvent {
  Create,
  Update,
  Delete,
}

impl std::fmt::Display for LifecycleEvent {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      LifecycleEvent::Create => "create",
      LifecycleEvent::Update => "update",
      LifecycleEvent::Delete => "delete",
    };
    write!(f, "{}", s)
  }
}

/// Progression of the trigger through its lifecycle.
///
/// Legal chain: `PendingCreate` → `Created` → (`PendingUpdate` → `Updated`)*
/// → `PendingDelete` → `Deleted`. A fresh trigger starts at `PendingCreate`;
/// later events enter their pending state via [`begin`](Self::begin) and
/// settle via [`complete`](Self::complete).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerState {
  PendingCreate,
  Created,
  PendingUpdate,
  Updated,
  PendingDelete,
  Deleted,
}

impl std::fmt::Display for TriggerState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      TriggerState::PendingCreate => "pending_create",
      TriggerState::Created => "created",
      TriggerState::PendingUpdate => "pending_update",
      TriggerState::Updated => "updated",
      TriggerState::PendingDelete => "pending_delete",
      TriggerState::Deleted => "deleted",
    };
    write!(f, "{}", s)
  }
}

/// Error raised on an illegal trigger state transition.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
  #[error("no {event} transition from trigger state {from}")]
  InvalidTransition {
    from: TriggerState,
    event: LifecycleEvent,
  },

  #[error("trigger state {state} has no pending transition to complete")]
  NotPending { state: TriggerState },
}

impl TriggerState {
  /// Enter the pending state for `event`.
  ///
  /// Only update and delete events begin from a settled state; creation
  /// starts at [`TriggerState::PendingCreate`] directly, so `begin` with
  /// [`LifecycleEvent::Create`] is always an error.
  ///
  /// # Errors
  ///
  /// Returns [`LifecycleError::InvalidTransition`] when `event` is not legal
  /// from the current state.
  pub fn begin(self, event: LifecycleEvent) -> Result<TriggerState, LifecycleError> {
    match (self, event) {
      (TriggerState::Created | TriggerState::Updated, LifecycleEvent::Update) => {
        Ok(TriggerState::PendingUpdate)
      }
      (TriggerState::Created | TriggerState::Updated, LifecycleEvent::Delete) => {
        Ok(TriggerState::PendingDelete)
      }
      (from, event) => Err(LifecycleError::InvalidTransition { from, event }),
    }
  }

  /// Settle the current pending state.
  ///
  /// # Errors
  ///
  /// Returns [`LifecycleError::NotPending`] when the state is already
  /// settled.
  pub fn complete(self) -> Result<TriggerState, LifecycleError> {
    match self {
      TriggerState::PendingCreate => Ok(TriggerState::Created),
      TriggerState::PendingUpdate => Ok(TriggerState::Updated),
      TriggerState::PendingDelete => Ok(TriggerState::Deleted),
      state => Err(LifecycleError::NotPending { state }),
    }
  }

  /// Whether this state still expects a `complete` call.
  pub fn is_pending(self) -> bool {
    matches!(
      self,
      TriggerState::PendingCreate | TriggerState::PendingUpdate | TriggerState::PendingDelete
    )
  }
}

/// Configuration forwarded to the executor with every invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerProperties {
  /// Suppress (and log) script execution failures instead of failing the
  /// lifecycle transition.
  #[serde(default)]
  pub ignore_sql_errors: bool,
}

/// Payload delivered to the executor for one lifecycle event.
///
/// Everything else the executor needs (endpoint, secret, storage, teardown
/// flag) travels in its environment, set once at function declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRequest {
  pub event: LifecycleEvent,
  pub properties: TriggerProperties,
}
