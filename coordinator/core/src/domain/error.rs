// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Error Taxonomy
//!
//! - [`TroopError`] — membership/directive failures returned to callers.
//!   Recoverable; never crash the node.
//! - [`LinkError`] — failure of a call to a remote peer: either the peer
//!   answered with a [`TroopError`], or the transport itself failed.
//! - [`ApiFailure`] — the structured `{kind, subject, message}` wire body.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TroopError {
    #[error("subordinate already registered: {0}")]
    AlreadyRegistered(String),

    #[error("unknown subordinate: {0}")]
    UnknownSubordinate(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("placement target is not a current subordinate: {0}")]
    TargetNotFound(String),

    #[error("directive not accepted by this node: {0}")]
    InvalidDirective(String),

    #[error("operation not supported by this node: {0}")]
    Unsupported(String),

    #[error("superior is not available: {0}")]
    SuperiorUnavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    AlreadyRegistered,
    UnknownSubordinate,
    NotFound,
    TargetNotFound,
    InvalidDirective,
    Unsupported,
    SuperiorUnavailable,
}

impl TroopError {
    pub fn kind(&self) -> FailureKind {
        match self {
            TroopError::AlreadyRegistered(_) => FailureKind::AlreadyRegistered,
            TroopError::UnknownSubordinate(_) => FailureKind::UnknownSubordinate,
            TroopError::NotFound(_) => FailureKind::NotFound,
            TroopError::TargetNotFound(_) => FailureKind::TargetNotFound,
            TroopError::InvalidDirective(_) => FailureKind::InvalidDirective,
            TroopError::Unsupported(_) => FailureKind::Unsupported,
            TroopError::SuperiorUnavailable(_) => FailureKind::SuperiorUnavailable,
        }
    }

    /// The id, purpose or operation the failure is about.
    pub fn subject(&self) -> &str {
        match self {
            TroopError::AlreadyRegistered(s)
            | TroopError::UnknownSubordinate(s)
            | TroopError::NotFound(s)
            | TroopError::TargetNotFound(s)
            | TroopError::InvalidDirective(s)
            | TroopError::Unsupported(s)
            | TroopError::SuperiorUnavailable(s) => s,
        }
    }

    pub fn to_failure(&self) -> ApiFailure {
        ApiFailure {
            kind: self.kind(),
            subject: self.subject().to_string(),
            message: self.to_string(),
        }
    }
}

/// Structured failure body exchanged over any transport binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiFailure {
    pub kind: FailureKind,
    #[serde(default)]
    pub subject: String,
    pub message: String,
}

impl From<ApiFailure> for TroopError {
    fn from(failure: ApiFailure) -> Self {
        let s = failure.subject;
        match failure.kind {
            FailureKind::AlreadyRegistered => TroopError::AlreadyRegistered(s),
            FailureKind::UnknownSubordinate => TroopError::UnknownSubordinate(s),
            FailureKind::NotFound => TroopError::NotFound(s),
            FailureKind::TargetNotFound => TroopError::TargetNotFound(s),
            FailureKind::InvalidDirective => TroopError::InvalidDirective(s),
            FailureKind::Unsupported => TroopError::Unsupported(s),
            FailureKind::SuperiorUnavailable => TroopError::SuperiorUnavailable(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("remote rejected the call: {0}")]
    Remote(TroopError),

    #[error("transport failure: {0}")]
    Transport(String),
}

impl LinkError {
    /// Transport failures are worth retrying; a remote rejection is final.
    pub fn is_transient(&self) -> bool {
        match self {
            LinkError::Transport(_) => true,
            LinkError::Remote(TroopError::SuperiorUnavailable(_)) => true,
            LinkError::Remote(_) => false,
        }
    }
}

impl From<TroopError> for LinkError {
    fn from(err: TroopError) -> Self {
        LinkError::Remote(err)
    }
}
