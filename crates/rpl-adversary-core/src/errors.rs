//! Error types for the adversary core
//!
//! Nothing in a transmission cycle is fatal. Errors raised by individual attack
//! steps or by the transport are turned into diagnostics by the caller; the
//! `Result` plumbing exists so collaborators can report what went wrong.

use crate::config::AttackKind;

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Core error type for the adversary node
#[derive(Debug, thiserror::Error)]
pub enum AdversaryError {
    /// Version/rank tampering was requested but the node has joined no DODAG
    #[error("No active topology available for {attack}")]
    NoActiveTopology { attack: AttackKind },

    /// A flag was raised for an attack the node was not configured with
    #[error("Attack {attack} is not part of the configured capability set")]
    AttackUnavailable { attack: AttackKind },

    /// Routing engine refused an operation
    #[error("Routing engine error: {reason}")]
    Routing { reason: String },

    /// Datagram transport refused a send
    #[error("Transport error: {reason}")]
    Transport { reason: String },

    /// Invalid configuration
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    /// Malformed link-layer address
    #[error("Invalid link address: {input}")]
    InvalidAddress { input: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl AdversaryError {
    /// Create a missing topology error for the given attack
    pub fn no_topology(attack: AttackKind) -> Self {
        AdversaryError::NoActiveTopology { attack }
    }

    /// Create a routing engine error with a reason
    pub fn routing_error<T: Into<String>>(reason: T) -> Self {
        AdversaryError::Routing {
            reason: reason.into(),
        }
    }

    /// Create a transport error with a reason
    pub fn transport_error<T: Into<String>>(reason: T) -> Self {
        AdversaryError::Transport {
            reason: reason.into(),
        }
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        AdversaryError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create an invalid address error
    pub fn invalid_address<T: Into<String>>(input: T) -> Self {
        AdversaryError::InvalidAddress {
            input: input.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, AdversaryError>;
