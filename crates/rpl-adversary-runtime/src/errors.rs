//! Runtime error types

use rpl_adversary_core::AdversaryError;

/// Errors surfaced by the runtime and its handle
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Core(#[from] AdversaryError),

    #[error("{channel} channel closed")]
    ChannelClosed { channel: &'static str },

    #[error("Runtime not configured: {reason}")]
    NotConfigured { reason: String },

    #[error("Adversary task failed: {reason}")]
    TaskFailed { reason: String },
}

impl RuntimeError {
    pub fn channel_closed(channel: &'static str) -> Self {
        RuntimeError::ChannelClosed { channel }
    }

    pub fn not_configured<T: Into<String>>(reason: T) -> Self {
        RuntimeError::NotConfigured {
            reason: reason.into(),
        }
    }
}

pub type RuntimeResult<T> = core::result::Result<T, RuntimeError>;
