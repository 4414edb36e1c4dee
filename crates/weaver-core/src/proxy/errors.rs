use thiserror::Error;

use super::{activation::ActivationError, GenerationStage};
use crate::parser::ParseError;

/// Proxy generation failures. None of them are retryable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProxyError {
    #[error("Cannot resolve source for class '{class}': {message}")]
    Resolution { class: String, message: String },

    #[error("Syntax error in class '{class}' at {error}")]
    Parse { class: String, error: ParseError },

    #[error("Enhancement trait '{class}' is unusable: {reason}")]
    EnhancementMissing { class: String, reason: String },

    #[error("'{0}' does not declare a class")]
    NotAClass(String),

    #[error("Cannot rewrite class '{class}': {reason}")]
    Rewrite { class: String, reason: String },

    #[error("Source of class '{0}' produced no declarations")]
    AstGenerationFailed(String),

    #[error("Generated proxy for '{class}' failed verification: {reason}")]
    AstOptimizationFailed { class: String, reason: String },

    #[error("Failed to activate proxy '{proxy}': {error}")]
    ActivationFailed {
        proxy: String,
        error: ActivationError,
    },
}

impl ProxyError {
    pub fn resolution(class: impl ToString, message: impl ToString) -> Self {
        Self::Resolution {
            class: class.to_string(),
            message: message.to_string(),
        }
    }

    pub fn parse(class: impl ToString, error: ParseError) -> Self {
        Self::Parse {
            class: class.to_string(),
            error,
        }
    }

    pub fn enhancement_missing(class: impl ToString, reason: impl ToString) -> Self {
        Self::EnhancementMissing {
            class: class.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn rewrite(class: impl ToString, reason: impl ToString) -> Self {
        Self::Rewrite {
            class: class.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn verification(class: impl ToString, reason: impl ToString) -> Self {
        Self::AstOptimizationFailed {
            class: class.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn activation(proxy: impl ToString, error: ActivationError) -> Self {
        Self::ActivationFailed {
            proxy: proxy.to_string(),
            error,
        }
    }

    /// The pipeline stage that was being entered when this error occurred
    pub fn failed_stage(&self) -> GenerationStage {
        match self {
            Self::Resolution { .. } | Self::Parse { .. } | Self::AstGenerationFailed(_) => {
                GenerationStage::Parsed
            }
            Self::EnhancementMissing { .. }
            | Self::NotAClass(_)
            | Self::Rewrite { .. }
            | Self::AstOptimizationFailed { .. } => GenerationStage::Rewritten,
            Self::ActivationFailed { .. } => GenerationStage::Activated,
        }
    }
}
