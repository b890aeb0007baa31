// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Mapping error types.

use thiserror::Error;

/// Errors raised while parsing mappings or checking documents against them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    /// The mappings can never accept a user field.
    #[error("index has no mappings: strict dynamic mode with no declared properties")]
    EmptyMappings,

    /// A value does not fit its field, or the field may not be typed at all.
    #[error("invalid field '{field}': {reason}")]
    InvalidField {
        /// Dotted field path.
        field: String,
        reason: String,
    },

    /// Unknown dynamic mode or field type string.
    #[error("unsupported {0}")]
    Unsupported(String),

    /// A user schema tried to declare `_id` or `_timestamp`.
    #[error("field '{0}' is reserved and cannot be redeclared")]
    ReservedField(String),

    /// A dynamic template pattern failed to compile.
    #[error("invalid pattern '{pattern}' in dynamic template '{template}': {reason}")]
    InvalidPattern {
        template: String,
        pattern: String,
        reason: String,
    },
}

impl MappingError {
    pub(crate) fn invalid_field(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
