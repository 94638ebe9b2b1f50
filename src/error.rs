/*
 * SPDX-FileCopyrightText: 2024 The colbert-index Authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The error taxonomy used throughout the indexing pipeline.
//!
//! Every stage returns `Result<T, IndexError>`; nothing is recovered inside
//! the core — callers either fix the input and retry from scratch, or
//! surface the error.

use std::path::PathBuf;

/// Errors that can occur while building an index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Nonsensical configuration: bad sizes, empty collection, `nbits < 1`, ...
    #[error("invalid configuration: {message}")]
    Configuration {
        /// Human-readable description of what was wrong.
        message: String,
    },

    /// The passage encoder failed. Never retried.
    #[error("encoder failed: {source}")]
    Encoder {
        /// The underlying error from the encoder implementation.
        #[source]
        source: anyhow::Error,
    },

    /// A numeric computation could not proceed (e.g. too few samples for a
    /// quantile, or fewer held-out residuals than `2^nbits`).
    #[error("numeric degeneracy: {message}")]
    NumericDegeneracy {
        /// Human-readable description.
        message: String,
    },

    /// A filesystem operation failed.
    #[error("{operation} failed for {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// What we were trying to do (e.g. "write chunk codes").
        operation: &'static str,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The manifest existence check found missing files.
    #[error("index directory is missing required files: {}", .missing.join(", "))]
    Integrity {
        /// Paths (relative to the index directory) that were expected but absent.
        missing: Vec<String>,
    },
}

impl IndexError {
    /// Build a [`IndexError::Configuration`] from a message.
    pub fn config(message: impl Into<String>) -> Self {
        IndexError::Configuration {
            message: message.into(),
        }
    }

    /// Build a [`IndexError::NumericDegeneracy`] from a message.
    pub fn numeric(message: impl Into<String>) -> Self {
        IndexError::NumericDegeneracy {
            message: message.into(),
        }
    }

    /// Wrap an I/O error with the path and operation that failed.
    pub fn io(path: impl Into<PathBuf>, operation: &'static str, source: std::io::Error) -> Self {
        IndexError::Io {
            path: path.into(),
            operation,
            source,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, IndexError>;
