/*
 * SPDX-FileCopyrightText: 2024 The colbert-index Authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Offline indexing pipeline for a compressed, cluster-partitioned vector
//! index over a collection of text passages, built for late-interaction
//! (ColBERT-family) retrieval.
//!
//! The pipeline runs six stages in a fixed order: [`sampler`], [`planner`],
//! [`trainer`], [`chunk`] (the Chunk Encoder), [`ivf`] (the IVF Builder),
//! and [`manifest`] (the Manifest Writer). [`indexer::build`] drives all
//! six; most callers should use that rather than the stage modules
//! directly.

pub mod bitpack;
pub mod chunk;
pub mod collection;
pub mod config;
pub mod encoder;
pub mod error;
pub mod indexer;
pub mod ivf;
pub mod linalg;
pub mod manifest;
pub mod planner;
pub mod sampler;
pub mod tensor;
pub mod trainer;

/// Re-exports of the crate's main entry points.
pub mod prelude {
    pub use crate::collection::Collection;
    pub use crate::config::Config;
    pub use crate::encoder::{Encoder, EncoderOptions, InMemoryEncoder, Matrix};
    pub use crate::error::{IndexError, Result};
    pub use crate::indexer;
}
