/*
 * SPDX-FileCopyrightText: 2024 The colbert-index Authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Pipeline configuration.
//!
//! Everything the core consumes as a "bag of scalar options" lives here.
//! `doc_maxlen`, `doc_token`, `skiplist`, and `mask_punctuation` are passed
//! through to the encoder untouched; the core never interprets them.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{IndexError, Result};

/// Full configuration for one indexing run, echoed verbatim to
/// `config.json` at the start of the build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// One passage per line, or encoder-defined.
    pub collection_path: PathBuf,
    /// Directory the index is written to.
    pub index_path: PathBuf,
    /// Embedding dimension `D`.
    #[serde(default = "default_dim")]
    pub dim: usize,
    /// Residual bits per dimension `B`.
    #[serde(default = "default_nbits")]
    pub nbits: u32,
    /// K-means iteration cap.
    #[serde(default = "default_kmeans_niters")]
    pub kmeans_niters: usize,
    /// Passages per encoder batch.
    #[serde(default = "default_index_bsize")]
    pub index_bsize: usize,
    /// Passages per chunk. `None` means "derive from collection size".
    #[serde(default)]
    pub chunksize: Option<usize>,
    /// Number of ranks (accelerators) sharing the build. Always 1 in scope.
    #[serde(default = "default_nranks")]
    pub nranks: usize,
    /// Maximum passage length in tokens, passed through to the encoder.
    #[serde(default)]
    pub doc_maxlen: Option<usize>,
    /// Which special token marks a passage vs. a query, passed through.
    #[serde(default)]
    pub doc_token: Option<String>,
    /// Token ids to mask out before indexing, passed through.
    #[serde(default)]
    pub skiplist: Vec<u32>,
    /// Whether to mask punctuation tokens, passed through.
    #[serde(default)]
    pub mask_punctuation: bool,
    /// Select an accelerator for k-means/encoding.
    #[serde(default)]
    pub use_gpu: bool,
    /// RNG seed for sampling, k-means initialization, and any other
    /// randomized step — not part of the §6 option table, but needed to
    /// make runs reproducible given identical inputs. Defaults to a fixed
    /// constant for reproducible runs.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_dim() -> usize {
    128
}
fn default_nbits() -> u32 {
    2
}
fn default_kmeans_niters() -> usize {
    20
}
fn default_index_bsize() -> usize {
    64
}
fn default_nranks() -> usize {
    1
}
fn default_seed() -> u64 {
    42
}

impl Config {
    /// Validate sizes and flag nonsensical configuration.
    pub fn validate(&self) -> Result<()> {
        if self.dim == 0 {
            return Err(IndexError::config("dim must be > 0"));
        }
        if self.nbits < 1 {
            return Err(IndexError::config("nbits must be >= 1"));
        }
        if self.nbits > 16 {
            // 2^nbits buckets must fit comfortably in memory and in a u32 code.
            return Err(IndexError::config("nbits must be <= 16"));
        }
        if self.kmeans_niters == 0 {
            return Err(IndexError::config("kmeans_niters must be > 0"));
        }
        if self.index_bsize == 0 {
            return Err(IndexError::config("index_bsize must be > 0"));
        }
        if let Some(cs) = self.chunksize {
            if cs == 0 {
                return Err(IndexError::config("chunksize must be > 0 when set"));
            }
        }
        if self.nranks == 0 {
            return Err(IndexError::config("nranks must be > 0"));
        }
        if self.use_gpu && !cfg!(feature = "gpu") {
            return Err(IndexError::config(
                "use_gpu requested but the crate was built without the `gpu` feature",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config {
            collection_path: "collection.tsv".into(),
            index_path: "index".into(),
            dim: 128,
            nbits: 2,
            kmeans_niters: 20,
            index_bsize: 64,
            chunksize: None,
            nranks: 1,
            doc_maxlen: None,
            doc_token: None,
            skiplist: vec![],
            mask_punctuation: false,
            use_gpu: false,
            seed: 42,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn zero_nbits_is_rejected() {
        let mut c = base();
        c.nbits = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn zero_dim_is_rejected() {
        let mut c = base();
        c.dim = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn gpu_without_feature_is_rejected() {
        let mut c = base();
        c.use_gpu = true;
        assert!(c.validate().is_err());
    }
}
