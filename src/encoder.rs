/*
 * SPDX-FileCopyrightText: 2024 The colbert-index Authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The passage encoder seam: dynamic dispatch over the encoder.
//!
//! The core depends only on this trait. The real tokenizer + transformer +
//! projection stack is out of scope and lives outside this crate.

use crate::error::{IndexError, Result};

/// A column-major `D x N` matrix of embeddings: `data[d + n * dim]` is
/// dimension `d` of embedding `n`. Column-major matches the on-disk
/// `centroids` layout and the layout the accelerator backend already
/// produces.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    /// Embedding dimension.
    pub dim: usize,
    /// Number of columns (embeddings).
    pub cols: usize,
    /// `dim * cols` values, column-major.
    pub data: Vec<f32>,
}

impl Matrix {
    /// Allocate a zeroed `dim x cols` matrix.
    pub fn zeros(dim: usize, cols: usize) -> Self {
        Matrix {
            dim,
            cols,
            data: vec![0.0; dim * cols],
        }
    }

    /// Borrow column `i` as a flat slice of length `dim`.
    pub fn col(&self, i: usize) -> &[f32] {
        let start = i * self.dim;
        &self.data[start..start + self.dim]
    }

    /// Mutably borrow column `i`.
    pub fn col_mut(&mut self, i: usize) -> &mut [f32] {
        let dim = self.dim;
        let start = i * dim;
        &mut self.data[start..start + dim]
    }
}

/// Options passed through to the encoder untouched.
#[derive(Debug, Clone, Default)]
pub struct EncoderOptions {
    /// Maximum passage length in tokens.
    pub doc_maxlen: Option<usize>,
    /// Special token marking a passage vs. a query.
    pub doc_token: Option<String>,
    /// Token ids to mask out.
    pub skiplist: Vec<u32>,
    /// Whether to mask punctuation tokens.
    pub mask_punctuation: bool,
}

/// The external collaborator that turns text into embeddings.
///
/// `encode(batch) -> (embeddings, doclens)` with `embeddings.cols ==
/// doclens.iter().sum()`.
pub trait Encoder: Send + Sync {
    /// Encode a batch of passage texts, returning the concatenated
    /// embeddings and the per-passage embedding counts.
    fn encode(&self, batch: &[String], options: &EncoderOptions) -> Result<(Matrix, Vec<usize>)>;
}

/// A deterministic, hash-based encoder used in tests and examples in place
/// of a real transformer. Each passage is mapped to a pseudo-random but
/// reproducible sequence of L2-normalized embeddings so the rest of the
/// pipeline (which only needs *some* valid embedding stream) can be
/// exercised end-to-end without a model.
pub struct InMemoryEncoder {
    /// Embedding dimension to produce.
    pub dim: usize,
    /// RNG seed, so the same collection always yields the same embeddings.
    pub seed: u64,
}

impl InMemoryEncoder {
    /// Construct a new deterministic encoder.
    pub fn new(dim: usize, seed: u64) -> Self {
        InMemoryEncoder { dim, seed }
    }

    fn doclen_for(&self, text: &str) -> usize {
        // Deterministic "token count": at least 1, scales mildly with length.
        1 + (text.len() / 5).min(63)
    }

    fn embedding_for(&self, text: &str, token_idx: usize, out: &mut [f32]) {
        use rand::{Rng, SeedableRng};
        let mut hasher_seed = self.seed;
        for (i, b) in text.bytes().enumerate() {
            hasher_seed = hasher_seed
                .wrapping_mul(1099511628211)
                .wrapping_add(b as u64)
                .wrapping_add(i as u64);
        }
        hasher_seed = hasher_seed.wrapping_add(token_idx as u64);
        let mut rng = rand::rngs::SmallRng::seed_from_u64(hasher_seed);
        let mut norm = 0.0f32;
        for v in out.iter_mut() {
            *v = rng.random_range(-1.0f32..1.0f32);
            norm += *v * *v;
        }
        norm = norm.sqrt().max(1e-12);
        for v in out.iter_mut() {
            *v /= norm;
        }
    }
}

impl Encoder for InMemoryEncoder {
    fn encode(&self, batch: &[String], _options: &EncoderOptions) -> Result<(Matrix, Vec<usize>)> {
        let doclens: Vec<usize> = batch.iter().map(|t| self.doclen_for(t)).collect();
        let total: usize = doclens.iter().sum();
        let mut matrix = Matrix::zeros(self.dim, total);
        let mut col = 0;
        for (text, &doclen) in batch.iter().zip(doclens.iter()) {
            for tok in 0..doclen {
                self.embedding_for(text, tok, matrix.col_mut(col));
                col += 1;
            }
        }
        if col != total {
            return Err(IndexError::Encoder {
                source: anyhow::anyhow!("internal encoder bookkeeping mismatch"),
            });
        }
        Ok((matrix, doclens))
    }
}
