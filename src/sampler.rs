/*
 * SPDX-FileCopyrightText: 2024 The colbert-index Authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The Sampler: draws a representative subset of passages and splits
//! their embeddings into a k-means training sample and a held-out split
//! used to calibrate the residual codec.

use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::collection::Collection;
use crate::encoder::{Encoder, EncoderOptions, Matrix};
use crate::error::{IndexError, Result};

/// Passages per document assumed when sizing the clustering sample.
pub const TYPICAL_DOCLEN: f64 = 120.0;

/// Output of the Sampler: the training split, the held-out split, and the
/// average document length observed, which the Planner needs.
pub struct SampleOutput {
    /// Embeddings used to fit k-means.
    pub train: Matrix,
    /// Embeddings held out for residual codec calibration.
    pub heldout: Matrix,
    /// Mean doclen across the sampled passages (0 if the sample is empty).
    pub avg_doclen_est: f64,
    /// Number of distinct passages drawn (`Ns`), which upper-bounds
    /// `num_partitions` in the Planner.
    pub sample_size: usize,
}

/// `Ns = min(num_docs, 1 + floor(16 * sqrt(typical_doclen * num_docs)))`.
pub fn sample_size(num_docs: usize) -> usize {
    if num_docs == 0 {
        return 0;
    }
    let ns = 1 + ((16.0 * (TYPICAL_DOCLEN * num_docs as f64).sqrt()).floor() as usize);
    ns.min(num_docs)
}

/// Draw the clustering sample and held-out split.
pub fn sample(
    collection: &Collection,
    encoder: &dyn Encoder,
    options: &EncoderOptions,
    seed: u64,
) -> Result<SampleOutput> {
    let num_docs = collection.num_docs();
    if num_docs == 0 {
        return Err(IndexError::config("cannot sample from an empty collection"));
    }
    let ns = sample_size(num_docs);

    let mut rng = rand::rngs::SmallRng::seed_from_u64(seed);
    let mut ids: Vec<usize> = rand::seq::index::sample(&mut rng, num_docs, ns)
        .iter()
        .map(|i| i + 1)
        .collect();
    ids.sort_unstable();

    let texts = collection.get_many(&ids)?;
    let (matrix, doclens) = encoder.encode(&texts, options)?;
    let total: usize = doclens.iter().sum();
    if total != matrix.cols {
        return Err(IndexError::Encoder {
            source: anyhow::anyhow!(
                "encoder returned {} embeddings but doclens sum to {}",
                matrix.cols,
                total
            ),
        });
    }

    let avg_doclen_est = if doclens.is_empty() {
        0.0
    } else {
        doclens.iter().sum::<usize>() as f64 / doclens.len() as f64
    };

    let m = matrix.cols;
    let nh = 1usize.max(((50_000usize as f64).min(0.05 * m as f64)).floor() as usize);
    let nh = nh.min(m);

    let mut order: Vec<usize> = (0..m).collect();
    order.shuffle(&mut rng);

    let heldout_idx = &order[m - nh..];
    let train_idx = &order[..m - nh];

    let train = gather_columns(&matrix, train_idx);
    let heldout = gather_columns(&matrix, heldout_idx);

    Ok(SampleOutput {
        train,
        heldout,
        avg_doclen_est,
        sample_size: ns,
    })
}

fn gather_columns(matrix: &Matrix, indices: &[usize]) -> Matrix {
    let mut out = Matrix::zeros(matrix.dim, indices.len());
    for (dst, &src) in indices.iter().enumerate() {
        out.col_mut(dst).copy_from_slice(matrix.col(src));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::InMemoryEncoder;
    use std::io::Write;

    fn collection_with(n: usize) -> Collection {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        for i in 0..n {
            writeln!(f, "passage number {i} with some extra words to vary length").unwrap();
        }
        Collection::load(f.path()).unwrap()
    }

    #[test]
    fn sample_size_matches_formula() {
        // num_docs=10: 1 + floor(16*sqrt(120*10)) = 1 + floor(16*34.64) = 1+554 -> capped to 10
        assert_eq!(sample_size(10), 10);
    }

    #[test]
    fn sample_produces_disjoint_train_and_heldout() {
        let collection = collection_with(200);
        let encoder = InMemoryEncoder::new(16, 1);
        let out = sample(&collection, &encoder, &EncoderOptions::default(), 42).unwrap();
        assert!(out.heldout.cols >= 1);
        assert!(out.train.cols > 0);
    }

    #[test]
    fn sampling_is_deterministic_given_a_seed() {
        let collection = collection_with(50);
        let encoder = InMemoryEncoder::new(8, 3);
        let a = sample(&collection, &encoder, &EncoderOptions::default(), 7).unwrap();
        let b = sample(&collection, &encoder, &EncoderOptions::default(), 7).unwrap();
        assert_eq!(a.train.data, b.train.data);
        assert_eq!(a.heldout.data, b.heldout.data);
    }

    #[test]
    fn empty_collection_is_rejected() {
        let collection = collection_with(0);
        let encoder = InMemoryEncoder::new(8, 1);
        assert!(sample(&collection, &encoder, &EncoderOptions::default(), 1).is_err());
    }
}
