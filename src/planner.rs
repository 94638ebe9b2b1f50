/*
 * SPDX-FileCopyrightText: 2024 The colbert-index Authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Sizing decisions made once, before training.
//!
//! The Plan drives every downstream stage: how many passages go in a
//! chunk, how many chunks exist, and how many centroids (partitions) the
//! Trainer should fit.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Sizing decisions for one indexing run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    /// Passages per chunk.
    pub chunksize: usize,
    /// Number of chunks the collection is split into.
    pub num_chunks: usize,
    /// Number of centroids (`K`).
    pub num_partitions: usize,
    /// Total number of passages.
    pub num_documents: usize,
    /// Estimated total embedding count (`num_documents * avg_doclen_est`).
    pub num_embeddings_est: f64,
    /// Average document length observed in the sample.
    pub avg_doclen_est: f64,
}

/// Compute the plan.
///
/// `sample_size` is `Ns`, the number of passages drawn for clustering by
/// the Sampler — it upper-bounds `num_partitions`.
pub fn plan(
    num_documents: usize,
    avg_doclen_est: f64,
    sample_size: usize,
    chunksize_override: Option<usize>,
    nranks: usize,
) -> Result<Plan> {
    let chunksize = chunksize_override
        .unwrap_or_else(|| 25_000.min(1 + num_documents / nranks.max(1)));
    let num_chunks = num_documents.div_ceil(chunksize).max(1);
    let num_embeddings_est = num_documents as f64 * avg_doclen_est;
    let num_partitions = compute_num_partitions(sample_size, num_embeddings_est);

    Ok(Plan {
        chunksize,
        num_chunks,
        num_partitions,
        num_documents,
        num_embeddings_est,
        avg_doclen_est,
    })
}

/// `num_partitions = min(Ns, 2^floor(log2(16 * sqrt(num_embeddings_est))))`,
/// rounded down to the nearest power of two when the `Ns` cap bites.
/// Tie-break: a non-positive `num_embeddings_est` yields `num_partitions
/// = 1`.
fn compute_num_partitions(sample_size: usize, num_embeddings_est: f64) -> usize {
    if num_embeddings_est <= 0.0 {
        return 1;
    }
    let raw_exponent = (16.0 * num_embeddings_est.sqrt()).log2().floor();
    let raw: u64 = if raw_exponent < 0.0 {
        1
    } else {
        1u64 << (raw_exponent as u32).min(62)
    };
    let capped = sample_size.max(1).min(raw as usize).max(1);
    largest_power_of_two_leq(capped)
}

fn largest_power_of_two_leq(n: usize) -> usize {
    if n <= 1 {
        return 1;
    }
    1usize << (usize::BITS - 1 - n.leading_zeros())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_boundary_example() {
        let p = plan(50_001, 120.0, 1000, None, 1).unwrap();
        assert_eq!(p.chunksize, 25_000);
        assert_eq!(p.num_chunks, 3);
    }

    #[test]
    fn tiny_collection_example() {
        // N=10 docs, avg len 5: Ns=10 (the sample size):
        // min(10, 2^floor(log2(16*sqrt(50)))) = min(10, 64) = 10, rounded
        // down to the nearest power of two = 8.
        let p = plan(10, 5.0, 10, None, 1).unwrap();
        assert_eq!(p.num_chunks, 1);
        assert_eq!(p.num_partitions, 8);
    }

    #[test]
    fn non_positive_embeddings_estimate_yields_one_partition() {
        let p = plan(5, 0.0, 5, None, 1).unwrap();
        assert_eq!(p.num_partitions, 1);
    }

    #[test]
    fn num_partitions_is_always_a_power_of_two_within_bounds() {
        for (docs, avg, ns) in [(1usize, 1.0, 1usize), (1_000_000, 200.0, 50_000), (2, 1.0, 2)] {
            let p = plan(docs, avg, ns, None, 1).unwrap();
            assert!(p.num_partitions >= 1);
            assert!(p.num_partitions <= ns.max(1));
            assert_eq!(p.num_partitions.count_ones(), 1, "not a power of two: {}", p.num_partitions);
        }
    }

    #[test]
    fn chunksize_override_is_respected() {
        let p = plan(1000, 10.0, 100, Some(37), 1).unwrap();
        assert_eq!(p.chunksize, 37);
        assert_eq!(p.num_chunks, 1000usize.div_ceil(37));
    }
}
