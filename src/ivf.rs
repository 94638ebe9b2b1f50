/*
 * SPDX-FileCopyrightText: 2024 The colbert-index Authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The IVF Builder: groups embeddings by centroid into a single
//! permutation plus per-centroid lengths.

use std::path::Path;

use crate::chunk::ChunkMetadata;
use crate::error::Result;
use crate::tensor;

/// The inverted file: `ivf[p]` is the 1-based global embedding id at
/// sorted position `p`, and `ivf_lengths[k]` is how many embeddings
/// belong to centroid `k`.
pub struct Ivf {
    /// Permutation of `[1..N_total]`, grouped by centroid, ties broken by
    /// ascending global embedding id.
    pub ivf: Vec<u32>,
    /// Per-centroid embedding counts, `ivf_lengths.len() == num_partitions`.
    pub ivf_lengths: Vec<u32>,
}

/// Stream every chunk's `codes` file (in chunk order) into one logical
/// `codes_global` array, then build the IVF with a stable counting sort.
/// Reading chunk files sequentially keeps this to one array materialized,
/// not one array per chunk's embeddings held in memory at once.
pub fn build(index_path: &Path, chunk_metas: &[ChunkMetadata], num_partitions: usize) -> Result<Ivf> {
    let mut codes_global: Vec<u32> = Vec::with_capacity(chunk_metas.iter().map(|m| m.num_embeddings).sum());
    for (idx, meta) in chunk_metas.iter().enumerate() {
        let chunk_idx = idx + 1;
        let tensor = tensor::Tensor::load(index_path.join(format!("{chunk_idx}.codes")))?;
        let codes = tensor.as_u32()?;
        debug_assert_eq!(codes.len(), meta.num_embeddings);
        codes_global.extend(codes);
    }

    Ok(build_from_codes(&codes_global, num_partitions))
}

/// Build the IVF directly from an in-memory `codes_global` array.
pub fn build_from_codes(codes_global: &[u32], num_partitions: usize) -> Ivf {
    let mut counts = vec![0u32; num_partitions];
    for &code in codes_global {
        counts[code as usize] += 1;
    }

    let mut offsets = vec![0u32; num_partitions];
    let mut running = 0u32;
    for k in 0..num_partitions {
        offsets[k] = running;
        running += counts[k];
    }

    let mut ivf = vec![0u32; codes_global.len()];
    for (idx, &code) in codes_global.iter().enumerate() {
        let pos = offsets[code as usize];
        ivf[pos as usize] = (idx + 1) as u32;
        offsets[code as usize] += 1;
    }

    Ivf { ivf, ivf_lengths: counts }
}
