/*
 * SPDX-FileCopyrightText: 2024 The colbert-index Authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The Manifest Writer: recomputes each chunk's global embedding offset,
//! rewrites chunk metadata, and runs the on-disk existence check that
//! makes a truncated build detectable.

use std::path::Path;

use crate::chunk::ChunkMetadata;
use crate::error::{IndexError, Result};

/// Recompute `embedding_offset` for every chunk from cumulative sums
/// (offset of chunk 1 is 1) and rewrite each `i.metadata.json`.
pub fn finalize_chunk_offsets(index_path: &Path, metas: &mut [ChunkMetadata]) -> Result<()> {
    let mut running = 1usize;
    for meta in metas.iter_mut() {
        meta.embedding_offset = running;
        running += meta.num_embeddings;
    }
    for (idx, meta) in metas.iter().enumerate() {
        let chunk_idx = idx + 1;
        let path = index_path.join(format!("{chunk_idx}.metadata.json"));
        let json = serde_json::to_string_pretty(meta)
            .map_err(|e| IndexError::io(&path, "serialize chunk metadata", std::io::Error::other(e)))?;
        std::fs::write(&path, json).map_err(|e| IndexError::io(&path, "rewrite chunk metadata", e))?;
    }
    Ok(())
}

/// Every filename expected under `index_path` once a build of
/// `num_chunks` chunks has completed.
pub fn expected_files(num_chunks: usize) -> Vec<String> {
    let mut files = vec![
        "config.json".to_string(),
        "plan.json".to_string(),
        "centroids".to_string(),
        "bucket_cutoffs".to_string(),
        "bucket_weights".to_string(),
        "avg_residual".to_string(),
        "ivf".to_string(),
        "ivf_lengths".to_string(),
    ];
    for i in 1..=num_chunks {
        files.push(format!("{i}.codes"));
        files.push(format!("{i}.residuals"));
        files.push(format!("doclens.{i}"));
        files.push(format!("{i}.metadata.json"));
    }
    files
}

/// Run the existence check. Returns `Ok(())` if every expected file is
/// present, otherwise an [`IndexError::Integrity`] listing every path
/// that is missing (not just the first).
pub fn check_existence(index_path: &Path, num_chunks: usize) -> Result<()> {
    let missing: Vec<String> = expected_files(num_chunks)
        .into_iter()
        .filter(|name| !index_path.join(name).is_file())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(IndexError::Integrity { missing })
    }
}
