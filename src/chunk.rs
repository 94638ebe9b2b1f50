/*
 * SPDX-FileCopyrightText: 2024 The colbert-index Authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The Chunk Encoder: streams the collection in fixed-size passage
//! batches, compresses each embedding into a `(centroid code, quantized
//! residual)` pair, and persists one chunk per batch.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::bitpack;
use crate::collection::Collection;
use crate::encoder::{Encoder, EncoderOptions, Matrix};
use crate::error::{IndexError, Result};
use crate::linalg::LinalgBackend;
use crate::tensor;

/// Metadata persisted alongside each chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    /// 1-based id of the first passage in this chunk.
    pub passage_offset: usize,
    /// Number of passages in this chunk.
    pub num_passages: usize,
    /// Number of embeddings (`sum(doclens)`) in this chunk.
    pub num_embeddings: usize,
    /// Global 1-based id of this chunk's first embedding. Placeholder
    /// until the Manifest Writer recomputes it from cumulative sums.
    pub embedding_offset: usize,
}

struct EncodedChunk {
    chunk_idx: usize,
    passage_offset: usize,
    num_passages: usize,
    doclens: Vec<usize>,
    codes: Vec<u32>,
    residuals: Vec<u8>,
    bytes_per_embedding: usize,
}

/// Encode and persist every chunk of the collection.
///
/// Returns each chunk's metadata (with `embedding_offset` left at 0; the
/// Manifest Writer fills it in once every chunk's size is known).
pub fn encode_collection(
    index_path: &Path,
    collection: &Collection,
    encoder: &dyn Encoder,
    encoder_options: &EncoderOptions,
    backend: &dyn LinalgBackend,
    centroids: &Matrix,
    bucket_cutoffs: &[f32],
    nbits: u32,
    chunksize: usize,
    index_bsize: usize,
    num_chunks: usize,
) -> Result<Vec<ChunkMetadata>> {
    let mut metas = Vec::with_capacity(num_chunks);

    #[allow(clippy::too_many_arguments)]
    fn encode_one(
        collection: &Collection,
        encoder: &dyn Encoder,
        encoder_options: &EncoderOptions,
        backend: &dyn LinalgBackend,
        centroids: &Matrix,
        bucket_cutoffs: &[f32],
        nbits: u32,
        chunksize: usize,
        index_bsize: usize,
        chunk_idx: usize,
    ) -> Result<EncodedChunk> {
        encode_chunk(
            collection,
            encoder,
            encoder_options,
            backend,
            centroids,
            bucket_cutoffs,
            nbits,
            chunksize,
            index_bsize,
            chunk_idx,
        )
    }

    // Bounded-concurrency pipeline: the next chunk's (blocking) encoder
    // call overlaps with persisting the current chunk's compressed data,
    // one chunk of look-ahead so memory stays bounded to a single chunk's
    // embeddings at a time.
    let mut current = encode_one(
        collection, encoder, encoder_options, backend, centroids, bucket_cutoffs, nbits, chunksize,
        index_bsize, 1,
    )?;
    for chunk_idx in 1..=num_chunks {
        let (persisted, lookahead): (Result<()>, Option<Result<EncodedChunk>>) = if chunk_idx < num_chunks {
            rayon::join(
                || persist_chunk(index_path, &current),
                || {
                    Some(encode_one(
                        collection,
                        encoder,
                        encoder_options,
                        backend,
                        centroids,
                        bucket_cutoffs,
                        nbits,
                        chunksize,
                        index_bsize,
                        chunk_idx + 1,
                    ))
                },
            )
        } else {
            (persist_chunk(index_path, &current), None)
        };
        persisted?;
        metas.push(ChunkMetadata {
            passage_offset: current.passage_offset,
            num_passages: current.num_passages,
            num_embeddings: current.doclens.iter().sum(),
            embedding_offset: 0,
        });
        if let Some(next) = lookahead {
            current = next?;
        }
    }

    Ok(metas)
}

#[allow(clippy::too_many_arguments)]
fn encode_chunk(
    collection: &Collection,
    encoder: &dyn Encoder,
    encoder_options: &EncoderOptions,
    backend: &dyn LinalgBackend,
    centroids: &Matrix,
    bucket_cutoffs: &[f32],
    nbits: u32,
    chunksize: usize,
    index_bsize: usize,
    chunk_idx: usize,
) -> Result<EncodedChunk> {
    let passage_offset = 1 + (chunk_idx - 1) * chunksize;
    let passage_end = collection.num_docs().min(passage_offset + chunksize - 1);
    let num_passages = passage_end + 1 - passage_offset;

    let mut doclens = Vec::with_capacity(num_passages);
    let mut embeddings: Vec<Matrix> = Vec::new();

    // `index_bsize` passages per encoder call, each a contiguous sub-range
    // of this chunk's passage ids.
    let mut batch_start = passage_offset;
    while batch_start <= passage_end {
        let batch_end = (batch_start + index_bsize - 1).min(passage_end);
        let texts = collection.get_range(batch_start, batch_end)?;
        let (matrix, batch_doclens) = encoder.encode(&texts, encoder_options)?;
        let total: usize = batch_doclens.iter().sum();
        if total != matrix.cols {
            return Err(IndexError::Encoder {
                source: anyhow::anyhow!(
                    "encoder returned {} embeddings but doclens sum to {total}",
                    matrix.cols
                ),
            });
        }
        doclens.extend(batch_doclens);
        embeddings.push(matrix);
        batch_start = batch_end + 1;
    }

    let chunk_matrix = concat_columns(&embeddings, centroids.dim);
    let n = chunk_matrix.cols;
    debug_assert_eq!(n, doclens.iter().sum::<usize>());

    let assignments = backend.assign(&chunk_matrix, centroids);
    let bytes_per_embedding = bitpack::bytes_per_embedding(centroids.dim, nbits);

    let residual_chunks: Vec<Vec<u8>> = (0..n)
        .into_par_iter()
        .map(|col| {
            let e = chunk_matrix.col(col);
            let (code, _) = assignments[col];
            let centroid = centroids.col(code as usize);
            let mut bucket_codes = Vec::with_capacity(centroids.dim);
            for d in 0..centroids.dim {
                let rho = e[d] - centroid[d];
                bucket_codes.push(quantize_component(rho, bucket_cutoffs));
            }
            bitpack::pack_codes(&bucket_codes, nbits)
        })
        .collect();

    let codes: Vec<u32> = assignments.iter().map(|&(c, _)| c).collect();
    let mut residuals = Vec::with_capacity(bytes_per_embedding * n);
    for r in residual_chunks {
        residuals.extend_from_slice(&r);
    }

    Ok(EncodedChunk {
        chunk_idx,
        passage_offset,
        num_passages,
        doclens,
        codes,
        residuals,
        bytes_per_embedding,
    })
}

/// Bucket index for one residual component: `count(cutoffs <= rho)`,
/// i.e. the half-open interval `(cuts[b-1], cuts[b]]` that contains it.
/// `cutoffs` is strictly increasing, so this is a partition point.
fn quantize_component(rho: f32, cutoffs: &[f32]) -> u32 {
    cutoffs.partition_point(|&c| c <= rho) as u32
}

fn concat_columns(mats: &[Matrix], dim: usize) -> Matrix {
    let total: usize = mats.iter().map(|m| m.cols).sum();
    let mut out = Matrix::zeros(dim, total);
    let mut col = 0;
    for m in mats {
        for i in 0..m.cols {
            out.col_mut(col).copy_from_slice(m.col(i));
            col += 1;
        }
    }
    out
}

fn persist_chunk(index_path: &Path, chunk: &EncodedChunk) -> Result<()> {
    let i = chunk.chunk_idx;
    persist_atomic(index_path, &format!("{i}.codes"), |path| {
        tensor::write_u32(path, &[chunk.codes.len()], &chunk.codes)
    })?;
    persist_atomic(index_path, &format!("{i}.residuals"), |path| {
        tensor::write_bytes(path, &[chunk.bytes_per_embedding, chunk.codes.len()], &chunk.residuals)
    })?;
    let doclens_u32: Vec<u32> = chunk.doclens.iter().map(|&d| d as u32).collect();
    persist_atomic(index_path, &format!("doclens.{i}"), |path| {
        tensor::write_u32(path, &[doclens_u32.len()], &doclens_u32)
    })?;

    let metadata = ChunkMetadata {
        passage_offset: chunk.passage_offset,
        num_passages: chunk.num_passages,
        num_embeddings: chunk.codes.len(),
        embedding_offset: 0,
    };
    let meta_path = index_path.join(format!("{i}.metadata.json"));
    let tmp = tempfile::NamedTempFile::new_in(index_path)
        .map_err(|e| IndexError::io(index_path, "create temp file for chunk metadata", e))?;
    serde_json::to_writer_pretty(tmp.as_file(), &metadata)
        .map_err(|e| IndexError::io(&meta_path, "serialize chunk metadata", std::io::Error::other(e)))?;
    tmp.persist(&meta_path)
        .map_err(|e| IndexError::io(&meta_path, "persist chunk metadata", e.error))?;

    Ok(())
}

fn persist_atomic(
    index_path: &Path,
    filename: &str,
    write: impl FnOnce(&Path) -> Result<()>,
) -> Result<()> {
    let final_path = index_path.join(filename);
    let tmp = tempfile::NamedTempFile::new_in(index_path)
        .map_err(|e| IndexError::io(index_path, "create temp file for chunk output", e))?;
    let tmp_path: PathBuf = tmp.path().to_path_buf();
    write(&tmp_path)?;
    tmp.persist(&final_path)
        .map_err(|e| IndexError::io(&final_path, "persist chunk output", e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::InMemoryEncoder;
    use crate::linalg::CpuBackend;
    use std::io::Write;

    fn collection_with(n: usize) -> Collection {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        for i in 0..n {
            writeln!(f, "passage {i} has some text in it").unwrap();
        }
        Collection::load(f.path()).unwrap()
    }

    #[test]
    fn chunk_lengths_match_doclens_and_residuals() {
        let dim = 8;
        let nbits = 2;
        let collection = collection_with(20);
        let encoder = InMemoryEncoder::new(dim, 1);
        let centroids = Matrix {
            dim,
            cols: 4,
            data: (0..dim * 4).map(|i| if i % (dim + 1) == 0 { 1.0 } else { 0.0 }).collect(),
        };
        let bucket_cutoffs = vec![-0.5, 0.0, 0.5];
        let dir = tempfile::tempdir().unwrap();
        let metas = encode_collection(
            dir.path(),
            &collection,
            &encoder,
            &EncoderOptions::default(),
            &CpuBackend,
            &centroids,
            &bucket_cutoffs,
            nbits,
            7,
            5,
            20usize.div_ceil(7),
        )
        .unwrap();

        for (idx, meta) in metas.iter().enumerate() {
            let chunk_idx = idx + 1;
            let codes = tensor::Tensor::load(dir.path().join(format!("{chunk_idx}.codes"))).unwrap();
            let n = codes.as_u32().unwrap().len();
            assert_eq!(n, meta.num_embeddings);
            let residuals = tensor::Tensor::load(dir.path().join(format!("{chunk_idx}.residuals"))).unwrap();
            assert_eq!(residuals.shape, vec![bitpack::bytes_per_embedding(dim, nbits), n]);
        }
    }

    #[test]
    fn quantize_component_half_open_intervals() {
        let cutoffs = vec![-0.5f32, 0.0, 0.5];
        assert_eq!(quantize_component(-1.0, &cutoffs), 0);
        assert_eq!(quantize_component(-0.5, &cutoffs), 1);
        assert_eq!(quantize_component(-0.1, &cutoffs), 1);
        assert_eq!(quantize_component(0.0, &cutoffs), 2);
        assert_eq!(quantize_component(0.4, &cutoffs), 2);
        assert_eq!(quantize_component(0.5, &cutoffs), 3);
        assert_eq!(quantize_component(10.0, &cutoffs), 3);
    }
}
