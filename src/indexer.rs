/*
 * SPDX-FileCopyrightText: 2024 The colbert-index Authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The Orchestrator: the single entry point both the library API and the
//! CLI binary call. Drives the six pipeline stages in a fixed order and
//! never overlaps them.

use std::path::Path;

use crate::chunk;
use crate::collection::Collection;
use crate::config::Config;
use crate::encoder::{Encoder, EncoderOptions};
use crate::error::{IndexError, Result};
use crate::ivf;
use crate::linalg;
use crate::manifest;
use crate::planner;
use crate::sampler;
use crate::tensor;
use crate::trainer;

/// Build a complete index at `config.index_path`, running the full
/// pipeline in order: Sampler → Planner → Trainer → Chunk Encoder → IVF
/// Builder → Manifest Writer.
pub fn build(config: &Config, encoder: &dyn Encoder) -> Result<()> {
    config.validate()?;

    let index_path = config.index_path.as_path();
    std::fs::create_dir_all(index_path)
        .map_err(|e| IndexError::io(index_path, "create index directory", e))?;

    // Written first so a caller inspecting a half-built directory can see
    // what configuration produced it.
    write_config_json(index_path, config)?;

    let collection = Collection::load(&config.collection_path)?;
    let num_docs = collection.num_docs();
    if num_docs == 0 {
        return Err(IndexError::config("cannot build an index over an empty collection"));
    }
    log_environment();

    let encoder_options = EncoderOptions {
        doc_maxlen: config.doc_maxlen,
        doc_token: config.doc_token.clone(),
        skiplist: config.skiplist.clone(),
        mask_punctuation: config.mask_punctuation,
    };

    log::info!("sampling {num_docs} documents for clustering and residual calibration");
    let sample = sampler::sample(&collection, encoder, &encoder_options, config.seed)?;

    let plan = planner::plan(
        num_docs,
        sample.avg_doclen_est,
        sample.sample_size,
        config.chunksize,
        config.nranks,
    )?;
    write_plan_json(index_path, &plan)?;
    log::info!(
        "plan: {} chunks of {} passages, {} partitions",
        plan.num_chunks, plan.chunksize, plan.num_partitions
    );

    let backend = linalg::select_backend(config.use_gpu)?;

    log::info!("training k-means with {} centroids over {} sample points", plan.num_partitions, sample.train.cols);
    let centroids = trainer::kmeans(&sample.train, plan.num_partitions, config.kmeans_niters, backend.as_ref(), config.seed)?;

    log::info!("calibrating residual codec over {} held-out points", sample.heldout.cols);
    let codec = trainer::calibrate_residual_codec(&sample.heldout, &centroids, config.nbits, backend.as_ref())?;

    tensor::write_f32(index_path.join("centroids"), &[codec.centroids.dim, codec.centroids.cols], &codec.centroids.data)?;
    tensor::write_f32(index_path.join("bucket_cutoffs"), &[codec.bucket_cutoffs.len()], &codec.bucket_cutoffs)?;
    tensor::write_f32(index_path.join("bucket_weights"), &[codec.bucket_weights.len()], &codec.bucket_weights)?;
    tensor::write_f32(index_path.join("avg_residual"), &[1], &[codec.avg_residual])?;

    log::info!("encoding {} chunks", plan.num_chunks);
    let mut chunk_metas = chunk::encode_collection(
        index_path,
        &collection,
        encoder,
        &encoder_options,
        backend.as_ref(),
        &codec.centroids,
        &codec.bucket_cutoffs,
        config.nbits,
        plan.chunksize,
        config.index_bsize,
        plan.num_chunks,
    )?;

    log::info!("building the inverted file over {} partitions", plan.num_partitions);
    let built_ivf = ivf::build(index_path, &chunk_metas, plan.num_partitions)?;
    tensor::write_u32(index_path.join("ivf"), &[built_ivf.ivf.len()], &built_ivf.ivf)?;
    tensor::write_u32(index_path.join("ivf_lengths"), &[built_ivf.ivf_lengths.len()], &built_ivf.ivf_lengths)?;

    manifest::finalize_chunk_offsets(index_path, &mut chunk_metas)?;
    manifest::check_existence(index_path, plan.num_chunks)?;

    log::info!("index build complete at {}", index_path.display());
    Ok(())
}

/// Run only the manifest existence check against an already-built index
/// directory, reading `num_chunks` from its
/// `plan.json`. Exposed for the CLI's `check` subcommand and for callers
/// who terminated mid-build and want to know whether a retry is needed.
pub fn check(index_path: &Path) -> Result<()> {
    let plan_path = index_path.join("plan.json");
    let bytes = std::fs::read(&plan_path).map_err(|e| IndexError::io(&plan_path, "read plan.json", e))?;
    let plan: planner::Plan = serde_json::from_slice(&bytes)
        .map_err(|e| IndexError::io(&plan_path, "parse plan.json", std::io::Error::other(e)))?;
    manifest::check_existence(index_path, plan.num_chunks)
}

/// Log the resources the CPU k-means/assignment kernels will fan out
/// over, reported once at the start of a long-running build.
fn log_environment() {
    let mut sys = sysinfo::System::new();
    sys.refresh_memory();
    log::info!(
        "{} logical cores available, {:.1} GiB total memory",
        num_cpus::get(),
        sys.total_memory() as f64 / (1024.0 * 1024.0 * 1024.0),
    );
}

fn write_config_json(index_path: &Path, config: &Config) -> Result<()> {
    let path = index_path.join("config.json");
    let json = serde_json::to_string_pretty(config)
        .map_err(|e| IndexError::io(&path, "serialize config", std::io::Error::other(e)))?;
    std::fs::write(&path, json).map_err(|e| IndexError::io(&path, "write config.json", e))
}

fn write_plan_json(index_path: &Path, plan: &planner::Plan) -> Result<()> {
    let path = index_path.join("plan.json");
    let json = serde_json::to_string_pretty(plan)
        .map_err(|e| IndexError::io(&path, "serialize plan", std::io::Error::other(e)))?;
    std::fs::write(&path, json).map_err(|e| IndexError::io(&path, "write plan.json", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::InMemoryEncoder;
    use std::io::Write;

    fn write_collection(n: usize) -> tempfile::TempPath {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        for i in 0..n {
            writeln!(f, "this is passage number {i} with enough words to matter").unwrap();
        }
        f.into_temp_path()
    }

    #[test]
    fn end_to_end_build_passes_the_existence_check() {
        let collection_path = write_collection(60);
        let index_dir = tempfile::tempdir().unwrap();
        let config = Config {
            collection_path: collection_path.to_path_buf(),
            index_path: index_dir.path().to_path_buf(),
            dim: 16,
            nbits: 2,
            kmeans_niters: 3,
            index_bsize: 8,
            chunksize: Some(16),
            nranks: 1,
            doc_maxlen: None,
            doc_token: None,
            skiplist: vec![],
            mask_punctuation: false,
            use_gpu: false,
            seed: 42,
        };
        let encoder = InMemoryEncoder::new(config.dim, config.seed);
        build(&config, &encoder).unwrap();
        check(index_dir.path()).unwrap();
    }

    #[test]
    fn check_reports_missing_files_after_truncated_build() {
        let collection_path = write_collection(60);
        let index_dir = tempfile::tempdir().unwrap();
        let config = Config {
            collection_path: collection_path.to_path_buf(),
            index_path: index_dir.path().to_path_buf(),
            dim: 16,
            nbits: 2,
            kmeans_niters: 2,
            index_bsize: 8,
            chunksize: Some(16),
            nranks: 1,
            doc_maxlen: None,
            doc_token: None,
            skiplist: vec![],
            mask_punctuation: false,
            use_gpu: false,
            seed: 1,
        };
        let encoder = InMemoryEncoder::new(config.dim, config.seed);
        build(&config, &encoder).unwrap();
        std::fs::remove_file(index_dir.path().join("2.codes")).unwrap();
        assert!(check(index_dir.path()).is_err());
    }

    #[test]
    fn empty_collection_is_rejected_before_any_stage_runs() {
        let collection_path = write_collection(0);
        let index_dir = tempfile::tempdir().unwrap();
        let config = Config {
            collection_path: collection_path.to_path_buf(),
            index_path: index_dir.path().to_path_buf(),
            dim: 16,
            nbits: 2,
            kmeans_niters: 2,
            index_bsize: 8,
            chunksize: None,
            nranks: 1,
            doc_maxlen: None,
            doc_token: None,
            skiplist: vec![],
            mask_punctuation: false,
            use_gpu: false,
            seed: 1,
        };
        let encoder = InMemoryEncoder::new(config.dim, config.seed);
        assert!(build(&config, &encoder).is_err());
    }
}
