/*
 * SPDX-FileCopyrightText: 2024 The colbert-index Authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Command-line surface: `build` drives the full pipeline, `check` runs
//! only the manifest existence check.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use colbert_index::config::Config;
use colbert_index::encoder::InMemoryEncoder;
use colbert_index::indexer;

#[derive(Parser, Debug)]
#[command(name = "colbert-index", about = "Offline indexing pipeline for a late-interaction vector index.", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a new index directory from a passage collection.
    Build(BuildArgs),
    /// Run the manifest existence check against an already-built index.
    Check(CheckArgs),
    /// Print a shell completion script to stdout.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// One passage per line.
    #[arg(long)]
    collection: PathBuf,
    /// Directory to write the index to.
    #[arg(long)]
    index_path: PathBuf,
    /// Embedding dimension.
    #[arg(long, default_value_t = 128)]
    dim: usize,
    /// Residual bits per dimension.
    #[arg(long, default_value_t = 2)]
    nbits: u32,
    /// K-means iteration cap.
    #[arg(long, default_value_t = 20)]
    kmeans_niters: usize,
    /// Passages per encoder batch.
    #[arg(long, default_value_t = 64)]
    index_bsize: usize,
    /// Passages per chunk; derived from collection size if omitted.
    #[arg(long)]
    chunksize: Option<usize>,
    /// Number of ranks sharing the build (always 1 in this crate).
    #[arg(long, default_value_t = 1)]
    nranks: usize,
    /// Maximum passage length in tokens, passed through to the encoder.
    #[arg(long)]
    doc_maxlen: Option<usize>,
    /// RNG seed for sampling and k-means initialization.
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Index directory to check.
    index_path: PathBuf,
}

/// Run the CLI, mapping any fatal error to a nonzero exit via `anyhow`:
/// zero on success, nonzero on any fatal error.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Build(args) => run_build(args),
        Command::Check(args) => run_check(args),
        Command::Completions { shell } => {
            print_completions(shell);
            Ok(())
        }
    }
}

fn run_build(args: BuildArgs) -> Result<()> {
    // The neural passage encoder is an external collaborator; this binary
    // only ever has the deterministic in-memory one. A build
    // with a real encoder is a library call to `colbert_index::indexer::build`
    // from a binary that links one in.
    let config = Config {
        collection_path: args.collection,
        index_path: args.index_path,
        dim: args.dim,
        nbits: args.nbits,
        kmeans_niters: args.kmeans_niters,
        index_bsize: args.index_bsize,
        chunksize: args.chunksize,
        nranks: args.nranks,
        doc_maxlen: args.doc_maxlen,
        doc_token: None,
        skiplist: Vec::new(),
        mask_punctuation: false,
        use_gpu: false,
        seed: args.seed,
    };
    let encoder = InMemoryEncoder::new(config.dim, config.seed);
    indexer::build(&config, &encoder).context("index build failed")
}

fn run_check(args: CheckArgs) -> Result<()> {
    indexer::check(&args.index_path).context("manifest existence check failed")
}

fn print_completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    clap_complete::generate(shell, &mut Cli::command(), "colbert-index", &mut std::io::stdout());
}
