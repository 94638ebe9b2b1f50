/*
 * SPDX-FileCopyrightText: 2024 The colbert-index Authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The Trainer: k-means clustering over the training sample, and residual
//! codec calibration over the held-out split.

use dsi_progress_logger::prelude::*;
use rand::SeedableRng;

use crate::encoder::Matrix;
use crate::error::{IndexError, Result};
use crate::linalg::{quantile_type7, LinalgBackend};

/// Centroids and residual codec produced by training.
pub struct TrainedCodec {
    /// `D x K` centroid matrix.
    pub centroids: Matrix,
    /// `2^nbits - 1` strictly increasing cutoffs.
    pub bucket_cutoffs: Vec<f32>,
    /// `2^nbits` reconstruction weights.
    pub bucket_weights: Vec<f32>,
    /// Scalar mean absolute residual over the held-out split.
    pub avg_residual: f32,
}

/// Run k-means on `train` to produce `k` centroids.
///
/// Initial centroids are `k` distinct columns of `train` drawn uniformly
/// at random from `seed`. Empty clusters keep their previous position
/// (no re-seeding).
pub fn kmeans(
    train: &Matrix,
    k: usize,
    niters: usize,
    backend: &dyn LinalgBackend,
    seed: u64,
) -> Result<Matrix> {
    if train.cols == 0 {
        return Err(IndexError::numeric("cannot run k-means on an empty training sample"));
    }
    if k == 0 {
        return Err(IndexError::config("num_partitions must be >= 1"));
    }

    let mut rng = rand::rngs::SmallRng::seed_from_u64(seed);
    let init = rand::seq::index::sample(&mut rng, train.cols, k.min(train.cols));
    let mut centroids = Matrix::zeros(train.dim, k);
    for (dst, src) in init.iter().enumerate() {
        centroids.col_mut(dst).copy_from_slice(train.col(src));
    }
    // If k > train.cols (only possible when the Planner's cap was
    // mis-sized upstream), the remaining centroids stay at zero and are
    // simply never assigned to during training.

    let mut pl = ProgressLogger::default();
    pl.item_name("iteration").display_memory(true);
    pl.start("running k-means");

    for _iter in 0..niters {
        let assignments = backend.assign(train, &centroids);
        let inertia: f64 = assignments.iter().map(|&(_, score)| -(score as f64)).sum();
        log::debug!("k-means iteration {_iter}: inertia={inertia:.3}");
        let codes: Vec<u32> = assignments.iter().map(|&(c, _)| c).collect();
        backend.update_centroids(train, &codes, &mut centroids);
        pl.update();
    }
    pl.done();
    log::info!("k-means converged after {niters} iterations over {} points into {k} centroids", train.cols);

    Ok(centroids)
}

/// Calibrate the residual codec against the held-out split.
pub fn calibrate_residual_codec(
    heldout: &Matrix,
    centroids: &Matrix,
    nbits: u32,
    backend: &dyn LinalgBackend,
) -> Result<TrainedCodec> {
    if heldout.cols == 0 {
        return Err(IndexError::numeric("cannot calibrate the residual codec on an empty held-out split"));
    }
    let assignments = backend.assign(heldout, centroids);

    let dim = heldout.dim;
    let mut residuals_flat: Vec<f32> = Vec::with_capacity(dim * heldout.cols);
    for (col, &(code, _)) in assignments.iter().enumerate() {
        let h = heldout.col(col);
        let c = centroids.col(code as usize);
        for d in 0..dim {
            residuals_flat.push(h[d] - c[d]);
        }
    }

    let m = 1usize << nbits;
    if residuals_flat.len() < m {
        return Err(IndexError::numeric(format!(
            "residual calibration needs at least {m} residual components, got {}",
            residuals_flat.len()
        )));
    }

    let avg_residual = residuals_flat.iter().map(|r| r.abs() as f64).sum::<f64>() as f32
        / residuals_flat.len() as f32;

    let mut bucket_cutoffs = Vec::with_capacity(m - 1);
    for i in 1..m {
        bucket_cutoffs.push(quantile_type7(&residuals_flat, i as f64 / m as f64)?);
    }
    let mut bucket_weights = Vec::with_capacity(m);
    for i in 0..m {
        bucket_weights.push(quantile_type7(&residuals_flat, (i as f64 + 0.5) / m as f64)?);
    }

    log::info!(
        "residual codec calibrated from {} held-out vectors: avg_residual={avg_residual:.4}",
        heldout.cols
    );

    Ok(TrainedCodec {
        centroids: centroids.clone(),
        bucket_cutoffs,
        bucket_weights,
        avg_residual,
    })
}
