/*
 * SPDX-FileCopyrightText: 2024 The colbert-index Authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The linear-algebra backend seam: an accelerator abstraction.
//!
//! Centroid assignment and the k-means update are the only hot kernels;
//! they are abstracted behind [`LinalgBackend`] so an accelerator
//! implementation can be dropped in without touching the trainer or the
//! chunk encoder. [`CpuBackend`] fans out across cores with `rayon`.

use rayon::prelude::*;

use crate::encoder::Matrix;
use crate::error::{IndexError, Result};

/// Kernels needed by the trainer and chunk encoder.
pub trait LinalgBackend: Send + Sync {
    /// For every column of `points`, find the centroid (column of
    /// `centroids`) maximizing the dot product, and return `(code, score)`
    /// pairs. Ties are broken by the smallest centroid index.
    fn assign(&self, points: &Matrix, centroids: &Matrix) -> Vec<(u32, f32)>;

    /// Recompute each centroid as the mean of its assigned points.
    /// Clusters with no assigned points keep their previous position.
    fn update_centroids(&self, points: &Matrix, assignments: &[u32], centroids: &mut Matrix);
}

/// CPU k-means/assignment backend, parallelized with `rayon`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuBackend;

impl LinalgBackend for CpuBackend {
    fn assign(&self, points: &Matrix, centroids: &Matrix) -> Vec<(u32, f32)> {
        (0..points.cols)
            .into_par_iter()
            .map(|i| {
                let p = points.col(i);
                argmax_dot(p, centroids)
            })
            .collect()
    }

    fn update_centroids(&self, points: &Matrix, assignments: &[u32], centroids: &mut Matrix) {
        let k = centroids.cols;
        let dim = centroids.dim;
        let mut sums = vec![0.0f32; dim * k];
        let mut counts = vec![0u64; k];
        for (i, &code) in assignments.iter().enumerate() {
            let p = points.col(i);
            let base = code as usize * dim;
            for d in 0..dim {
                sums[base + d] += p[d];
            }
            counts[code as usize] += 1;
        }
        for c in 0..k {
            if counts[c] == 0 {
                continue;
            }
            let n = counts[c] as f32;
            let base = c * dim;
            let dst = centroids.col_mut(c);
            for d in 0..dim {
                dst[d] = sums[base + d] / n;
            }
        }
    }
}

/// Find the centroid column maximizing `<point, centroid>`, breaking ties
/// by the smallest index.
pub fn argmax_dot(point: &[f32], centroids: &Matrix) -> (u32, f32) {
    let mut best_code = 0u32;
    let mut best_score = f32::NEG_INFINITY;
    for k in 0..centroids.cols {
        let c = centroids.col(k);
        let mut dot = 0.0f32;
        for d in 0..point.len() {
            dot += point[d] * c[d];
        }
        if dot > best_score {
            best_score = dot;
            best_code = k as u32;
        }
    }
    (best_code, best_score)
}

/// A GPU-backed implementation of [`LinalgBackend`]. Not compiled in by
/// default (the accelerator abstraction is a real trait seam, but this
/// crate does not carry a fabricated GPU dependency); selecting it
/// without the `gpu` feature is a configuration error, validated in
/// `Config::validate`.
#[cfg(feature = "gpu")]
pub struct GpuBackend;

#[cfg(feature = "gpu")]
impl LinalgBackend for GpuBackend {
    fn assign(&self, _points: &Matrix, _centroids: &Matrix) -> Vec<(u32, f32)> {
        unimplemented!("gpu backend is a seam, not a shipped implementation")
    }

    fn update_centroids(&self, _points: &Matrix, _assignments: &[u32], _centroids: &mut Matrix) {
        unimplemented!("gpu backend is a seam, not a shipped implementation")
    }
}

/// Select the configured backend. Returns an error if `use_gpu` is set but
/// the `gpu` feature was not compiled in (mirrors `Config::validate`, kept
/// here too since library callers may construct a backend directly).
pub fn select_backend(use_gpu: bool) -> Result<Box<dyn LinalgBackend>> {
    if use_gpu {
        #[cfg(feature = "gpu")]
        {
            return Ok(Box::new(GpuBackend));
        }
        #[cfg(not(feature = "gpu"))]
        {
            return Err(IndexError::config(
                "use_gpu requested but the crate was built without the `gpu` feature",
            ));
        }
    }
    Ok(Box::new(CpuBackend))
}

/// The type-7 quantile (linear interpolation between order statistics),
/// matching `numpy`/R's default convention.
///
/// `data` need not be sorted; a sorted copy is taken internally. `q` is in
/// `[0, 1]`.
pub fn quantile_type7(data: &[f32], q: f64) -> Result<f32> {
    if data.is_empty() {
        return Err(IndexError::numeric(
            "cannot compute a quantile of an empty sample",
        ));
    }
    let mut sorted: Vec<f32> = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("residuals must not be NaN"));
    let n = sorted.len();
    if n == 1 {
        return Ok(sorted[0]);
    }
    let h = q * (n as f64 - 1.0);
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    let lo = lo.min(n - 1);
    let hi = hi.min(n - 1);
    let frac = (h - lo as f64) as f32;
    Ok(sorted[lo] + frac * (sorted[hi] - sorted[lo]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_dot_breaks_ties_by_smallest_index() {
        let centroids = Matrix {
            dim: 2,
            cols: 2,
            data: vec![1.0, 0.0, 1.0, 0.0],
        };
        let (code, _) = argmax_dot(&[1.0, 0.0], &centroids);
        assert_eq!(code, 0);
    }

    #[test]
    fn quantile_matches_known_values() {
        let data = vec![1.0, 2.0, 3.0, 4.0];
        // type-7 median of [1,2,3,4] is 2.5
        let q = quantile_type7(&data, 0.5).unwrap();
        assert!((q - 2.5).abs() < 1e-6);
    }

    #[test]
    fn quantile_rejects_empty_sample() {
        assert!(quantile_type7(&[], 0.5).is_err());
    }

    #[test]
    fn update_centroids_keeps_empty_clusters_in_place() {
        let points = Matrix {
            dim: 1,
            cols: 2,
            data: vec![10.0, 10.0],
        };
        let assignments = vec![0u32, 0u32];
        let mut centroids = Matrix {
            dim: 1,
            cols: 2,
            data: vec![0.0, 99.0],
        };
        CpuBackend.update_centroids(&points, &assignments, &mut centroids);
        assert_eq!(centroids.col(0), &[10.0]);
        assert_eq!(centroids.col(1), &[99.0]);
    }
}
