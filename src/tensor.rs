/*
 * SPDX-FileCopyrightText: 2024 The colbert-index Authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! Self-describing little-endian tensor files.
//!
//! Every numeric array on disk (`centroids`, `bucket_cutoffs`,
//! `bucket_weights`, `avg_residual`, `i.codes`, `ivf`, `ivf_lengths`, ...)
//! uses the same small header + raw-bytes container, so one reader/writer
//! pair covers the whole layout. Reads are zero-copy via `mmap-rs`; writes
//! go through a plain buffered writer.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use mmap_rs::{Mmap, MmapOptions};

use crate::error::{IndexError, Result};

const MAGIC: &[u8; 4] = b"CIT1";

/// Scalar element type tags stored in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DType {
    /// 32-bit IEEE float, little-endian.
    F32 = 0,
    /// 32-bit unsigned integer, little-endian.
    U32 = 1,
    /// Raw bytes (used for packed residual bitstreams).
    U8 = 2,
}

impl DType {
    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(DType::F32),
            1 => Ok(DType::U32),
            2 => Ok(DType::U8),
            other => Err(IndexError::Io {
                path: "<tensor header>".into(),
                operation: "parse dtype tag",
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("unknown dtype tag {other}"),
                ),
            }),
        }
    }

    fn element_size(self) -> usize {
        match self {
            DType::F32 | DType::U32 => 4,
            DType::U8 => 1,
        }
    }
}

/// Write a flat `f32` array as a tensor file with the given shape.
pub fn write_f32(path: impl AsRef<Path>, shape: &[usize], data: &[f32]) -> Result<()> {
    write_raw(path, DType::F32, shape, bytemuck_f32_to_le_bytes(data))
}

/// Write a flat `u32` array as a tensor file with the given shape.
pub fn write_u32(path: impl AsRef<Path>, shape: &[usize], data: &[u32]) -> Result<()> {
    write_raw(path, DType::U32, shape, bytemuck_u32_to_le_bytes(data))
}

/// Write a raw byte buffer (e.g. packed residuals) as a tensor file.
pub fn write_bytes(path: impl AsRef<Path>, shape: &[usize], data: &[u8]) -> Result<()> {
    write_raw(path, DType::U8, shape, data.to_vec())
}

fn write_raw(path: impl AsRef<Path>, dtype: DType, shape: &[usize], payload: Vec<u8>) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| IndexError::io(path, "create tensor file", e))?;
    let mut w = BufWriter::new(file);
    let write_err = |e: std::io::Error| IndexError::io(path, "write tensor file", e);
    w.write_all(MAGIC).map_err(write_err)?;
    w.write_all(&[dtype as u8]).map_err(write_err)?;
    w.write_all(&(shape.len() as u32).to_le_bytes())
        .map_err(write_err)?;
    for &dim in shape {
        w.write_all(&(dim as u64).to_le_bytes()).map_err(write_err)?;
    }
    w.write_all(&payload).map_err(write_err)?;
    w.flush().map_err(write_err)?;
    Ok(())
}

/// A tensor loaded (mmap-backed) from disk.
pub struct Tensor {
    /// Element type.
    pub dtype: DType,
    /// Shape as stored in the header.
    pub shape: Vec<usize>,
    mmap: Arc<Mmap>,
    data_offset: usize,
}

impl Tensor {
    /// Memory-map a tensor file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| IndexError::io(path, "open tensor file", e))?;
        let len = file
            .metadata()
            .map_err(|e| IndexError::io(path, "stat tensor file", e))?
            .len() as usize;
        let mmap = unsafe {
            MmapOptions::new(len)
                .map_err(|e| tensor_map_err(path, e))?
                .with_file(&file, 0)
                .map()
                .map_err(|e| tensor_map_err(path, e))?
        };
        let mmap = Arc::new(mmap);
        let bytes: &[u8] = unsafe { std::slice::from_raw_parts(mmap.as_ptr(), mmap.len()) };
        if bytes.len() < 4 + 1 + 4 || &bytes[0..4] != MAGIC {
            return Err(IndexError::io(
                path,
                "parse tensor header",
                std::io::Error::new(std::io::ErrorKind::InvalidData, "bad magic"),
            ));
        }
        let dtype = DType::from_tag(bytes[4])?;
        let ndim = u32::from_le_bytes(bytes[5..9].try_into().unwrap()) as usize;
        let mut shape = Vec::with_capacity(ndim);
        let mut offset = 9;
        for _ in 0..ndim {
            let v = u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap()) as usize;
            shape.push(v);
            offset += 8;
        }
        Ok(Tensor {
            dtype,
            shape,
            mmap,
            data_offset: offset,
        })
    }

    /// Total element count implied by `shape`.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    /// Whether the tensor has zero elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn raw(&self) -> &[u8] {
        let bytes: &[u8] = unsafe { std::slice::from_raw_parts(self.mmap.as_ptr(), self.mmap.len()) };
        &bytes[self.data_offset..]
    }

    /// Read out the tensor as `f32`s. Errors if `dtype != F32`.
    pub fn as_f32(&self) -> Result<Vec<f32>> {
        self.expect_dtype(DType::F32)?;
        let raw = self.raw();
        let n = self.len();
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let b = &raw[i * 4..i * 4 + 4];
            out.push(f32::from_le_bytes(b.try_into().unwrap()));
        }
        Ok(out)
    }

    /// Read out the tensor as `u32`s. Errors if `dtype != U32`.
    pub fn as_u32(&self) -> Result<Vec<u32>> {
        self.expect_dtype(DType::U32)?;
        let raw = self.raw();
        let n = self.len();
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let b = &raw[i * 4..i * 4 + 4];
            out.push(u32::from_le_bytes(b.try_into().unwrap()));
        }
        Ok(out)
    }

    /// Read out the tensor as raw bytes. Errors if `dtype != U8`.
    pub fn as_bytes(&self) -> Result<&[u8]> {
        self.expect_dtype(DType::U8)?;
        Ok(&self.raw()[..self.len()])
    }

    fn expect_dtype(&self, want: DType) -> Result<()> {
        if self.dtype != want {
            return Err(IndexError::Io {
                path: "<tensor>".into(),
                operation: "dtype check",
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "tensor dtype mismatch",
                ),
            });
        }
        Ok(())
    }
}

fn tensor_map_err(path: &Path, e: mmap_rs::Error) -> IndexError {
    IndexError::io(
        path,
        "mmap tensor file",
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
    )
}

fn bytemuck_f32_to_le_bytes(data: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 4);
    for &v in data {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

fn bytemuck_u32_to_le_bytes(data: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 4);
    for &v in data {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn f32_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("centroids");
        let data = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        write_f32(&path, &[2, 3], &data).unwrap();
        let t = Tensor::load(&path).unwrap();
        assert_eq!(t.shape, vec![2, 3]);
        assert_eq!(t.as_f32().unwrap(), data);
    }

    #[test]
    fn u32_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ivf");
        let data: Vec<u32> = (0..100).collect();
        write_u32(&path, &[100], &data).unwrap();
        let t = Tensor::load(&path).unwrap();
        assert_eq!(t.as_u32().unwrap(), data);
    }

    #[test]
    fn bytes_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("residuals");
        let data: Vec<u8> = (0..=255u8).collect();
        write_bytes(&path, &[32, 8], &data).unwrap();
        let t = Tensor::load(&path).unwrap();
        assert_eq!(t.as_bytes().unwrap(), &data[..]);
    }

    #[test]
    fn wrong_dtype_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("centroids");
        write_f32(&path, &[4], &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let t = Tensor::load(&path).unwrap();
        assert!(t.as_u32().is_err());
    }
}
