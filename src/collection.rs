/*
 * SPDX-FileCopyrightText: 2024 The colbert-index Authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

//! The passage collection: one passage per line (`collection_path`).
//!
//! The core only ever needs to resolve a passage id to its text and to know
//! how many passages exist; it does not tokenize or otherwise interpret the
//! text, so this module stays a thin line-indexed reader.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{IndexError, Result};

/// A loaded passage collection, indexed by 1-based passage id.
#[derive(Debug, Clone)]
pub struct Collection {
    passages: Vec<String>,
}

impl Collection {
    /// Load a collection from a file with one passage per line.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| IndexError::io(path, "open collection", e))?;
        let reader = BufReader::new(file);
        let mut passages = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(|e| IndexError::io(path, "read collection", e))?;
            passages.push(line);
        }
        Ok(Collection { passages })
    }

    /// Number of passages in the collection.
    pub fn num_docs(&self) -> usize {
        self.passages.len()
    }

    /// Resolve a 1-based passage id to its text.
    pub fn get(&self, pid: usize) -> Result<&str> {
        if pid == 0 || pid > self.passages.len() {
            return Err(IndexError::config(format!(
                "passage id {pid} is out of range for a collection of {} documents",
                self.passages.len()
            )));
        }
        Ok(self.passages[pid - 1].as_str())
    }

    /// Resolve a contiguous range `[start..=end]` of 1-based passage ids to
    /// owned strings, in order, as the Chunk Encoder consumes them.
    pub fn get_range(&self, start: usize, end: usize) -> Result<Vec<String>> {
        let mut out = Vec::with_capacity(end.saturating_sub(start) + 1);
        for pid in start..=end {
            out.push(self.get(pid)?.to_string());
        }
        Ok(out)
    }

    /// Resolve an arbitrary list of 1-based passage ids to owned strings,
    /// preserving the caller's order (used by the Sampler, whose ids are
    /// not contiguous).
    pub fn get_many(&self, ids: &[usize]) -> Result<Vec<String>> {
        ids.iter().map(|&pid| self.get(pid).map(str::to_string)).collect()
    }
}
