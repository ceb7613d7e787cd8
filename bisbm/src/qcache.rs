//! Lookup table of restricted integer partition counts.
//!
//! `q(m, n)` is the number of partitions of `m` into at most `n` nonzero
//! parts, the combinatorial term of the "distributed" degree description
//! length. The table is `(E_cap + 1)^2` with `E_cap = min(E, 10_000)`,
//! filled once per run by the standard recurrence
//!
//! ```text
//! q(m, n) = q(m, n - 1) + q(m - n, n),    q(0, n) = 1,    q(m, 0) = 0
//! ```
//!
//! and published to a backing file so that parallel sweep workers can map
//! it read-only. The publish-then-fan-out discipline is: the owner builds
//! and flushes the table before any worker reads it; workers never write.

use anyhow::{bail, Context, Result};
use log::{info, warn};
use memmap2::Mmap;
use ndarray::Array2;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

const E_CAP: usize = 10_000;

enum Table {
    Empty,
    Owned(Array2<u32>),
    Mapped(Mmap),
}

/// Growable, file-backed table of restricted partition counts.
///
/// Owned by one search run; concurrent runs must not share a backing path,
/// which the per-instance temp directory guarantees.
pub struct PartitionCache {
    _dir: TempDir,
    path: PathBuf,
    max_e: usize,
    table: Table,
}

impl PartitionCache {
    /// Create an empty cache sized for a graph with `num_edges` edges.
    pub fn new(num_edges: usize) -> Result<Self> {
        let dir = tempfile::tempdir().context("creating partition-cache directory")?;
        let path = dir.path().join("q_cache.dat");
        Ok(PartitionCache {
            _dir: dir,
            path,
            max_e: num_edges.min(E_CAP),
            table: Table::Empty,
        })
    }

    /// Largest number of half-edges the table covers.
    pub fn max_half_edges(&self) -> usize {
        self.max_e
    }

    /// Whether the table has been filled for this run.
    pub fn is_built(&self) -> bool {
        !matches!(self.table, Table::Empty)
    }

    /// Fill the table and publish it to the backing file.
    pub fn build(&mut self) -> Result<()> {
        let table = fill_table(self.max_e);
        self.publish(&table)?;
        self.table = Table::Owned(table);
        info!(
            "partition cache built: ({} + 1)^2 entries at {}",
            self.max_e,
            self.path.display()
        );
        Ok(())
    }

    /// Drop any in-memory copy and rebuild from scratch.
    pub fn rebuild(&mut self) -> Result<()> {
        self.table = Table::Empty;
        self.build()
    }

    /// Switch to the read-only mapped view of the published table.
    ///
    /// Requires a prior [`build`](Self::build); this is what sweep workers
    /// observe during a parallel batch.
    pub fn map_readonly(&mut self) -> Result<()> {
        if !self.path.exists() {
            bail!("partition cache backing file missing; call build() first");
        }
        let file = fs::File::open(&self.path)
            .with_context(|| format!("opening partition cache at {}", self.path.display()))?;
        // read-only map over a file we wrote and flushed ourselves
        let mmap = unsafe { Mmap::map(&file) }.context("mapping partition cache")?;
        self.table = Table::Mapped(mmap);
        Ok(())
    }

    /// `q(m, n)`: partitions of `m` into at most `n` nonzero parts.
    pub fn get(&self, m: usize, n: usize) -> Result<u64> {
        if m == 0 {
            return Ok(1);
        }
        if m > self.max_e {
            bail!(
                "q({}, {}) exceeds the cache capacity of {} half-edges",
                m,
                n,
                self.max_e
            );
        }
        // at most n parts with n >= m is the unrestricted count
        let n = n.min(m);
        let dim = self.max_e + 1;
        match &self.table {
            Table::Empty => bail!("partition cache queried before build()"),
            Table::Owned(t) => Ok(u64::from(t[[m, n]])),
            Table::Mapped(mm) => {
                let off = (m * dim + n) * 4;
                let b = &mm[off..off + 4];
                Ok(u64::from(u32::from_ne_bytes([b[0], b[1], b[2], b[3]])))
            }
        }
    }

    /// Remove the backing file at the end of a run; a missing file is
    /// logged, not an error.
    pub fn remove_backing(&mut self) {
        self.table = Table::Empty;
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("removing partition cache backing file: {}", e);
        }
    }

    fn publish(&self, table: &Array2<u32>) -> Result<()> {
        let mut buf = Vec::with_capacity(table.len() * 4);
        for v in table.iter() {
            buf.extend_from_slice(&v.to_ne_bytes());
        }
        let mut file = fs::File::create(&self.path)
            .with_context(|| format!("publishing partition cache to {}", self.path.display()))?;
        file.write_all(&buf)?;
        file.sync_all()
            .context("flushing partition cache before fan-out")?;
        Ok(())
    }
}

fn fill_table(max_e: usize) -> Array2<u32> {
    let dim = max_e + 1;
    let mut q = Array2::<u32>::zeros((dim, dim));
    for n in 0..dim {
        q[[0, n]] = 1;
    }
    for m in 1..dim {
        for n in 1..dim {
            let carry = if m >= n { q[[m - n, n]] } else { 0 };
            q[[m, n]] = q[[m, n - 1]].saturating_add(carry);
        }
    }
    q
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_partition_counts() {
        let mut cache = PartitionCache::new(10).unwrap();
        cache.build().unwrap();

        assert_eq!(cache.get(0, 3).unwrap(), 1);
        assert_eq!(cache.get(5, 1).unwrap(), 1);
        // 5 = 5 = 4+1 = 3+2
        assert_eq!(cache.get(5, 2).unwrap(), 3);
        // partitions of 5: 7 in total
        assert_eq!(cache.get(5, 5).unwrap(), 7);
        // n beyond m clamps to the unrestricted count
        assert_eq!(cache.get(5, 100).unwrap(), 7);
        // 6 = 6, 5+1, 4+2, 3+3, 4+1+1, 3+2+1, 2+2+2
        assert_eq!(cache.get(6, 3).unwrap(), 7);
    }

    #[test]
    fn test_mapped_view_matches_owned() {
        let mut cache = PartitionCache::new(40).unwrap();
        cache.build().unwrap();

        let mut owned = Vec::new();
        for m in 0..=40 {
            for n in 0..=m {
                owned.push(cache.get(m, n).unwrap());
            }
        }

        cache.map_readonly().unwrap();
        let mut mapped = Vec::new();
        for m in 0..=40 {
            for n in 0..=m {
                mapped.push(cache.get(m, n).unwrap());
            }
        }
        assert_eq!(owned, mapped);
    }

    #[test]
    fn test_unbuilt_and_out_of_range() {
        let cache = PartitionCache::new(10).unwrap();
        assert!(cache.get(3, 2).is_err());

        let mut cache = PartitionCache::new(10).unwrap();
        cache.build().unwrap();
        assert!(cache.get(11, 2).is_err());
    }

    #[test]
    fn test_rebuild_after_removal() {
        let mut cache = PartitionCache::new(10).unwrap();
        cache.build().unwrap();
        cache.remove_backing();
        assert!(!cache.is_built());
        // second removal only logs
        cache.remove_backing();
        cache.rebuild().unwrap();
        assert_eq!(cache.get(5, 2).unwrap(), 3);
    }

    #[test]
    fn test_capacity_clamp() {
        let cache = PartitionCache::new(20_000).unwrap();
        assert_eq!(cache.max_half_edges(), 10_000);
    }
}
