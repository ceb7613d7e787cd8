//! Sweep orchestration for one evaluation point.
//!
//! Fans independent engine invocations out across a bounded rayon pool
//! (parallel mode: every launched trial runs to completion) or runs them
//! one by one with an early exit as soon as a trial improves on a known
//! description length (sequential mode). The asymmetry is intentional:
//! batching optimizes wall clock, the sequential path optimizes total
//! work during neighborhood probing.

use anyhow::{Context, Result};
use log::info;
use rayon::prelude::*;
use std::path::Path;

use crate::engine::{EngineConfig, PartitionEngine};

/// Runs batches of engine sweeps at a fixed `(ka, kb)`.
pub struct SweepRunner<'a> {
    engine: &'a dyn PartitionEngine,
    config: &'a EngineConfig,
}

impl<'a> SweepRunner<'a> {
    /// Borrow an engine and its invocation policy.
    pub fn new(engine: &'a dyn PartitionEngine, config: &'a EngineConfig) -> Self {
        SweepRunner { engine, config }
    }

    /// Run the full batch of sweeps: `max_sweeps` in parallel, or a single
    /// sweep when parallelism is disabled.
    pub fn run_batch(
        &self,
        edgelist: &Path,
        na: usize,
        nb: usize,
        ka: usize,
        kb: usize,
    ) -> Result<Vec<Vec<usize>>> {
        if !self.config.parallel {
            return Ok(vec![self.engine.run(edgelist, na, nb, ka, kb)?]);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.num_cores.max(1))
            .build()
            .context("building sweep worker pool")?;
        let engine = self.engine;
        pool.install(|| {
            (0..self.config.max_sweeps)
                .into_par_iter()
                .map(|_| engine.run(edgelist, na, nb, ka, kb))
                .collect()
        })
    }

    /// Run sweeps until one beats `old_desc_len`, scoring each trial with
    /// `score` as it arrives.
    ///
    /// In parallel mode this degrades to [`run_batch`](Self::run_batch):
    /// no mid-batch cancellation. In sequential mode at most `max_sweeps`
    /// trials run, stopping after the first strict improvement.
    pub fn run_until_improved<F>(
        &self,
        edgelist: &Path,
        na: usize,
        nb: usize,
        ka: usize,
        kb: usize,
        old_desc_len: f64,
        score: F,
    ) -> Result<Vec<Vec<usize>>>
    where
        F: Fn(&[usize]) -> Result<f64>,
    {
        if self.config.parallel {
            return self.run_batch(edgelist, na, nb, ka, kb);
        }
        let mut results = Vec::new();
        for sweep in 0..self.config.max_sweeps {
            let mb = self.engine.run(edgelist, na, nb, ka, kb)?;
            let desc_len = score(&mb)?;
            results.push(mb);
            if desc_len < old_desc_len {
                info!(
                    "sweep {} improved on {:.6} at ({}, {}); stopping early",
                    sweep, old_desc_len, ka, kb
                );
                break;
            }
        }
        Ok(results)
    }
}
