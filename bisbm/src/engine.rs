//! Partition-engine capability interface and its configuration.
//!
//! The community-detection optimizer is an external collaborator: any
//! heuristic (simulated annealing, Kernighan-Lin style moves, ...) that
//! can produce a block membership for a requested model order can drive
//! the search. The controller only fixes the calling convention and a
//! strongly-typed set of tunables.

use anyhow::Result;
use std::path::Path;

/// A black-box community-detection optimizer.
///
/// Implementations read the staged tab-separated edge list (one
/// `node_a<TAB>node_b` pair per line, global node ids) and return one
/// membership vector of length `na + nb` whose distinct values are
/// exactly `0..ka+kb`, with type-a nodes in groups `0..ka` and type-b
/// nodes in groups `ka..ka+kb`.
///
/// Engines are invoked repeatedly with identical arguments to escape poor
/// local optima, possibly from several rayon workers at once, so they
/// must be `Send + Sync`; a non-reentrant optimizer should serialize
/// internally.
pub trait PartitionEngine: Send + Sync {
    /// Run one optimization sweep at the requested model order.
    fn run(
        &self,
        edgelist: &Path,
        na: usize,
        nb: usize,
        ka: usize,
        kb: usize,
    ) -> Result<Vec<usize>>;
}

/// Cooling schedules understood by annealing-style engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoolingSchedule {
    /// Exponential temperature decay.
    ExponentialCool,
    /// Linear temperature decay.
    LinearCool,
    /// Logarithmic temperature decay.
    LogarithmicCool,
    /// Constant temperature.
    ConstantCool,
    /// Run hot, then quench after a fixed number of steps.
    AbruptCool,
}

/// Tunables for stochastic-optimization engines.
#[derive(Debug, Clone, PartialEq)]
pub struct McmcParams {
    /// Total number of proposal steps.
    pub steps: f64,
    /// Steps to await without improvement before stopping.
    pub await_steps: f64,
    /// Cooling schedule name.
    pub cooling: CoolingSchedule,
    /// Schedule parameter (meaning depends on the schedule).
    pub cooling_param: f64,
    /// Greediness parameter of the proposal distribution.
    pub epsilon: f64,
}

impl McmcParams {
    /// Graph-size-scaled defaults: steps and await-steps grow with the
    /// node count `n`, the quench point of the abrupt schedule likewise.
    pub fn scaled_to(n: usize) -> Self {
        let n = n as f64;
        McmcParams {
            steps: n * 1e5,
            await_steps: n * 2e3,
            cooling: CoolingSchedule::AbruptCool,
            cooling_param: n * 1e3,
            epsilon: 1.0,
        }
    }
}

/// Engine invocation policy consumed at controller construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Independent sweeps per evaluation point.
    pub max_sweeps: usize,
    /// Fan sweeps out across a worker pool instead of running one.
    pub parallel: bool,
    /// Worker-pool size when parallel.
    pub num_cores: usize,
    /// Annealing tunables, for engines that understand them.
    pub mcmc: Option<McmcParams>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_sweeps: 4,
            parallel: true,
            num_cores: num_cpus::get(),
            mcmc: None,
        }
    }
}

impl EngineConfig {
    /// Replace any annealing tunables with graph-size-scaled defaults.
    pub fn scale_mcmc_defaults(&mut self, n: usize) {
        if self.mcmc.is_some() {
            self.mcmc = Some(McmcParams::scaled_to(n));
        }
    }
}
