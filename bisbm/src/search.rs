//! The model-order search controller.
//!
//! Walks the (ka, kb) lattice from a large initial guess toward (1, 1) by
//! repeated same-side merges of the affinity matrix. A merge whose
//! likelihood drop exceeds `i_0` times the reference likelihood triggers a
//! full engine evaluation; anything smaller is bookkeeping only. Around a
//! suspected optimum every lattice neighbor is probed before the point is
//! accepted as the minimum-description-length model order.
//!
//! All expensive evaluations are recorded once per point; a point with a
//! recorded description length is never handed to the engine again unless
//! recomputation is forced.

use anyhow::{anyhow, ensure, Result};
use fnv::FnvHashMap;
use log::info;
use ndarray::Array2;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::engine::{EngineConfig, PartitionEngine};
use crate::entropy::{description_length, profile_likelihood, DlOptions};
use crate::error::SearchError;
use crate::graph::{BipartiteGraph, EdgelistStage, NodeType};
use crate::merge::{propose_best_merge, relabel_after_merge, MergeProposal};
use crate::qcache::PartitionCache;
use crate::runner::SweepRunner;

/// A model order `(ka, kb)`: the key of every bookkeeping table.
pub type Point = (usize, usize);

/// Construction-time options.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Derive the initial point and all tunables from the graph; when
    /// false every tunable must be assigned before searching.
    pub default_args: bool,
    /// Draw the initial point uniformly below the derived default.
    pub random_init_k: bool,
    /// Seed for merge sampling and random initialization.
    pub seed: u64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            default_args: true,
            random_init_k: false,
            seed: 42,
        }
    }
}

/// Run summary: the initial state, graph statistics, and the minimum.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSummary {
    /// Initial row-group count.
    pub init_ka: usize,
    /// Initial column-group count.
    pub init_kb: usize,
    /// Number of type-a nodes.
    pub na: usize,
    /// Number of type-b nodes.
    pub nb: usize,
    /// Number of edges.
    pub e: usize,
    /// Average degree.
    pub avg_k: f64,
    /// Row-group count of the MDL point.
    pub ka: usize,
    /// Column-group count of the MDL point.
    pub kb: usize,
    /// The minimum recorded description length.
    pub mdl: f64,
}

#[derive(Debug, Clone, Copy)]
struct Tunables {
    init_ka: usize,
    init_kb: usize,
    i_0: f64,
    adaptive_ratio: f64,
    k_th_nb_to_search: usize,
    size_rows_to_run: usize,
}

/// Searches for the model order with minimum description length.
pub struct OptimalKs {
    engine: Box<dyn PartitionEngine>,
    config: EngineConfig,
    graph: BipartiteGraph,
    dl_opts: DlOptions,

    init_ka: Option<usize>,
    init_kb: Option<usize>,
    i_0: Option<f64>,
    adaptive_ratio: Option<f64>,
    k_th_nb_to_search: Option<usize>,
    size_rows_to_run: Option<usize>,

    // run-scoped descent state
    ka: usize,
    kb: usize,
    m_e_rs: Option<Array2<u64>>,
    init_italic_i: f64,

    // authoritative records, co-updated per point
    bookkeeping_dl: FnvHashMap<Point, f64>,
    bookkeeping_e_rs: FnvHashMap<Point, Array2<u64>>,
    bookkeeping_italic_i: FnvHashMap<Point, f64>,
    trace_mb: FnvHashMap<Point, Vec<usize>>,

    stage: EdgelistStage,
    qcache: PartitionCache,
    rng: SmallRng,
}

impl OptimalKs {
    /// Build a controller with graph-derived defaults.
    pub fn new(
        engine: Box<dyn PartitionEngine>,
        config: EngineConfig,
        edges: Vec<(usize, usize)>,
        types: Vec<NodeType>,
    ) -> Result<Self> {
        Self::with_options(engine, config, edges, types, SearchOptions::default())
    }

    /// Build a controller with explicit construction options.
    pub fn with_options(
        engine: Box<dyn PartitionEngine>,
        mut config: EngineConfig,
        edges: Vec<(usize, usize)>,
        types: Vec<NodeType>,
        opts: SearchOptions,
    ) -> Result<Self> {
        let graph = BipartiteGraph::new(edges, types)?;
        let e = graph.num_edges();
        let mut rng = SmallRng::seed_from_u64(opts.seed);

        let mut init_ka = None;
        let mut init_kb = None;
        let mut i_0 = None;
        let mut adaptive_ratio = None;
        let mut k_th_nb_to_search = None;
        let mut size_rows_to_run = None;

        if opts.default_args {
            config.scale_mcmc_defaults(graph.num_nodes());
            let guess = ((e as f64).sqrt() / 2.0) as usize;
            let mut ka0 = guess.max(1).min(graph.na().max(1));
            let mut kb0 = guess.max(1).min(graph.nb().max(1));
            if opts.random_init_k {
                ka0 = rng.random_range(1..=ka0);
                kb0 = rng.random_range(1..=kb0);
            }
            init_ka = Some(ka0);
            init_kb = Some(kb0);
            i_0 = Some(0.1);
            adaptive_ratio = Some(0.9);
            k_th_nb_to_search = Some(1);
            size_rows_to_run = Some(2);
        }

        let qcache = PartitionCache::new(e)?;
        let stage = EdgelistStage::new()?;

        Ok(OptimalKs {
            engine,
            config,
            graph,
            dl_opts: DlOptions::default(),
            ka: init_ka.unwrap_or(1),
            kb: init_kb.unwrap_or(1),
            init_ka,
            init_kb,
            i_0,
            adaptive_ratio,
            k_th_nb_to_search,
            size_rows_to_run,
            m_e_rs: None,
            init_italic_i: 0.0,
            bookkeeping_dl: FnvHashMap::default(),
            bookkeeping_e_rs: FnvHashMap::default(),
            bookkeeping_italic_i: FnvHashMap::default(),
            trace_mb: FnvHashMap::default(),
            stage,
            qcache,
            rng,
        })
    }

    /// Run the search to termination.
    ///
    /// Returns the full description-length table. Fails fast on invalid
    /// configuration, and with [`SearchError::Overshoot`] when the descent
    /// reaches (1, 1) but the forced boundary check disagrees.
    pub fn search(&mut self) -> Result<FnvHashMap<Point, f64>> {
        self.prerunning_checks()?;
        if self.init_italic_i == 0.0 {
            let t = self.tunables()?;
            self.ka = t.init_ka;
            self.kb = t.init_kb;
        }

        while !(self.ka == 1 && self.kb == 1) {
            let prop = self.move_one_step_down()?;
            let t = self.tunables()?;

            if prop.diff.abs() > t.i_0 * self.init_italic_i {
                // significant drop: promote the candidate and evaluate it
                self.update_current_state(prop.ka, prop.kb, prop.m.clone());
                let (desc_len, _, _) = self.calc_and_update((self.ka, self.kb), None)?;

                let (mut ka, mut kb, mut dl) = (self.ka, self.kb, desc_len);
                if !self.is_mdl_so_far(desc_len) {
                    // the merge predicted this point but it scored worse:
                    // suspected overshoot, tighten the threshold and return
                    // to the recorded minimum
                    let shrunk = t.i_0 * t.adaptive_ratio;
                    info!("threshold overshoot suspected; shrinking i_0 to {:.6}", shrunk);
                    self.i_0 = Some(shrunk);
                    (ka, kb, dl) = self.back_to_lowest()?;
                }
                if self.check_local_minimum(ka, kb, dl, t.k_th_nb_to_search)? {
                    self.finalize()?;
                    return Ok(self.bookkeeping_dl.clone());
                }
            } else {
                self.update_transient_state(&prop)?;
            }
        }

        self.check_if_random_bipartite()?;
        Ok(self.bookkeeping_dl.clone())
    }

    /// Evaluate one point explicitly, restaging the edge list and
    /// rebuilding the partition table first.
    ///
    /// With `recompute` the recorded entry is cleared so the engine runs
    /// again even for a cached point.
    pub fn compute_and_update(&mut self, ka: usize, kb: usize, recompute: bool) -> Result<()> {
        self.stage.restage(&self.graph)?;
        self.qcache.rebuild()?;
        if recompute {
            let point = (ka, kb);
            self.bookkeeping_dl.remove(&point);
            self.bookkeeping_e_rs.remove(&point);
            self.bookkeeping_italic_i.remove(&point);
            self.trace_mb.remove(&point);
        }
        self.calc_and_update((ka, kb), None)?;
        Ok(())
    }

    /// Summary of the run so far; requires at least one recorded point.
    pub fn summary(&self) -> Result<SearchSummary> {
        let t = self.tunables()?;
        let (point, mdl) = self.lowest_point()?;
        Ok(SearchSummary {
            init_ka: t.init_ka,
            init_kb: t.init_kb,
            na: self.graph.na(),
            nb: self.graph.nb(),
            e: self.graph.num_edges(),
            avg_k: self.graph.average_degree(),
            ka: point.0,
            kb: point.1,
            mdl,
        })
    }

    /// Clear all bookkeeping and restart from the stock defaults.
    ///
    /// The stock (10, 10) starting point is clamped to the side sizes, so
    /// resetting succeeds on graphs with fewer than ten nodes per side.
    pub fn reset(&mut self) -> Result<()> {
        self.bookkeeping_dl.clear();
        self.bookkeeping_e_rs.clear();
        self.bookkeeping_italic_i.clear();
        self.trace_mb.clear();
        self.m_e_rs = None;
        self.init_italic_i = 0.0;
        self.set_params(
            10.min(self.graph.na()),
            10.min(self.graph.nb()),
            0.1,
        )
    }

    /// Set the initial point and the significance threshold.
    pub fn set_params(&mut self, init_ka: usize, init_kb: usize, i_0: f64) -> Result<()> {
        if !(0.0..1.0).contains(&i_0) {
            return Err(SearchError::InvalidThreshold { i_0 }.into());
        }
        ensure!(init_ka >= 1 && init_kb >= 1, "initial group counts must be at least 1");
        if init_ka > self.graph.na() {
            return Err(SearchError::TooManyGroups {
                side: 'a',
                k: init_ka,
                n: self.graph.na(),
            }
            .into());
        }
        if init_kb > self.graph.nb() {
            return Err(SearchError::TooManyGroups {
                side: 'b',
                k: init_kb,
                n: self.graph.nb(),
            }
            .into());
        }
        self.init_ka = Some(init_ka);
        self.init_kb = Some(init_kb);
        self.i_0 = Some(i_0);
        self.ka = init_ka;
        self.kb = init_kb;
        self.m_e_rs = None;
        self.init_italic_i = 0.0;
        Ok(())
    }

    /// Shrink factor applied to `i_0` after an overshoot correction.
    pub fn set_adaptive_ratio(&mut self, ratio: f64) {
        self.adaptive_ratio = Some(ratio);
    }

    /// Radius of the neighborhood probe around a candidate minimum.
    pub fn set_k_th_neighbor_to_search(&mut self, k: usize) {
        self.k_th_nb_to_search = Some(k);
    }

    /// Merge trials per descent step, as a multiple of `ka + kb`.
    pub fn set_size_rows_to_run(&mut self, s: usize) {
        self.size_rows_to_run = Some(s);
    }

    /// The recorded description lengths.
    pub fn description_lengths(&self) -> &FnvHashMap<Point, f64> {
        &self.bookkeeping_dl
    }

    /// The membership recorded at a point, if any.
    pub fn recorded_membership(&self, point: Point) -> Option<&Vec<usize>> {
        self.trace_mb.get(&point)
    }

    /// The affinity matrix recorded at a point, if any.
    pub fn recorded_affinity(&self, point: Point) -> Option<&Array2<u64>> {
        self.bookkeeping_e_rs.get(&point)
    }

    fn tunables(&self) -> Result<Tunables> {
        Ok(Tunables {
            init_ka: self
                .init_ka
                .ok_or(SearchError::MissingParameter { name: "init_ka" })?,
            init_kb: self
                .init_kb
                .ok_or(SearchError::MissingParameter { name: "init_kb" })?,
            i_0: self.i_0.ok_or(SearchError::MissingParameter { name: "i_0" })?,
            adaptive_ratio: self
                .adaptive_ratio
                .ok_or(SearchError::MissingParameter {
                    name: "adaptive_ratio",
                })?,
            k_th_nb_to_search: self
                .k_th_nb_to_search
                .ok_or(SearchError::MissingParameter {
                    name: "k_th_nb_to_search",
                })?,
            size_rows_to_run: self
                .size_rows_to_run
                .ok_or(SearchError::MissingParameter {
                    name: "size_rows_to_run",
                })?,
        })
    }

    fn prerunning_checks(&self) -> Result<()> {
        self.graph.check_sides()?;
        let t = self.tunables()?;
        if !(0.0..1.0).contains(&t.i_0) {
            return Err(SearchError::InvalidThreshold { i_0: t.i_0 }.into());
        }
        if t.init_ka > self.graph.na() {
            return Err(SearchError::TooManyGroups {
                side: 'a',
                k: t.init_ka,
                n: self.graph.na(),
            }
            .into());
        }
        if t.init_kb > self.graph.nb() {
            return Err(SearchError::TooManyGroups {
                side: 'b',
                k: t.init_kb,
                n: self.graph.nb(),
            }
            .into());
        }
        Ok(())
    }

    /// Sample merges of the current matrix and return the least damaging
    /// candidate, evaluating the starting point first if this run has not
    /// yet recorded it.
    fn move_one_step_down(&mut self) -> Result<MergeProposal> {
        if self.init_italic_i == 0.0 {
            let point = (self.ka, self.kb);
            let (_, m, italic_i) = self.calc_and_update(point, None)?;
            self.init_italic_i = italic_i;
            self.m_e_rs = Some(m);
        }
        let t = self.tunables()?;
        let m = self
            .m_e_rs
            .clone()
            .ok_or_else(|| anyhow!("no affinity matrix for the current point"))?;
        let trials = (self.ka + self.kb) * t.size_rows_to_run;
        let two_e = 2 * self.graph.num_edges() as u64;
        propose_best_merge(
            self.ka,
            self.kb,
            &m,
            self.init_italic_i,
            trials,
            two_e,
            &mut self.rng,
        )
    }

    /// Full evaluation of `point`, recording all four bookkeeping entries.
    ///
    /// `old_desc_len` enables the sequential early-exit path; it is only
    /// supplied during neighborhood probing.
    fn calc_and_update(
        &mut self,
        point: Point,
        old_desc_len: Option<f64>,
    ) -> Result<(f64, Array2<u64>, f64)> {
        info!("computing graph partition at ({}, {})", point.0, point.1);
        if !self.qcache.is_built() {
            self.qcache.build()?;
        }
        let (italic_i, m, mb) = self.calc_with_hook(point, old_desc_len)?;
        let dl = description_length(&self.graph, point.0, point.1, &mb, &self.qcache, &self.dl_opts)?;

        let want = point.0 + point.1;
        let got = mb.iter().max().map_or(0, |&g| g + 1);
        if got != want {
            return Err(SearchError::GroupCountMismatch { got, want }.into());
        }

        self.bookkeeping_dl.insert(point, dl);
        self.bookkeeping_italic_i.insert(point, italic_i);
        self.bookkeeping_e_rs.insert(point, m.clone());
        self.trace_mb.insert(point, mb);

        // the reference baseline follows the latest full evaluation
        self.init_italic_i = italic_i;
        info!("... done: DL({}, {}) = {:.6}", point.0, point.1, dl);
        Ok((dl, m, italic_i))
    }

    /// Return the cached triple for `point`, or run a batch of engine
    /// sweeps and keep the minimum-description-length trial.
    fn calc_with_hook(
        &mut self,
        point: Point,
        old_desc_len: Option<f64>,
    ) -> Result<(f64, Array2<u64>, Vec<usize>)> {
        let (ka, kb) = point;
        if let Some(&dl) = self.bookkeeping_dl.get(&point) {
            if dl != 0.0 {
                info!("fetching cached evaluation at ({}, {})", ka, kb);
                let italic_i = *self
                    .bookkeeping_italic_i
                    .get(&point)
                    .ok_or_else(|| anyhow!("missing profile likelihood at ({}, {})", ka, kb))?;
                let m = self
                    .bookkeeping_e_rs
                    .get(&point)
                    .cloned()
                    .ok_or_else(|| anyhow!("missing affinity matrix at ({}, {})", ka, kb))?;
                let mb = self
                    .trace_mb
                    .get(&point)
                    .cloned()
                    .ok_or_else(|| anyhow!("missing membership at ({}, {})", ka, kb))?;
                return Ok((italic_i, m, mb));
            }
        }

        // publish the partition table before any worker reads it
        if self.config.parallel {
            self.qcache.map_readonly()?;
        }
        let path = self.stage.ensure(&self.graph)?.to_path_buf();

        let runner = SweepRunner::new(&*self.engine, &self.config);
        let results = match old_desc_len {
            None => runner.run_batch(&path, self.graph.na(), self.graph.nb(), ka, kb)?,
            Some(old) => {
                let graph = &self.graph;
                let qcache = &self.qcache;
                let dl_opts = &self.dl_opts;
                runner.run_until_improved(
                    &path,
                    graph.na(),
                    graph.nb(),
                    ka,
                    kb,
                    old,
                    |mb| description_length(graph, ka, kb, mb, qcache, dl_opts),
                )?
            }
        };

        let mut best: Option<(f64, Array2<u64>, Vec<usize>, f64)> = None;
        for mb in results {
            let m = self.graph.affinity_matrix(&mb, ka + kb)?;
            let italic_i = profile_likelihood(&m);
            let dl = description_length(&self.graph, ka, kb, &mb, &self.qcache, &self.dl_opts)?;
            if best.as_ref().map_or(true, |b| dl < b.3) {
                best = Some((italic_i, m, mb, dl));
            }
        }
        let best = best.ok_or_else(|| anyhow!("partition engine produced no sweep results"))?;
        Ok((best.0, best.1, best.2))
    }

    /// Advance the current point without a full evaluation, relabeling the
    /// recorded membership into the merged dimensionality.
    fn update_transient_state(&mut self, prop: &MergeProposal) -> Result<()> {
        let old_point = (self.ka, self.kb);
        let old_mb = self
            .trace_mb
            .get(&old_point)
            .cloned()
            .ok_or_else(|| anyhow!("no membership recorded at ({}, {})", self.ka, self.kb))?;
        let relabeled = relabel_after_merge(&old_mb, prop.pair, prop.ka + prop.kb)?;
        self.trace_mb.insert((prop.ka, prop.kb), relabeled);
        self.update_current_state(prop.ka, prop.kb, prop.m.clone());
        Ok(())
    }

    /// Probe every lattice neighbor within `radius` of `(ka, kb)`.
    ///
    /// Returns true when no neighbor undercuts the recorded minimum; when
    /// one does, the current state rolls back to the best recorded point
    /// and the outer loop continues from there.
    fn check_local_minimum(
        &mut self,
        ka: usize,
        kb: usize,
        old_desc_len: f64,
        radius: usize,
    ) -> Result<bool> {
        let r = radius as isize;
        // probes stay inside the encodable lattice: at least one group per
        // side, at most one group per node
        let (na, nb) = (self.graph.na() as isize, self.graph.nb() as isize);
        let mut nb_points = Vec::new();
        for i in -r..=r {
            for j in -r..=r {
                let (pa, pb) = (ka as isize + i, kb as isize + j);
                if pa >= 1 && pb >= 1 && pa <= na && pb <= nb
                    && (pa as usize, pb as usize) != (ka, kb)
                {
                    nb_points.push((pa as usize, pb as usize));
                }
            }
        }

        for point in nb_points {
            self.calc_and_update(point, Some(old_desc_len))?;
            let dl = self
                .bookkeeping_dl
                .get(&point)
                .copied()
                .unwrap_or(f64::INFINITY);
            if self.is_mdl_so_far(dl) {
                let (best, _) = self.lowest_point()?;
                info!(
                    "({}, {}) gives an even lower description length; resuming from ({}, {})",
                    point.0, point.1, best.0, best.1
                );
                self.back_to_lowest()?;
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Forced four-point check once the descent reaches (1, 1).
    fn check_if_random_bipartite(&mut self) -> Result<()> {
        for (ka, kb) in [(1, 1), (1, 2), (2, 1), (2, 2)] {
            self.compute_and_update(ka, kb, true)?;
        }
        let (point, _) = self.lowest_point()?;
        if point != (1, 1) {
            return Err(SearchError::Overshoot {
                ka: point.0,
                kb: point.1,
            }
            .into());
        }
        self.finalize()
    }

    fn finalize(&mut self) -> Result<()> {
        let (point, mdl) = self.lowest_point()?;
        info!(
            "done: the MDL point is ({}, {}) with DL = {:.6}",
            point.0, point.1, mdl
        );
        self.stage.discard();
        self.qcache.remove_backing();
        Ok(())
    }

    /// Whether `desc_len` is at most every recorded description length.
    fn is_mdl_so_far(&self, desc_len: f64) -> bool {
        !self.bookkeeping_dl.values().any(|&v| v < desc_len)
    }

    fn lowest_point(&self) -> Result<(Point, f64)> {
        self.bookkeeping_dl
            .iter()
            .min_by(|a, b| a.1.total_cmp(b.1).then_with(|| a.0.cmp(b.0)))
            .map(|(&p, &dl)| (p, dl))
            .ok_or_else(|| anyhow!("no evaluations recorded yet"))
    }

    fn back_to_lowest(&mut self) -> Result<(usize, usize, f64)> {
        let (point, dl) = self.lowest_point()?;
        let m = self
            .bookkeeping_e_rs
            .get(&point)
            .cloned()
            .ok_or_else(|| anyhow!("missing affinity matrix at ({}, {})", point.0, point.1))?;
        self.update_current_state(point.0, point.1, m);
        Ok((point.0, point.1, dl))
    }

    fn update_current_state(&mut self, ka: usize, kb: usize, m: Array2<u64>) {
        self.ka = ka;
        self.kb = kb;
        self.m_e_rs = Some(m);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    struct RoundRobinEngine;

    impl PartitionEngine for RoundRobinEngine {
        fn run(
            &self,
            _edgelist: &Path,
            na: usize,
            nb: usize,
            ka: usize,
            kb: usize,
        ) -> Result<Vec<usize>> {
            let mut mb = Vec::with_capacity(na + nb);
            for i in 0..na {
                mb.push(i % ka);
            }
            for i in 0..nb {
                mb.push(ka + i % kb);
            }
            Ok(mb)
        }
    }

    fn square_graph() -> (Vec<(usize, usize)>, Vec<NodeType>) {
        let mut types = vec![NodeType::A; 4];
        types.extend(vec![NodeType::B; 4]);
        let mut edges = Vec::new();
        for a in 0..4 {
            for b in 0..4 {
                edges.push((a, 4 + b));
            }
        }
        (edges, types)
    }

    fn serial_config() -> EngineConfig {
        EngineConfig {
            max_sweeps: 2,
            parallel: false,
            num_cores: 1,
            mcmc: None,
        }
    }

    #[test]
    fn test_missing_params_fail_fast() {
        let (edges, types) = square_graph();
        let opts = SearchOptions {
            default_args: false,
            ..Default::default()
        };
        let mut oks = OptimalKs::with_options(
            Box::new(RoundRobinEngine),
            serial_config(),
            edges,
            types,
            opts,
        )
        .unwrap();
        let err = oks.search().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SearchError>(),
            Some(SearchError::MissingParameter { .. })
        ));
    }

    #[test]
    fn test_set_params_validation() {
        let (edges, types) = square_graph();
        let mut oks =
            OptimalKs::new(Box::new(RoundRobinEngine), serial_config(), edges, types).unwrap();

        let err = oks.set_params(2, 2, 1.0).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SearchError>(),
            Some(&SearchError::InvalidThreshold { i_0: 1.0 })
        );

        let err = oks.set_params(5, 2, 0.1).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SearchError>(),
            Some(&SearchError::TooManyGroups {
                side: 'a',
                k: 5,
                n: 4
            })
        );

        oks.set_params(2, 2, 0.0).unwrap();
    }

    #[test]
    fn test_empty_side_rejected() {
        let types = vec![NodeType::A; 4];
        let mut oks =
            OptimalKs::new(Box::new(RoundRobinEngine), serial_config(), vec![], types).unwrap();
        let err = oks.search().unwrap_err();
        assert_eq!(
            err.downcast_ref::<SearchError>(),
            Some(&SearchError::EmptySide { side: 'b' })
        );
    }

    #[test]
    fn test_reset_clears_bookkeeping() {
        let (edges, types) = square_graph();
        let mut oks =
            OptimalKs::new(Box::new(RoundRobinEngine), serial_config(), edges, types).unwrap();
        oks.compute_and_update(2, 2, false).unwrap();
        assert_eq!(oks.description_lengths().len(), 1);

        // the stock (10, 10) restart clamps to the four nodes per side
        oks.reset().unwrap();
        assert!(oks.description_lengths().is_empty());
        oks.compute_and_update(4, 4, false).unwrap();
        let summary = oks.summary().unwrap();
        assert_eq!((summary.init_ka, summary.init_kb), (4, 4));
    }

    #[test]
    fn test_probe_stays_within_side_bounds() {
        // a candidate minimum at the corner of the lattice must not probe
        // orders with more groups than a side has nodes
        let (edges, types) = square_graph();
        let mut oks =
            OptimalKs::new(Box::new(RoundRobinEngine), serial_config(), edges, types).unwrap();
        oks.set_params(4, 4, 0.1).unwrap();
        oks.compute_and_update(4, 4, false).unwrap();
        let dl = oks.bookkeeping_dl[&(4, 4)];

        oks.check_local_minimum(4, 4, dl, 1).unwrap();
        assert!(oks.bookkeeping_dl.contains_key(&(3, 3)));
        assert!(oks
            .bookkeeping_dl
            .keys()
            .all(|&(ka, kb)| (1..=4).contains(&ka) && (1..=4).contains(&kb)));
    }

    #[test]
    fn test_summary_reports_argmin() {
        let (edges, types) = square_graph();
        let mut oks =
            OptimalKs::new(Box::new(RoundRobinEngine), serial_config(), edges, types).unwrap();
        oks.set_params(2, 2, 0.1).unwrap();
        oks.compute_and_update(1, 1, false).unwrap();
        oks.compute_and_update(2, 2, false).unwrap();

        let summary = oks.summary().unwrap();
        assert_eq!(summary.na, 4);
        assert_eq!(summary.nb, 4);
        assert_eq!(summary.e, 16);
        assert!((summary.avg_k - 4.0).abs() < 1e-12);
        let (best, mdl) = oks.lowest_point().unwrap();
        assert_eq!((summary.ka, summary.kb), best);
        assert_eq!(summary.mdl, mdl);
    }
}
