//! Determine the optimal number of communities of a bipartite network
//! via the minimum description length (MDL) principle.
//!
//! The crate searches the `(ka, kb)` model-order lattice of the bipartite
//! degree-corrected stochastic block model. A pluggable
//! [`PartitionEngine`] produces block memberships at requested orders; the
//! controller walks downward from a large initial order by cheap
//! profile-likelihood merges, calls the engine only when a merge looks
//! significant, and accepts a point once its whole lattice neighborhood
//! has been probed.
//!
//! ```no_run
//! use bisbm::{EngineConfig, NodeType, OptimalKs, PartitionEngine};
//! # fn engine() -> Box<dyn PartitionEngine> { unimplemented!() }
//!
//! # fn main() -> anyhow::Result<()> {
//! let types = vec![NodeType::A, NodeType::A, NodeType::B, NodeType::B];
//! let edges = vec![(0, 2), (0, 3), (1, 2), (1, 3)];
//! let mut oks = OptimalKs::new(engine(), EngineConfig::default(), edges, types)?;
//! let desc_lens = oks.search()?;
//! println!("{:?}", oks.summary()?);
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod entropy;
pub mod error;
pub mod graph;
pub mod merge;
pub mod qcache;
pub mod runner;
pub mod search;

pub use engine::{CoolingSchedule, EngineConfig, McmcParams, PartitionEngine};
pub use entropy::{
    desc_len_difference, description_length, profile_likelihood, DegreeDlKind, DlOptions,
    EdgeDlKind, PartitionDlKind,
};
pub use error::SearchError;
pub use graph::{BipartiteGraph, NodeType};
pub use qcache::PartitionCache;
pub use search::{OptimalKs, Point, SearchOptions, SearchSummary};
