//! Search-level errors that callers need to tell apart.
//!
//! Everything else in the crate flows through `anyhow`; the variants here
//! are the failures with a caller-side remedy (fix the configuration,
//! re-run with a smaller threshold) or that indicate a bug in the
//! bookkeeping and must abort the run.

/// Errors raised by [`crate::search::OptimalKs`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SearchError {
    /// A tunable was left unset (non-default construction).
    ///
    /// Resolution: assign it via `set_params` and friends before searching.
    #[error("missing required parameter `{name}`; assign it before searching")]
    MissingParameter {
        /// Name of the unset tunable.
        name: &'static str,
    },

    /// One side of the bipartite graph has no nodes.
    #[error("number of type-{side} nodes is zero, which is not allowed")]
    EmptySide {
        /// Which side is empty (`'a'` or `'b'`).
        side: char,
    },

    /// The node-type vector is inconsistent with the total node count.
    #[error("num_nodes ({n}) does not equal num_nodes_a ({na}) plus num_nodes_b ({nb})")]
    NodeCountMismatch {
        /// Total number of nodes.
        n: usize,
        /// Number of type-a nodes.
        na: usize,
        /// Number of type-b nodes.
        nb: usize,
    },

    /// The significance threshold is outside its allowed range.
    #[error("allowed range for i_0 is [0, 1); got {i_0}")]
    InvalidThreshold {
        /// The rejected value.
        i_0: f64,
    },

    /// More groups were requested on a side than it has nodes.
    #[error("number of type-{side} communities ({k}) exceeds the number of type-{side} nodes ({n})")]
    TooManyGroups {
        /// Which side (`'a'` or `'b'`).
        side: char,
        /// Requested group count.
        k: usize,
        /// Available node count on that side.
        n: usize,
    },

    /// The descent reached (1, 1) but the forced four-point check found a
    /// better model order, which means the significance threshold was too
    /// large and the search overshot the optimum.
    ///
    /// Resolution: re-run with a smaller `i_0`.
    #[error("merging reached (1, 1) but ({ka}, {kb}) has a lower description length; re-run with a smaller i_0")]
    Overshoot {
        /// Row-group count of the better point.
        ka: usize,
        /// Column-group count of the better point.
        kb: usize,
    },

    /// Edge mass of the affinity matrix changed across a merge.
    #[error("affinity matrix mass is {got} but must equal 2E = {want}")]
    MassMismatch {
        /// Observed total of the matrix entries.
        got: u64,
        /// Expected total (twice the edge count).
        want: u64,
    },

    /// Membership relabeling produced the wrong number of groups.
    #[error("membership vector spans {got} groups but the point implies {want}")]
    GroupCountMismatch {
        /// Observed distinct group count.
        got: usize,
        /// Expected `ka + kb`.
        want: usize,
    },
}
