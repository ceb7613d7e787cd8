//! Same-side group merges on the affinity matrix.
//!
//! The cheap step of the descent: sample candidate merges of two row
//! groups or two column groups, score each merged matrix by its profile
//! likelihood in closed form (no re-optimization), and keep the candidate
//! that loses the least. The full membership vector is relabeled
//! afterwards without touching the partition engine.

use anyhow::{bail, Result};
use ndarray::Array2;
use rand::rngs::SmallRng;
use rand::Rng;

use crate::entropy::profile_likelihood;
use crate::error::SearchError;

/// Outcome of the best sampled merge at one descent step.
#[derive(Debug, Clone)]
pub struct MergeProposal {
    /// Row-group count after the merge.
    pub ka: usize,
    /// Column-group count after the merge.
    pub kb: usize,
    /// The reduced affinity matrix.
    pub m: Array2<u64>,
    /// Profile-likelihood difference to the reference baseline (<= 0 up to
    /// noise: merging can only lose information).
    pub diff: f64,
    /// The two group indices of the original matrix that were merged,
    /// sorted ascending.
    pub pair: (usize, usize),
}

/// Merge one random pair of same-side groups.
///
/// Returns the new `(ka, kb)`, the reduced matrix, and the merged pair.
/// Bipartite structure is preserved: the pair is always drawn within one
/// side.
pub fn merge_once(
    ka: usize,
    kb: usize,
    m: &Array2<u64>,
    rng: &mut SmallRng,
) -> Result<(usize, usize, Array2<u64>, (usize, usize))> {
    let can_a = ka > 1;
    let can_b = kb > 1;
    if !can_a && !can_b {
        bail!("cannot merge at (1, 1)");
    }
    let merge_a = if can_a && can_b {
        rng.random_range(0..2usize) == 0
    } else {
        can_a
    };

    let (lo_bound, hi_bound) = if merge_a { (0, ka) } else { (ka, ka + kb) };
    let i = rng.random_range(lo_bound..hi_bound);
    let j = loop {
        let j = rng.random_range(lo_bound..hi_bound);
        if j != i {
            break j;
        }
    };
    let (lo, hi) = if i < j { (i, j) } else { (j, i) };

    let k = ka + kb;
    let map = |idx: usize| {
        if idx == hi {
            lo
        } else if idx > hi {
            idx - 1
        } else {
            idx
        }
    };

    let mut merged = Array2::<u64>::zeros((k - 1, k - 1));
    for r in 0..k {
        for s in 0..k {
            merged[[map(r), map(s)]] += m[[r, s]];
        }
    }

    let (ka_new, kb_new) = if merge_a { (ka - 1, kb) } else { (ka, kb - 1) };
    Ok((ka_new, kb_new, merged, (lo, hi)))
}

/// Sample `trials` merges and keep the one closest to the baseline.
///
/// `baseline` is the profile likelihood recorded at the last full
/// evaluation; the winning trial maximizes `I(merged) - baseline`, i.e.
/// deviates least. The edge mass of the winner is checked against `2E`.
pub fn propose_best_merge(
    ka: usize,
    kb: usize,
    m: &Array2<u64>,
    baseline: f64,
    trials: usize,
    two_e: u64,
    rng: &mut SmallRng,
) -> Result<MergeProposal> {
    let mut best: Option<MergeProposal> = None;
    for _ in 0..trials {
        let (ka_new, kb_new, merged, pair) = merge_once(ka, kb, m, rng)?;
        let diff = profile_likelihood(&merged) - baseline;
        if best.as_ref().map_or(true, |b| diff > b.diff) {
            best = Some(MergeProposal {
                ka: ka_new,
                kb: kb_new,
                m: merged,
                diff,
                pair,
            });
        }
    }
    let Some(best) = best else {
        bail!("no merge trials were sampled");
    };

    let got = best.m.sum();
    if got != two_e {
        return Err(SearchError::MassMismatch { got, want: two_e }.into());
    }
    Ok(best)
}

/// Relabel a membership vector after a transient merge.
///
/// Nodes of the higher merged group collapse onto the lower one, and all
/// groups above it shift down by one so indices stay contiguous. `new_k`
/// is `ka + kb` after the merge; a mismatch in the resulting group count
/// indicates a bug and aborts the run.
pub fn relabel_after_merge(mb: &[usize], pair: (usize, usize), new_k: usize) -> Result<Vec<usize>> {
    let (lo, hi) = if pair.0 < pair.1 {
        (pair.0, pair.1)
    } else {
        (pair.1, pair.0)
    };
    let relabeled: Vec<usize> = mb
        .iter()
        .map(|&g| {
            if g == hi {
                lo
            } else if g > hi {
                g - 1
            } else {
                g
            }
        })
        .collect();

    let got = relabeled.iter().max().map_or(0, |&g| g + 1);
    if got != new_k {
        return Err(SearchError::GroupCountMismatch { got, want: new_k }.into());
    }
    Ok(relabeled)
}
