//! Helpers for working in a puzzle's canonical symmetry frame.
//!
//! A policy `p` over actions at state `s` corresponds to the policy `p'` at
//! `g(s)` with `p'[g(a)] = p[a]`. These helpers move policy vectors between
//! frames.

use crate::puzzle::Puzzle;

/// Canonical representative of `state`'s symmetry orbit and the transform
/// that maps `state` onto it. Ties resolve to the lowest transform index.
pub fn canonicalize<P: Puzzle>(puzzle: &P, state: &P::State) -> (P::State, usize) {
    let mut best = (state.clone(), 0);
    for sym in 1..puzzle.num_symmetries() {
        let candidate = puzzle.transform_state(state, sym);
        if candidate < best.0 {
            best = (candidate, sym);
        }
    }
    best
}

/// Policy at `g(s)` given the policy at `s`.
pub fn transform_policy<P: Puzzle>(puzzle: &P, policy: &[f32], sym: usize) -> Vec<f32> {
    if sym == 0 {
        return policy.to_vec();
    }
    let mut out = vec![0.0; policy.len()];
    for (action, &p) in policy.iter().enumerate() {
        let mapped = puzzle.transform_action(action, sym);
        if let Some(slot) = out.get_mut(mapped) {
            *slot = p;
        }
    }
    out
}

/// Policy at `s` given the policy at `g(s)`.
pub fn untransform_policy<P: Puzzle>(puzzle: &P, policy: &[f32], sym: usize) -> Vec<f32> {
    if sym == 0 {
        return policy.to_vec();
    }
    (0..policy.len())
        .map(|action| {
            policy
                .get(puzzle.transform_action(action, sym))
                .copied()
                .unwrap_or(0.0)
        })
        .collect()
}
