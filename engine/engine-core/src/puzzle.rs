//! The `Puzzle` trait: the state oracle consumed by search and self-play
//!
//! A puzzle is a single-agent, deterministic transition system with a
//! distinguished solved state. Implementations describe legal moves,
//! terminal detection, and (optionally) a symmetry group acting on states
//! and actions.

use std::fmt::Debug;
use std::hash::Hash;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::metadata::PuzzleMetadata;

/// Terminal status of a state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Status {
    pub terminal: bool,
    /// Reward in `[0, 1]`; only meaningful when `terminal` is set.
    pub reward: f32,
}

impl Status {
    pub const ONGOING: Status = Status {
        terminal: false,
        reward: 0.0,
    };

    pub fn solved(reward: f32) -> Self {
        Self {
            terminal: true,
            reward,
        }
    }

    /// Terminal with a positive reward.
    pub fn is_success(&self) -> bool {
        self.terminal && self.reward > 0.0
    }
}

/// Main trait for puzzle implementations
///
/// Actions are dense indices in `0..num_actions()`. States must be totally
/// ordered so that the smallest member of a symmetry orbit can serve as the
/// canonical representative.
///
/// # Symmetries
///
/// A puzzle may expose a group of `num_symmetries()` transforms. Transform
/// `0` is the identity. The hooks must satisfy, for every state `s`, action
/// `a` and transform `g`:
///
/// ```text
/// transform_state(apply(s, a), g) == apply(transform_state(s, g), transform_action(a, g))
/// ```
///
/// and map the solved state onto itself.
pub trait Puzzle: Send + Sync + Debug + 'static {
    /// Puzzle state; compared, hashed and ordered by value.
    type State: Clone
        + Eq
        + Hash
        + Ord
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    /// Display and sizing information.
    fn metadata(&self) -> PuzzleMetadata;

    /// Size of the dense action space.
    fn num_actions(&self) -> usize;

    /// The unique goal state.
    fn solved_state(&self) -> Self::State;

    /// Successor of `state` under `action`. `action` must be legal.
    fn apply(&self, state: &Self::State, action: usize) -> Self::State;

    /// Legal actions in ascending order.
    fn legal_actions(&self, _state: &Self::State) -> Vec<usize> {
        (0..self.num_actions()).collect()
    }

    /// Whether `state` ends the episode, and with what reward.
    fn status(&self, state: &Self::State) -> Status;

    /// Action that undoes `action`, if the puzzle knows one.
    fn inverse_action(&self, _action: usize) -> Option<usize> {
        None
    }

    /// Order of the symmetry group (1 = no symmetries).
    fn num_symmetries(&self) -> usize {
        1
    }

    /// Image of `state` under transform `sym`.
    fn transform_state(&self, state: &Self::State, _sym: usize) -> Self::State {
        state.clone()
    }

    /// Image of `action` under transform `sym`.
    fn transform_action(&self, action: usize, _sym: usize) -> usize {
        action
    }

    /// Transform undoing `sym`.
    fn inverse_symmetry(&self, sym: usize) -> usize {
        sym
    }
}

/// Random walk of `distance` legal moves away from the solved state.
///
/// Returns every visited state, starting with the solved state, so callers
/// can seed history from the tail. The walk never immediately undoes its
/// previous move when the puzzle knows inverses, and is redrawn (a bounded
/// number of times) if it lands back on a terminal state.
pub fn scramble<P: Puzzle, R: Rng + ?Sized>(
    puzzle: &P,
    distance: u32,
    rng: &mut R,
) -> Vec<P::State> {
    const MAX_ATTEMPTS: usize = 64;

    let mut walk = Vec::new();
    for _ in 0..MAX_ATTEMPTS {
        walk = random_walk(puzzle, distance, rng);
        let landed_terminal = walk
            .last()
            .map(|s| puzzle.status(s).terminal)
            .unwrap_or(true);
        if distance == 0 || !landed_terminal {
            break;
        }
    }
    walk
}

fn random_walk<P: Puzzle, R: Rng + ?Sized>(
    puzzle: &P,
    distance: u32,
    rng: &mut R,
) -> Vec<P::State> {
    let mut walk = Vec::with_capacity(distance as usize + 1);
    let mut state = puzzle.solved_state();
    let mut previous: Option<usize> = None;
    walk.push(state.clone());

    for _ in 0..distance {
        let undo = previous.and_then(|a| puzzle.inverse_action(a));
        let candidates: Vec<usize> = puzzle
            .legal_actions(&state)
            .into_iter()
            .filter(|&a| Some(a) != undo)
            .collect();
        let Some(&action) = candidates.choose(rng) else {
            break;
        };
        state = puzzle.apply(&state, action);
        walk.push(state.clone());
        previous = Some(action);
    }
    walk
}

#[cfg(test)]
pub(crate) mod test_puzzle {
    use super::*;

    /// Counter on a cycle of length `modulus`; solved at zero.
    /// Actions: 0 = +1, 1 = -1. Mirror symmetry negates the counter.
    #[derive(Debug)]
    pub struct Ring {
        pub modulus: u8,
    }

    impl Puzzle for Ring {
        type State = u8;

        fn metadata(&self) -> PuzzleMetadata {
            PuzzleMetadata::new("ring", "Ring").with_actions(vec!["inc".into(), "dec".into()])
        }

        fn num_actions(&self) -> usize {
            2
        }

        fn solved_state(&self) -> u8 {
            0
        }

        fn apply(&self, state: &u8, action: usize) -> u8 {
            match action {
                0 => (state + 1) % self.modulus,
                _ => (state + self.modulus - 1) % self.modulus,
            }
        }

        fn status(&self, state: &u8) -> Status {
            if *state == 0 {
                Status::solved(1.0)
            } else {
                Status::ONGOING
            }
        }

        fn inverse_action(&self, action: usize) -> Option<usize> {
            Some(1 - action)
        }

        fn num_symmetries(&self) -> usize {
            2
        }

        fn transform_state(&self, state: &u8, sym: usize) -> u8 {
            if sym == 0 {
                *state
            } else {
                (self.modulus - state) % self.modulus
            }
        }

        fn transform_action(&self, action: usize, sym: usize) -> usize {
            if sym == 0 {
                action
            } else {
                1 - action
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_puzzle::Ring;
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_status_helpers() {
        assert!(Status::solved(1.0).is_success());
        assert!(!Status::solved(0.0).is_success());
        assert!(!Status::ONGOING.terminal);
    }

    #[test]
    fn test_scramble_walk_length() {
        let ring = Ring { modulus: 11 };
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let walk = scramble(&ring, 4, &mut rng);
        assert_eq!(walk.len(), 5);
        assert_eq!(walk[0], 0);
    }

    #[test]
    fn test_scramble_never_backtracks() {
        let ring = Ring { modulus: 11 };
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        for _ in 0..20 {
            let walk = scramble(&ring, 5, &mut rng);
            // Without backtracking, every step on the ring moves in one direction.
            assert!(*walk.last().unwrap() == 5 || *walk.last().unwrap() == 6);
        }
    }

    #[test]
    fn test_scramble_zero_distance_is_solved() {
        let ring = Ring { modulus: 5 };
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let walk = scramble(&ring, 0, &mut rng);
        assert_eq!(walk, vec![0]);
    }

    #[test]
    fn test_symmetry_commutes_with_apply() {
        let ring = Ring { modulus: 7 };
        for s in 0..7u8 {
            for a in 0..2 {
                let lhs = ring.transform_state(&ring.apply(&s, a), 1);
                let rhs = ring.apply(&ring.transform_state(&s, 1), ring.transform_action(a, 1));
                assert_eq!(lhs, rhs);
            }
        }
    }
}
