//! A state together with the bounded history the oracle conditions on.

use serde::{Deserialize, Serialize};

use crate::puzzle::Puzzle;

/// Current state plus up to `history - 1` previous states, oldest first.
///
/// With a history length of 1 the previous-state list is always empty and a
/// position is interchangeable with its state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position<S> {
    state: S,
    previous: Vec<S>,
}

impl<S: Clone> Position<S> {
    /// Position with no recorded history.
    pub fn new(state: S) -> Self {
        Self {
            state,
            previous: Vec::new(),
        }
    }

    /// Build a position from a trajectory, keeping the last `history` states.
    ///
    /// Returns `None` for an empty trajectory.
    pub fn from_trajectory(trajectory: &[S], history: usize) -> Option<Self> {
        let (state, earlier) = trajectory.split_last()?;
        let keep = history.saturating_sub(1).min(earlier.len());
        Some(Self {
            state: state.clone(),
            previous: earlier[earlier.len() - keep..].to_vec(),
        })
    }

    /// Position after moving to `next`, retaining at most `history - 1`
    /// previous states.
    pub fn advance(&self, next: S, history: usize) -> Self {
        let keep = history.saturating_sub(1);
        let mut previous = Vec::with_capacity(keep);
        if keep > 0 {
            let from_old = keep - 1;
            let start = self.previous.len().saturating_sub(from_old);
            previous.extend_from_slice(&self.previous[start..]);
            previous.push(self.state.clone());
        }
        Self {
            state: next,
            previous,
        }
    }
}

impl<S> Position<S> {
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Previous states, oldest first.
    pub fn previous(&self) -> &[S] {
        &self.previous
    }

    pub fn has_history(&self) -> bool {
        !self.previous.is_empty()
    }

    pub fn into_state(self) -> S {
        self.state
    }

    /// Image of the whole position under a puzzle symmetry.
    pub fn transform<P: Puzzle<State = S>>(&self, puzzle: &P, sym: usize) -> Self
    where
        S: Clone,
    {
        if sym == 0 {
            return Self {
                state: self.state.clone(),
                previous: self.previous.clone(),
            };
        }
        Self {
            state: puzzle.transform_state(&self.state, sym),
            previous: self
                .previous
                .iter()
                .map(|s| puzzle.transform_state(s, sym))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::puzzle::test_puzzle::Ring;

    #[test]
    fn test_advance_without_history() {
        let pos = Position::new(3u8);
        let next = pos.advance(4, 1);
        assert_eq!(*next.state(), 4);
        assert!(next.previous().is_empty());
    }

    #[test]
    fn test_advance_keeps_bounded_history() {
        let pos = Position::new(1u8).advance(2, 3).advance(3, 3).advance(4, 3);
        assert_eq!(*pos.state(), 4);
        assert_eq!(pos.previous(), &[2, 3]);
    }

    #[test]
    fn test_from_trajectory() {
        let pos = Position::from_trajectory(&[0u8, 1, 2, 3], 2).unwrap();
        assert_eq!(*pos.state(), 3);
        assert_eq!(pos.previous(), &[2]);

        let short = Position::from_trajectory(&[9u8], 4).unwrap();
        assert!(!short.has_history());

        assert!(Position::<u8>::from_trajectory(&[], 2).is_none());
    }

    #[test]
    fn test_accessors_do_not_require_clone() {
        #[derive(Debug, PartialEq, Deserialize)]
        struct Opaque(u32);

        let pos: Position<Opaque> =
            serde_json::from_str(r#"{"state":3,"previous":[1,2]}"#).unwrap();
        assert_eq!(pos.state(), &Opaque(3));
        assert_eq!(pos.previous(), &[Opaque(1), Opaque(2)]);
        assert!(pos.has_history());
        assert_eq!(pos.into_state(), Opaque(3));
    }

    #[test]
    fn test_transform_maps_every_state() {
        let ring = Ring { modulus: 5 };
        let pos = Position::new(1u8).advance(2, 2);
        let mirrored = pos.transform(&ring, 1);
        assert_eq!(*mirrored.state(), 3);
        assert_eq!(mirrored.previous(), &[4]);
        assert_eq!(pos.transform(&ring, 0), pos);
    }
}
