//! 3x3 block-rotation puzzle for the Cubezero engine
//!
//! Nine numbered tiles sit on a 3x3 grid. A move rotates one of the four
//! overlapping 2x2 blocks a quarter turn clockwise or counter-clockwise. The
//! puzzle is solved when tile `i` is back at cell `i`.
//!
//! The dihedral group of the square (4 rotations, 4 reflections) acts on
//! the grid; a transform relabels both cells and tiles, which maps the solved
//! grid onto itself and block rotations onto block rotations. This makes it
//! a small stand-in for cube-like puzzles with a large symmetry group.
//!
//! # Usage
//!
//! ```rust
//! use engine_core::Puzzle;
//! use games_rotation::RotationPuzzle;
//!
//! let puzzle = RotationPuzzle::new();
//! let solved = puzzle.solved_state();
//! let turned = puzzle.apply(&solved, 0);
//! assert!(!puzzle.status(&turned).terminal);
//! assert!(puzzle.status(&puzzle.apply(&turned, 1)).terminal);
//! ```

use std::fmt;

use engine_core::{Puzzle, PuzzleMetadata, Status};
use serde::{Deserialize, Serialize};

const SIDE: usize = 3;
const CELLS: usize = SIDE * SIDE;
const BLOCKS: usize = 4;
const NUM_ACTIONS: usize = BLOCKS * 2;
const NUM_SYMMETRIES: usize = 8;

/// Cell permutation: tile at cell `p` moves to cell `perm[p]`.
type Perm = [u8; CELLS];

/// Grid contents: `tiles[cell]` is the label of the tile at that cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Grid {
    tiles: [u8; CELLS],
}

impl Grid {
    pub fn solved() -> Self {
        let mut tiles = [0u8; CELLS];
        for (cell, tile) in tiles.iter_mut().enumerate() {
            *tile = cell as u8;
        }
        Self { tiles }
    }

    /// Build a grid from explicit tile labels. Returns `None` unless the
    /// labels are a permutation of `0..9`.
    pub fn from_tiles(tiles: [u8; CELLS]) -> Option<Self> {
        let mut seen = [false; CELLS];
        for &t in &tiles {
            let slot = seen.get_mut(t as usize)?;
            if *slot {
                return None;
            }
            *slot = true;
        }
        Some(Self { tiles })
    }

    pub fn tiles(&self) -> &[u8; CELLS] {
        &self.tiles
    }

    pub fn is_solved(&self) -> bool {
        self.tiles.iter().enumerate().all(|(c, &t)| c == t as usize)
    }

    /// Number of tiles away from their home cell.
    pub fn misplaced(&self) -> usize {
        self.tiles
            .iter()
            .enumerate()
            .filter(|(c, &t)| *c != t as usize)
            .count()
    }

    fn permuted(&self, perm: &Perm) -> Self {
        let mut tiles = [0u8; CELLS];
        for (cell, &tile) in self.tiles.iter().enumerate() {
            tiles[perm[cell] as usize] = tile;
        }
        Self { tiles }
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..SIDE {
            if row > 0 {
                write!(f, "/")?;
            }
            for col in 0..SIDE {
                write!(f, "{}", self.tiles[row * SIDE + col])?;
            }
        }
        Ok(())
    }
}

/// The puzzle definition with precomputed move and symmetry tables.
#[derive(Debug, Clone)]
pub struct RotationPuzzle {
    moves: [Perm; NUM_ACTIONS],
    symmetries: [Perm; NUM_SYMMETRIES],
    action_map: [[u8; NUM_ACTIONS]; NUM_SYMMETRIES],
    inverse_sym: [u8; NUM_SYMMETRIES],
}

impl Default for RotationPuzzle {
    fn default() -> Self {
        Self::new()
    }
}

impl RotationPuzzle {
    pub fn new() -> Self {
        let mut moves = [[0u8; CELLS]; NUM_ACTIONS];
        for (action, perm) in moves.iter_mut().enumerate() {
            *perm = block_rotation(action / 2, action % 2 == 0);
        }

        let mut symmetries = [[0u8; CELLS]; NUM_SYMMETRIES];
        for (sym, perm) in symmetries.iter_mut().enumerate() {
            *perm = dihedral(sym);
        }

        let mut inverse_sym = [0u8; NUM_SYMMETRIES];
        for (sym, inv) in inverse_sym.iter_mut().enumerate() {
            let found = (0..NUM_SYMMETRIES)
                .find(|&h| compose(&symmetries[sym], &symmetries[h]) == identity())
                .expect("dihedral group is closed under inverses");
            *inv = found as u8;
        }

        // g . move_a . g^-1 is again a block rotation.
        let mut action_map = [[0u8; NUM_ACTIONS]; NUM_SYMMETRIES];
        for sym in 0..NUM_SYMMETRIES {
            let g = &symmetries[sym];
            let g_inv = &symmetries[inverse_sym[sym] as usize];
            for action in 0..NUM_ACTIONS {
                let conjugate = compose(g, &compose(&moves[action], g_inv));
                let image = moves
                    .iter()
                    .position(|m| *m == conjugate)
                    .expect("dihedral symmetry maps block rotations onto block rotations");
                action_map[sym][action] = image as u8;
            }
        }

        Self {
            moves,
            symmetries,
            action_map,
            inverse_sym,
        }
    }

    /// Human-readable name for an action.
    pub fn action_label(action: usize) -> String {
        const BLOCK_NAMES: [&str; BLOCKS] = ["nw", "ne", "sw", "se"];
        let dir = if action % 2 == 0 { "cw" } else { "ccw" };
        format!("{}-{}", BLOCK_NAMES[(action / 2) % BLOCKS], dir)
    }
}

impl Puzzle for RotationPuzzle {
    type State = Grid;

    fn metadata(&self) -> PuzzleMetadata {
        PuzzleMetadata::new("rotation3", "Rotation 3x3")
            .with_actions((0..NUM_ACTIONS).map(Self::action_label).collect())
            .with_symmetries(NUM_SYMMETRIES)
            .with_description("Rotate 2x2 blocks of a 3x3 grid until every tile is home")
    }

    fn num_actions(&self) -> usize {
        NUM_ACTIONS
    }

    fn solved_state(&self) -> Grid {
        Grid::solved()
    }

    fn apply(&self, state: &Grid, action: usize) -> Grid {
        match self.moves.get(action) {
            Some(perm) => state.permuted(perm),
            None => *state,
        }
    }

    fn status(&self, state: &Grid) -> Status {
        if state.is_solved() {
            Status::solved(1.0)
        } else {
            Status::ONGOING
        }
    }

    fn inverse_action(&self, action: usize) -> Option<usize> {
        (action < NUM_ACTIONS).then_some(action ^ 1)
    }

    fn num_symmetries(&self) -> usize {
        NUM_SYMMETRIES
    }

    fn transform_state(&self, state: &Grid, sym: usize) -> Grid {
        let g = &self.symmetries[sym % NUM_SYMMETRIES];
        // Cells move under g and so do the labels, which name home cells.
        let mut tiles = [0u8; CELLS];
        for (cell, &tile) in state.tiles.iter().enumerate() {
            tiles[g[cell] as usize] = g[tile as usize];
        }
        Grid { tiles }
    }

    fn transform_action(&self, action: usize, sym: usize) -> usize {
        self.action_map[sym % NUM_SYMMETRIES]
            .get(action)
            .map(|&a| a as usize)
            .unwrap_or(action)
    }

    fn inverse_symmetry(&self, sym: usize) -> usize {
        self.inverse_sym[sym % NUM_SYMMETRIES] as usize
    }
}

fn identity() -> Perm {
    let mut perm = [0u8; CELLS];
    for (i, p) in perm.iter_mut().enumerate() {
        *p = i as u8;
    }
    perm
}

/// `(a . b)(p) = a(b(p))`
fn compose(a: &Perm, b: &Perm) -> Perm {
    let mut out = [0u8; CELLS];
    for (p, slot) in out.iter_mut().enumerate() {
        *slot = a[b[p] as usize];
    }
    out
}

fn cell(row: usize, col: usize) -> usize {
    row * SIDE + col
}

/// Quarter turn of the 2x2 block whose top-left corner is block `block`.
fn block_rotation(block: usize, clockwise: bool) -> Perm {
    let (row, col) = (block / 2, block % 2);
    let ring = [
        cell(row, col),
        cell(row, col + 1),
        cell(row + 1, col + 1),
        cell(row + 1, col),
    ];
    let mut perm = identity();
    for i in 0..4 {
        let next = if clockwise { (i + 1) % 4 } else { (i + 3) % 4 };
        perm[ring[i]] = ring[next] as u8;
    }
    perm
}

/// Symmetries 0..4 rotate clockwise by 90 degree steps; 4..8 mirror first.
fn dihedral(sym: usize) -> Perm {
    let mut perm = [0u8; CELLS];
    for row in 0..SIDE {
        for col in 0..SIDE {
            let (mut r, mut c) = if sym >= 4 {
                (row, SIDE - 1 - col)
            } else {
                (row, col)
            };
            for _ in 0..(sym % 4) {
                (r, c) = (c, SIDE - 1 - r);
            }
            perm[cell(row, col)] = cell(r, c) as u8;
        }
    }
    perm
}
