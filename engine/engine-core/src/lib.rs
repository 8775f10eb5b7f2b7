//! Core traits and types for the Cubezero puzzle engine
//!
//! This crate provides the abstractions search and self-play are written
//! against:
//! - `Puzzle`: deterministic single-agent transition system with a solved
//!   state and an optional symmetry group
//! - `Position`: a state plus the bounded history an oracle conditions on
//! - `symmetry`: canonical forms and policy frame changes
//! - `scramble`: curriculum start states by random walk from the solved state

pub mod metadata;
pub mod position;
pub mod puzzle;
pub mod symmetry;

// Re-export main types for convenience
pub use metadata::PuzzleMetadata;
pub use position::Position;
pub use puzzle::{scramble, Puzzle, Status};
pub use symmetry::{canonicalize, transform_policy, untransform_policy};
