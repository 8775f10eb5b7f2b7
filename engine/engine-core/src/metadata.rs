//! Puzzle metadata for logging and configuration
//!
//! Describes a puzzle in terms the actor and trainer can use to configure
//! themselves without knowing the concrete state type.

use serde::{Deserialize, Serialize};

/// Metadata about a puzzle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PuzzleMetadata {
    /// Puzzle identifier (e.g., "rotation3")
    pub puzzle_id: String,

    /// Human-readable display name
    pub display_name: String,

    /// Number of possible actions
    pub num_actions: usize,

    /// Short label per action, indexed by action id
    pub action_names: Vec<String>,

    /// Order of the symmetry group (1 when the puzzle declares none)
    pub num_symmetries: usize,

    /// Brief description of the rules
    pub description: String,
}

impl PuzzleMetadata {
    /// Create a new PuzzleMetadata with required fields
    pub fn new(puzzle_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            puzzle_id: puzzle_id.into(),
            display_name: display_name.into(),
            num_actions: 0,
            action_names: Vec::new(),
            num_symmetries: 1,
            description: String::new(),
        }
    }

    /// Builder method for the action labels (also sets `num_actions`)
    pub fn with_actions(mut self, names: Vec<String>) -> Self {
        self.num_actions = names.len();
        self.action_names = names;
        self
    }

    pub fn with_symmetries(mut self, count: usize) -> Self {
        self.num_symmetries = count.max(1);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Label for an action, or its index when unnamed.
    pub fn action_name(&self, action: usize) -> String {
        self.action_names
            .get(action)
            .cloned()
            .unwrap_or_else(|| action.to_string())
    }
}
