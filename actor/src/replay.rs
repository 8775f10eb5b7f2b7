//! JSON-lines replay log for games, examples and run decisions.
//!
//! A run writes under `<results_dir>/<version>/`:
//! - `games.jsonl`: one finished self-play game per line
//! - `examples.jsonl`: training examples tagged with their generation
//! - `generations.jsonl`: per-generation summaries
//! - `promotions.jsonl`: evaluation tallies and promotion decisions
//!
//! Later runs list earlier versions in `prev_versions` and warm-start their
//! replay window from those `examples.jsonl` files.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::evaluation::PromotionDecision;
use crate::self_play::GameRecord;
use crate::stats::GenerationSummary;
use crate::training::TrainingExample;

pub const GAMES_FILE: &str = "games.jsonl";
pub const EXAMPLES_FILE: &str = "examples.jsonl";
pub const GENERATIONS_FILE: &str = "generations.jsonl";
pub const PROMOTIONS_FILE: &str = "promotions.jsonl";

/// Where a run's records go.
pub trait EventSink<S>: Send {
    fn record_game(&mut self, record: &GameRecord<S>) -> Result<()>;

    fn record_examples(&mut self, generation: u32, examples: &[TrainingExample<S>]) -> Result<()>;

    fn record_generation(&mut self, summary: &GenerationSummary) -> Result<()>;

    fn record_promotion(&mut self, decision: &PromotionDecision) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl<S> EventSink<S> for NullSink {
    fn record_game(&mut self, _record: &GameRecord<S>) -> Result<()> {
        Ok(())
    }

    fn record_examples(&mut self, _generation: u32, _examples: &[TrainingExample<S>]) -> Result<()> {
        Ok(())
    }

    fn record_generation(&mut self, _summary: &GenerationSummary) -> Result<()> {
        Ok(())
    }

    fn record_promotion(&mut self, _decision: &PromotionDecision) -> Result<()> {
        Ok(())
    }
}

#[derive(Serialize)]
struct ExampleLine<'a, S> {
    generation: u32,
    example: &'a TrainingExample<S>,
}

#[derive(Deserialize)]
struct StoredExample<S> {
    generation: u32,
    example: TrainingExample<S>,
}

/// Appends records to JSON-lines files in the run directory.
#[derive(Debug)]
pub struct JsonlSink {
    dir: PathBuf,
    games: BufWriter<File>,
    examples: BufWriter<File>,
    generations: BufWriter<File>,
    promotions: BufWriter<File>,
}

impl JsonlSink {
    /// Open (or continue) the log for `version` under `results_dir`.
    pub fn create(results_dir: impl AsRef<Path>, version: &str) -> Result<Self> {
        let dir = results_dir.as_ref().join(version);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create run directory {}", dir.display()))?;
        let open = |name: &str| -> Result<BufWriter<File>> {
            let path = dir.join(name);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            Ok(BufWriter::new(file))
        };
        let sink = Self {
            games: open(GAMES_FILE)?,
            examples: open(EXAMPLES_FILE)?,
            generations: open(GENERATIONS_FILE)?,
            promotions: open(PROMOTIONS_FILE)?,
            dir,
        };
        info!("Writing run records to {}", sink.dir.display());
        Ok(sink)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn write_line<T: Serialize + ?Sized>(out: &mut BufWriter<File>, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    out.write_all(b"\n")?;
    Ok(())
}

impl<S: Serialize> EventSink<S> for JsonlSink {
    fn record_game(&mut self, record: &GameRecord<S>) -> Result<()> {
        write_line(&mut self.games, record)
    }

    fn record_examples(&mut self, generation: u32, examples: &[TrainingExample<S>]) -> Result<()> {
        for example in examples {
            write_line(
                &mut self.examples,
                &ExampleLine {
                    generation,
                    example,
                },
            )?;
        }
        Ok(())
    }

    fn record_generation(&mut self, summary: &GenerationSummary) -> Result<()> {
        write_line(&mut self.generations, summary)?;
        // Generation boundaries are the durable checkpoints.
        <Self as EventSink<S>>::flush(self)
    }

    fn record_promotion(&mut self, decision: &PromotionDecision) -> Result<()> {
        write_line(&mut self.promotions, decision)
    }

    fn flush(&mut self) -> Result<()> {
        self.games.flush()?;
        self.examples.flush()?;
        self.generations.flush()?;
        self.promotions.flush()?;
        Ok(())
    }
}

impl Drop for JsonlSink {
    fn drop(&mut self) {
        for out in [
            &mut self.games,
            &mut self.examples,
            &mut self.generations,
            &mut self.promotions,
        ] {
            if let Err(e) = out.flush() {
                warn!("Failed to flush run records: {}", e);
            }
        }
    }
}

/// Examples a previous run recorded, grouped by generation in ascending
/// order. A missing file yields no generations; unreadable lines are skipped.
pub fn load_examples<S: DeserializeOwned>(
    results_dir: impl AsRef<Path>,
    version: &str,
) -> Result<Vec<(u32, Vec<TrainingExample<S>>)>> {
    let path = results_dir.as_ref().join(version).join(EXAMPLES_FILE);
    if !path.exists() {
        warn!("No examples recorded for version {} at {}", version, path.display());
        return Ok(Vec::new());
    }
    let file = File::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;

    let mut by_generation: BTreeMap<u32, Vec<TrainingExample<S>>> = BTreeMap::new();
    let mut skipped = 0usize;
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<StoredExample<S>>(&line) {
            Ok(stored) => by_generation
                .entry(stored.generation)
                .or_default()
                .push(stored.example),
            Err(_) => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!("Skipped {} unreadable example lines in {}", skipped, path.display());
    }
    debug!(
        version,
        generations = by_generation.len(),
        "Loaded recorded examples"
    );
    Ok(by_generation.into_iter().collect())
}
