// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records one CSV row per logged optimizer step.
//
// Metrics recorded per row:
//   - step:          optimizer step (1-based)
//   - loss:          mean training loss since the previous row
//   - learning_rate: rate used for this step
//   - epoch:         fractional passes over the corpus so far
//
// Output file: <checkpoint dir>/training_log.csv
//
// Example CSV output:
//   step,loss,learning_rate,epoch
//   1,5.612300,0e0,0.0800
//   2,5.598100,4e-5,0.1600
//   ...
//
// The file is recreated at the start of every run, so it always
// describes exactly one run.
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

pub const METRICS_FILE: &str = "training_log.csv";

/// One logged optimizer step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepMetrics {
    pub step:          usize,
    pub loss:          f64,
    pub learning_rate: f64,
    pub epoch:         f64,
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Create (or truncate) the CSV in `dir` and write the header.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;

        let csv_path = dir.join(METRICS_FILE);
        let mut f = fs::File::create(&csv_path)
            .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
        writeln!(f, "step,loss,learning_rate,epoch")?;
        tracing::debug!("Created metrics CSV: '{}'", csv_path.display());

        Ok(Self { csv_path })
    }

    /// Append one row.
    pub fn log(&self, m: &StepMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        writeln!(f, "{},{:.6},{:e},{:.4}", m.step, m.loss, m.learning_rate, m.epoch)?;
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();
        logger.log(&StepMetrics { step: 1, loss: 2.5, learning_rate: 0.0, epoch: 0.25 }).unwrap();
        logger.log(&StepMetrics { step: 2, loss: 2.25, learning_rate: 2e-4, epoch: 0.5 }).unwrap();

        let text = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "step,loss,learning_rate,epoch");
        assert_eq!(lines[1], "1,2.500000,0e0,0.2500");
        assert_eq!(lines[2], "2,2.250000,2e-4,0.5000");
    }

    #[test]
    fn test_new_run_truncates_previous_log() {
        let dir = tempfile::tempdir().unwrap();
        let first = MetricsLogger::new(dir.path()).unwrap();
        first.log(&StepMetrics { step: 1, loss: 1.0, learning_rate: 1.0, epoch: 1.0 }).unwrap();

        let second = MetricsLogger::new(dir.path()).unwrap();
        let text = fs::read_to_string(second.csv_path()).unwrap();
        assert_eq!(text.lines().count(), 1);
    }
}
