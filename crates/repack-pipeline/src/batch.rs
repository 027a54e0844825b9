use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};
use crate::pipeline::{ArchiveFailure, Pipeline, ProcessOutcome};

/// Inputs named by `path`: the file itself, or the `*.zip` files directly
/// inside a directory, sorted by name.
pub fn collect_inputs(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        if !is_zip(path) {
            return Err(PipelineError::InvalidInput {
                path:   path.to_path_buf(),
                reason: "not a .zip file",
            });
        }
        return Ok(vec![path.to_path_buf()]);
    }

    let entries = std::fs::read_dir(path).map_err(|e| PipelineError::Io {
        path:   path.to_path_buf(),
        source: e,
    })?;
    let mut inputs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| PipelineError::Io {
            path:   path.to_path_buf(),
            source: e,
        })?;
        let candidate = entry.path();
        if candidate.is_file() && is_zip(&candidate) {
            inputs.push(candidate);
        }
    }
    inputs.sort();
    Ok(inputs)
}

fn is_zip(path: &Path) -> bool { path.extension().is_some_and(|ext| ext == "zip") }

#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<ProcessOutcome>,
    pub failed:    Vec<ArchiveFailure>,
}

impl BatchReport {
    /// True only if every input succeeded.
    pub fn is_success(&self) -> bool { self.failed.is_empty() }

    pub fn total(&self) -> usize { self.succeeded.len() + self.failed.len() }
}

/// Sequential processing of many inputs; one failure never stops the rest.
pub struct Batch<'a> {
    pipeline: &'a Pipeline,
}

impl<'a> Batch<'a> {
    pub fn new(pipeline: &'a Pipeline) -> Self { Self { pipeline } }

    pub fn run<P: AsRef<Path>>(&self, inputs: &[P]) -> BatchReport {
        let mut report = BatchReport::default();
        for input in inputs {
            match self.pipeline.process(input.as_ref()) {
                Ok(outcome) => report.succeeded.push(outcome),
                Err(failure) => report.failed.push(failure),
            }
        }
        tracing::info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "batch finished"
        );
        report
    }
}
