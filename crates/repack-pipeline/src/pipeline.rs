//! Pipeline - unwrap every level of a nested archive, act on the leaves, rewrap.
//!
//! Each archive being worked on is a frame on an explicit stack. A frame is
//! pushed when its archive is extracted and popped once every child below
//! it has been rewrapped, at which point it is recompressed into the path it
//! was extracted from and its stage directory is deleted. The root frame is
//! recompressed into the output directory instead.

use std::path::{Path, PathBuf};

use repack_archive::{archive_name, compress, extract};
use repack_fs::{WorkArea, remove_tree};

use crate::config::RepackConfig;
use crate::error::{PipelineError, Result};
use crate::locate::{find_targets, list_tree, locate};
use crate::schema::NestingSchema;
use crate::transform::{Transform, TransformError};

const FAILURE_LISTING: usize = 20;

/// Summary of one successfully processed input.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub input:        PathBuf,
    pub output:       PathBuf,
    /// Internal paths of every leaf the transforms ran on.
    pub leaves:       Vec<String>,
    /// Internal paths of targets skipped by exclusion rules.
    pub excluded:     Vec<String>,
    /// Archives recompressed, root included.
    pub recompressed: usize,
    pub warnings:     Vec<String>,
}

/// Failure of one top-level input, with enough context to find the spot.
#[derive(Debug, thiserror::Error)]
#[error("failed to process '{}' at {internal_path}: {source}", .input.display())]
pub struct ArchiveFailure {
    pub input:         PathBuf,
    /// `root.zip!/a/b.zip!/c.zip` style path of the archive being handled.
    pub internal_path: String,
    pub source:        PipelineError,
    /// First paths of the directory being handled when the failure hit.
    pub structure:     Vec<String>,
}

struct Frame {
    archive:  PathBuf,
    work_dir: PathBuf,
    level:    usize,
    pending:  Vec<PathBuf>,
    label:    String,
}

/// Where the run currently is, for failure reports. `dir` is the deepest
/// directory known to be intact: the parent's while a child is extracted.
struct Position {
    label: String,
    dir:   Option<PathBuf>,
}

/// The recursive repack orchestrator.
/// Builder style: configure the schema and transforms, then process inputs.
pub struct Pipeline {
    schema:     NestingSchema,
    output_dir: PathBuf,
    work_root:  Option<PathBuf>,
    transforms: Vec<Box<dyn Transform>>,
}

impl Pipeline {
    pub fn new(schema: NestingSchema, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            schema,
            output_dir: output_dir.into(),
            work_root: None,
            transforms: Vec::new(),
        }
    }

    /// Pipeline with the configured schema, output, work root and marker.
    pub fn from_config(config: &RepackConfig) -> std::result::Result<Self, TransformError> {
        let mut pipeline = Self::new(config.schema.clone(), config.output_dir.clone())
            .transform(config.marker.to_transform()?);
        pipeline.work_root = config.work_root.clone();
        Ok(pipeline)
    }

    /// Create work areas under `root` instead of the system temp directory.
    pub fn work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = Some(root.into());
        self
    }

    /// Add a transform run on every leaf, in insertion order.
    pub fn transform<T: Transform + 'static>(mut self, transform: T) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    pub fn schema(&self) -> &NestingSchema { &self.schema }

    pub fn output_dir(&self) -> &Path { &self.output_dir }

    /// Output path for `input`.
    pub fn output_for(&self, input: &Path) -> Result<PathBuf> {
        let name = input.file_name().ok_or_else(|| PipelineError::InvalidInput {
            path:   input.to_path_buf(),
            reason: "no file name",
        })?;
        Ok(self.output_dir.join(name))
    }

    /// Process one top-level archive.
    ///
    /// The work area is removed on every exit path. On failure nothing is
    /// written to the output directory.
    pub fn process(&self, input: &Path) -> std::result::Result<ProcessOutcome, ArchiveFailure> {
        let mut position = Position {
            label: display_name(input),
            dir:   None,
        };
        tracing::info!(input = %input.display(), "processing archive");

        match self.run(input, &mut position) {
            Ok(outcome) => {
                tracing::info!(
                    input = %input.display(),
                    output = %outcome.output.display(),
                    leaves = outcome.leaves.len(),
                    excluded = outcome.excluded.len(),
                    "processed archive"
                );
                Ok(outcome)
            }
            Err((source, structure)) => {
                tracing::warn!(input = %input.display(), at = %position.label, error = %source, "processing failed");
                Err(ArchiveFailure {
                    input: input.to_path_buf(),
                    internal_path: position.label,
                    source,
                    structure,
                })
            }
        }
    }

    /// Runs inside a work area; on failure the structure listing is taken
    /// before the work area goes away.
    fn run(
        &self,
        input: &Path,
        position: &mut Position,
    ) -> std::result::Result<ProcessOutcome, (PipelineError, Vec<String>)> {
        let no_listing = |e: PipelineError| (e, Vec::new());

        self.schema.validate().map_err(no_listing)?;
        let output = self.output_for(input).map_err(no_listing)?;
        if same_path(input, &output) {
            return Err(no_listing(PipelineError::OutputIsInput(output)));
        }

        let work = match &self.work_root {
            Some(root) => WorkArea::new_in(root),
            None => WorkArea::new(),
        }
        .map_err(|e| no_listing(e.into()))?;

        let result = self.unwrap_and_rewrap(input, &output, &work, position);
        let result = result.map_err(|e| {
            let listing = position
                .dir
                .as_deref()
                .map(|dir| list_tree(dir, FAILURE_LISTING))
                .unwrap_or_default();
            (e, listing)
        });

        if let Err(e) = work.close() {
            tracing::warn!(error = %e, "failed to remove work area");
        }
        result
    }

    fn unwrap_and_rewrap(
        &self,
        input: &Path,
        output: &Path,
        work: &WorkArea,
        position: &mut Position,
    ) -> Result<ProcessOutcome> {
        let mut outcome = ProcessOutcome {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            ..ProcessOutcome::default()
        };

        let root = self.open_frame(input.to_path_buf(), display_name(input), 0, work, position, &mut outcome)?;
        let mut stack = vec![root];

        while let Some(frame) = stack.last_mut() {
            if let Some(child) = frame.pending.pop() {
                let label = format!("{}!/{}", frame.label, archive_name(&child, &frame.work_dir)?);
                let level = frame.level + 1;
                position.dir = Some(frame.work_dir.clone());
                let next = self.open_frame(child, label, level, work, position, &mut outcome)?;
                stack.push(next);
                continue;
            }

            let Some(frame) = stack.pop() else { break };
            position.label = frame.label.clone();
            position.dir = Some(frame.work_dir.clone());

            let target = if stack.is_empty() {
                std::fs::create_dir_all(&self.output_dir).map_err(|e| PipelineError::Io {
                    path:   self.output_dir.clone(),
                    source: e,
                })?;
                output
            } else {
                frame.archive.as_path()
            };
            compress(&frame.work_dir, target, &frame.work_dir)?;
            remove_tree(&frame.work_dir)?;
            position.dir = None;
            outcome.recompressed += 1;
            tracing::debug!(archive = %frame.label, level = frame.level, "rewrapped");
        }

        Ok(outcome)
    }

    /// Extract `archive` into a fresh stage and work out what happens below it.
    fn open_frame(
        &self,
        archive: PathBuf,
        label: String,
        level: usize,
        work: &WorkArea,
        position: &mut Position,
        outcome: &mut ProcessOutcome,
    ) -> Result<Frame> {
        position.label = label.clone();

        let stem = file_stem(&archive);
        let work_dir = work.stage(&stem)?;
        extract(&archive, &work_dir)?;
        position.dir = Some(work_dir.clone());

        let mut frame = Frame {
            archive,
            work_dir,
            level,
            pending: Vec::new(),
            label,
        };

        let Some(level_spec) = self.schema.levels.get(level) else {
            for transform in &self.transforms {
                transform.apply(&frame.work_dir).map_err(|e| PipelineError::Transform {
                    name:   transform.name().to_string(),
                    source: e,
                })?;
            }
            tracing::info!(archive = %frame.label, "transformed leaf");
            outcome.leaves.push(frame.label.clone());
            return Ok(frame);
        };

        let located = locate(&frame.work_dir, &level_spec.locate, &stem)?;
        if located.fallback {
            let chosen = archive_name(&located.path, &frame.work_dir)?;
            let mut warning = format!(
                "{}: '{}' not found, using '{chosen}'",
                frame.label,
                level_spec.locate.expected_for(&stem)
            );
            if located.is_ambiguous() {
                warning.push_str(&format!(" (first of {} candidates)", located.candidates.len()));
            }
            outcome.warnings.push(warning);
        }

        let targets = find_targets(&located.path, level_spec)?;
        for skipped in &targets.excluded {
            let label = format!("{}!/{}", frame.label, archive_name(skipped, &frame.work_dir)?);
            tracing::warn!(archive = %label, level = %level_spec.name, "excluded");
            outcome.excluded.push(label);
        }
        tracing::info!(
            archive = %frame.label,
            level = %level_spec.name,
            targets = targets.process.len(),
            excluded = targets.excluded.len(),
            "unwrapped level"
        );

        frame.pending = targets.process;
        frame.pending.reverse();
        Ok(frame)
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => matches!((std::path::absolute(a), std::path::absolute(b)), (Ok(a), Ok(b)) if a == b),
    }
}
