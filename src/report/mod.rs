//! Compliance report generation.
//!
//! The verdict is derived from a snapshot of all five slots, rendered by a
//! `ReportRenderer` and written to a new file in the reports directory.
//! Failures here never affect the bench itself; callers surface them and
//! carry on.

pub mod render;
pub mod verdict;

pub use render::{ReportDocument, ReportRenderer, TextReportRenderer};
pub use verdict::{compute_verdict, ReportVerdict, VerdictRule};

use crate::state::{OperatorRecord, SlotTable};
use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Timestamp part of report file names, unique to the second.
const FILE_STAMP_FORMAT: &str = "%d.%m.%Y_%H%M%S";

/// Give up after this many same-second collisions.
const MAX_NAME_ATTEMPTS: u32 = 100;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to create reports directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write report '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render report: {0}")]
    Render(String),

    #[error("no free report file name in '{0}'")]
    NameExhausted(PathBuf),
}

pub struct ReportGenerator {
    directory: PathBuf,
    renderer: Box<dyn ReportRenderer>,
}

impl ReportGenerator {
    /// Text reports under `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self::with_renderer(directory, Box::new(TextReportRenderer))
    }

    pub fn with_renderer(
        directory: impl Into<PathBuf>,
        renderer: Box<dyn ReportRenderer>,
    ) -> Self {
        Self {
            directory: directory.into(),
            renderer,
        }
    }

    pub fn generate(
        &self,
        record: &OperatorRecord,
        verdict: ReportVerdict,
        slots: &SlotTable,
    ) -> Result<PathBuf, ReportError> {
        self.generate_at(record, verdict, slots, Local::now())
    }

    /// Same as `generate` with an explicit timestamp.
    pub fn generate_at(
        &self,
        record: &OperatorRecord,
        verdict: ReportVerdict,
        slots: &SlotTable,
        generated_at: DateTime<Local>,
    ) -> Result<PathBuf, ReportError> {
        let document = ReportDocument {
            record,
            verdict,
            slots,
            generated_at,
        };
        let bytes = self.renderer.render(&document)?;

        std::fs::create_dir_all(&self.directory).map_err(|source| ReportError::CreateDir {
            path: self.directory.clone(),
            source,
        })?;

        let stem = format!("report_{}", generated_at.format(FILE_STAMP_FORMAT));
        let path = write_new_file(&self.directory, &stem, self.renderer.extension(), &bytes)
            .map_err(|e| {
                warn!(error = %e, "Report generation failed");
                e
            })?;

        info!(path = %path.display(), ?verdict, "Report generated");
        Ok(path)
    }
}

impl std::fmt::Debug for ReportGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportGenerator")
            .field("directory", &self.directory)
            .field("extension", &self.renderer.extension())
            .finish()
    }
}

/// Create `<stem>.<ext>`, or `<stem>_N.<ext>` if that name is taken.
fn write_new_file(
    dir: &Path,
    stem: &str,
    ext: &str,
    bytes: &[u8],
) -> Result<PathBuf, ReportError> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = if attempt == 0 {
            format!("{stem}.{ext}")
        } else {
            format!("{stem}_{attempt}.{ext}")
        };
        let path = dir.join(name);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(source) => return Err(ReportError::Write { path, source }),
        };

        return match file.write_all(bytes).and_then(|_| file.sync_all()) {
            Ok(()) => Ok(path),
            Err(source) => Err(ReportError::Write { path, source }),
        };
    }

    Err(ReportError::NameExhausted(dir.to_path_buf()))
}
