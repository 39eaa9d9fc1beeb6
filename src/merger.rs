/*!
 * Merging of staged fragments into one audio file per document.
 *
 * The merger lists a staging directory, checks that it holds exactly the
 * fragments the document expects, and hands the names in sorted order to an
 * `AudioConcatenator`. The artifact is first written under a hidden partial
 * name and renamed into place, so `{output_dir}/{doc_id}.{ext}` only ever
 * exists as a complete merge.
 */

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::app_config::MergeConfig;
use crate::errors::MergeError;
use crate::logging::SharedLog;
use crate::naming::NamingScheme;
use crate::staging::{StagingDirectory, StagingStore};

/// Joins audio files, in the given order, into one output file
#[async_trait]
pub trait AudioConcatenator: Send + Sync + Debug {
    async fn concatenate(&self, inputs: &[PathBuf], output: &Path) -> Result<(), MergeError>;
}

/// Concatenates with the ffmpeg concat demuxer, copying streams without re-encoding
#[derive(Debug, Clone)]
pub struct FfmpegConcatenator {
    program: String,
    timeout: Duration,
}

impl FfmpegConcatenator {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn from_config(config: &MergeConfig) -> Self {
        Self::new(config.ffmpeg_path.clone(), Duration::from_secs(config.timeout_secs))
    }

    /// Write the concat demuxer input list to a temporary file
    fn write_list(inputs: &[PathBuf]) -> Result<tempfile::NamedTempFile, MergeError> {
        let mut list = tempfile::Builder::new()
            .prefix("yomiage-concat-")
            .suffix(".txt")
            .tempfile()
            .map_err(|source| MergeError::Io {
                path: std::env::temp_dir(),
                source,
            })?;

        for input in inputs {
            let line = format!("file '{}'\n", concat_list_escape(input)?);
            list.write_all(line.as_bytes()).map_err(|source| MergeError::Io {
                path: list.path().to_path_buf(),
                source,
            })?;
        }
        list.flush().map_err(|source| MergeError::Io {
            path: list.path().to_path_buf(),
            source,
        })?;

        Ok(list)
    }

    /// Filter ffmpeg stderr to the lines that describe the failure
    fn filter_ffmpeg_stderr(stderr: &str) -> String {
        let noise_prefixes = [
            "ffmpeg version",
            "  built with",
            "  configuration:",
            "  lib",
            "Input #",
            "  Metadata:",
            "  Duration:",
            "  Stream #",
            "Output #",
            "Stream mapping:",
            "Press [q]",
        ];

        let meaningful: Vec<&str> = stderr
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.trim().is_empty())
            .filter(|line| !noise_prefixes.iter().any(|p| line.starts_with(p)))
            .collect();

        if meaningful.is_empty() {
            "unknown ffmpeg error (stderr was empty after filtering)".to_string()
        } else {
            meaningful.join("; ")
        }
    }
}

/// Quote a path for a concat demuxer `file` directive
fn concat_list_escape(path: &Path) -> Result<String, MergeError> {
    let absolute = std::path::absolute(path).map_err(|source| MergeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(absolute.to_string_lossy().replace('\'', r"'\''"))
}

#[async_trait]
impl AudioConcatenator for FfmpegConcatenator {
    async fn concatenate(&self, inputs: &[PathBuf], output: &Path) -> Result<(), MergeError> {
        let list = Self::write_list(inputs)?;

        let ffmpeg_future = Command::new(&self.program)
            .args(["-y", "-hide_banner", "-loglevel", "error"])
            .args(["-f", "concat", "-safe", "0", "-i"])
            .arg(list.path())
            .args(["-c", "copy"])
            .arg(output)
            .kill_on_drop(true)
            .output();

        let result = tokio::select! {
            result = ffmpeg_future => {
                result.map_err(|e| MergeError::ToolUnavailable(format!("{}: {}", self.program, e)))?
            },
            _ = tokio::time::sleep(self.timeout) => {
                return Err(MergeError::Timeout { secs: self.timeout.as_secs() });
            }
        };

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(MergeError::ToolFailed(Self::filter_ffmpeg_stderr(&stderr)));
        }

        Ok(())
    }
}

/// Appends the raw bytes of every input. Only meaningful for headerless
/// formats; used where ffmpeg is not available.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteConcatenator;

#[async_trait]
impl AudioConcatenator for ByteConcatenator {
    async fn concatenate(&self, inputs: &[PathBuf], output: &Path) -> Result<(), MergeError> {
        let io_error = |path: &Path| {
            let path = path.to_path_buf();
            move |source| MergeError::Io { path, source }
        };

        let mut file = tokio::fs::File::create(output).await.map_err(io_error(output))?;
        for input in inputs {
            let audio = tokio::fs::read(input).await.map_err(io_error(input))?;
            file.write_all(&audio).await.map_err(io_error(output))?;
        }
        file.flush().await.map_err(io_error(output))?;
        Ok(())
    }
}

/// Produces final artifacts from staging directories
#[derive(Debug, Clone)]
pub struct Merger {
    concatenator: Arc<dyn AudioConcatenator>,
    output_dir: PathBuf,
    extension: String,
    // Only used to recognise fragment names
    naming: NamingScheme,
    log: SharedLog,
}

impl Merger {
    pub fn new(
        concatenator: Arc<dyn AudioConcatenator>,
        output_dir: impl Into<PathBuf>,
        extension: impl Into<String>,
        log: SharedLog,
    ) -> Self {
        let extension = extension.into().trim_start_matches('.').to_string();
        Self {
            concatenator,
            output_dir: output_dir.into(),
            naming: NamingScheme::new(1, extension.clone()),
            extension,
            log,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Location of the final artifact of a document
    pub fn output_path(&self, doc_id: &str) -> PathBuf {
        self.output_dir.join(format!("{}.{}", doc_id, self.extension))
    }

    fn partial_path(&self, doc_id: &str) -> PathBuf {
        self.output_dir.join(format!(".{}.partial.{}", doc_id, self.extension))
    }

    /// Merge a document whose segments all synthesized. The staged fragments
    /// must be exactly `expected`; the staging directory is disposed after a
    /// successful merge and kept otherwise.
    pub async fn merge(
        &self,
        store: &StagingStore,
        directory: &StagingDirectory,
        expected: &[String],
    ) -> Result<PathBuf, MergeError> {
        let staged = store.list(directory).await?;

        let staged_set: BTreeSet<&String> = staged.iter().collect();
        let expected_set: BTreeSet<&String> = expected.iter().collect();
        let missing: Vec<String> = expected_set.difference(&staged_set).map(|s| s.to_string()).collect();
        let unexpected: Vec<String> = staged_set.difference(&expected_set).map(|s| s.to_string()).collect();

        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(MergeError::Incomplete {
                doc_id: directory.doc_id().to_string(),
                missing,
                unexpected,
            });
        }

        self.concatenate_staged(store, directory, &staged).await
    }

    /// Merge a staging directory left by an earlier run. Only directories
    /// whose synthesis finished carry a manifest; the staged fragments must
    /// match it exactly, as in `merge`.
    pub async fn merge_staged(
        &self,
        store: &StagingStore,
        directory: &StagingDirectory,
    ) -> Result<PathBuf, MergeError> {
        let doc_id = directory.doc_id();
        let Some(expected) = store.read_manifest(directory).await? else {
            return Err(MergeError::Unsealed {
                doc_id: doc_id.to_string(),
            });
        };

        let foreign = expected.iter().find(|name| {
            !self
                .naming
                .parse(name)
                .is_some_and(|(owner, _, _)| owner == doc_id)
        });
        if let Some(entry) = foreign {
            return Err(MergeError::ForeignEntry {
                doc_id: doc_id.to_string(),
                entry: entry.clone(),
            });
        }

        self.merge(store, directory, &expected).await
    }

    async fn concatenate_staged(
        &self,
        store: &StagingStore,
        directory: &StagingDirectory,
        staged: &[String],
    ) -> Result<PathBuf, MergeError> {
        let doc_id = directory.doc_id();
        if staged.is_empty() {
            return Err(MergeError::NoFragments {
                doc_id: doc_id.to_string(),
            });
        }

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| MergeError::Io {
                path: self.output_dir.clone(),
                source,
            })?;

        let inputs: Vec<PathBuf> = staged.iter().map(|name| directory.fragment_path(name)).collect();
        let partial = self.partial_path(doc_id);
        let output = self.output_path(doc_id);

        self.log.debug(&format!(
            "Merging {} fragments of '{}' into {:?}",
            inputs.len(),
            doc_id,
            output
        ));

        if let Err(e) = self.concatenator.concatenate(&inputs, &partial).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }

        if let Err(source) = tokio::fs::rename(&partial, &output).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(MergeError::Io { path: output, source });
        }

        // The artifact is complete at this point; a leftover directory is only clutter
        if let Err(e) = store.dispose(directory).await {
            self.log.warn(&format!("Merged '{}' but could not clean up staging: {}", doc_id, e));
        }

        Ok(output)
    }
}
