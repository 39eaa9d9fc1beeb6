/*!
 * Common test utilities for the yomiage test suite
 */

use anyhow::Result;
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use yomiage::app_config::Config;
use yomiage::errors::MergeError;
use yomiage::logging::CapturingLog;
use yomiage::merger::{AudioConcatenator, ByteConcatenator};
use yomiage::orchestrator::Orchestrator;
use yomiage::synthesis::mock::MockSynthesizer;

// Re-export the fake voice server module
pub mod fake_voice_server;

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// A scratch input/staging/output layout with a matching configuration
pub struct TestWorkspace {
    pub root: TempDir,
    pub config: Config,
}

impl TestWorkspace {
    /// Create the layout with an empty input directory
    pub fn new() -> Result<Self> {
        let root = create_temp_dir()?;

        let mut config = Config::default();
        config.input_dir = root.path().join("txt");
        config.staging_dir = root.path().join("tmp");
        config.output_dir = root.path().join("download");
        config.synthesis.concurrent_requests = 4;

        fs::create_dir_all(&config.input_dir)?;
        Ok(Self { root, config })
    }

    /// Add a document to the input directory
    pub fn add_document(&self, filename: &str, content: &str) -> Result<PathBuf> {
        create_test_file(&self.config.input_dir, filename, content)
    }

    /// Orchestrator using the mock synthesizer and the byte concatenator
    pub fn orchestrator(&self, synthesizer: &Arc<MockSynthesizer>, log: &CapturingLog) -> Orchestrator {
        self.orchestrator_with(synthesizer, Arc::new(ByteConcatenator), log)
    }

    pub fn orchestrator_with(
        &self,
        synthesizer: &Arc<MockSynthesizer>,
        concatenator: Arc<dyn AudioConcatenator>,
        log: &CapturingLog,
    ) -> Orchestrator {
        Orchestrator::new(
            self.config.clone(),
            synthesizer.clone(),
            concatenator,
            Arc::new(log.clone()),
        )
    }

    /// Final artifact path of a document
    pub fn output(&self, doc_id: &str) -> PathBuf {
        self.config.output_dir.join(format!("{}.wav", doc_id))
    }

    /// Staging directory of a document
    pub fn staging(&self, doc_id: &str) -> PathBuf {
        self.config.staging_dir.join(doc_id)
    }

    /// Sorted file names in a document's staging directory
    pub fn staged_files(&self, doc_id: &str) -> Result<Vec<String>> {
        let mut names = fs::read_dir(self.staging(doc_id))?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        names.sort();
        Ok(names)
    }
}

/// Concatenator that always fails, standing in for a broken ffmpeg
#[derive(Debug, Default)]
pub struct FailingConcatenator;

#[async_trait]
impl AudioConcatenator for FailingConcatenator {
    async fn concatenate(&self, _inputs: &[PathBuf], _output: &Path) -> Result<(), MergeError> {
        Err(MergeError::ToolFailed("simulated concat failure".to_string()))
    }
}
