use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::errors::{StagingError, SynthesisError};

// @module: Per-document working directories for in-flight audio fragments

/// File recording the fragment names of a document whose synthesis finished.
/// It has no extension, so it never shows up among the fragments.
const MANIFEST_FILE: &str = ".fragments";

/// Working directory of one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingDirectory {
    // @field: Owning document
    doc_id: String,
    // @field: Location on disk
    path: PathBuf,
}

impl StagingDirectory {
    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a fragment inside this directory
    pub fn fragment_path(&self, file_name: &str) -> PathBuf {
        self.path.join(file_name)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.path.join(MANIFEST_FILE)
    }
}

/// Owns the staging area: one subdirectory per document
#[derive(Debug, Clone)]
pub struct StagingStore {
    root: PathBuf,
    extension: String,
}

impl StagingStore {
    /// Create a store rooted at `root`, holding fragments with `extension`
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into().trim_start_matches('.').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Staging directory of a document, without touching the disk
    pub fn directory_for(&self, doc_id: &str) -> Result<StagingDirectory, StagingError> {
        if doc_id.is_empty()
            || doc_id == "."
            || doc_id == ".."
            || doc_id.contains(['/', '\\'])
        {
            return Err(StagingError::InvalidDocumentId(doc_id.to_string()));
        }

        Ok(StagingDirectory {
            doc_id: doc_id.to_string(),
            path: self.root.join(doc_id),
        })
    }

    /// Create an empty staging directory, discarding whatever a previous run left
    pub async fn prepare(&self, doc_id: &str) -> Result<StagingDirectory, StagingError> {
        let directory = self.directory_for(doc_id)?;

        let leftover = tokio::fs::try_exists(&directory.path)
            .await
            .map_err(|source| StagingError::Remove {
                path: directory.path.clone(),
                source,
            })?;
        if leftover {
            tokio::fs::remove_dir_all(&directory.path)
                .await
                .map_err(|source| StagingError::Remove {
                    path: directory.path.clone(),
                    source,
                })?;
        }

        tokio::fs::create_dir_all(&directory.path)
            .await
            .map_err(|source| StagingError::Create {
                path: directory.path.clone(),
                source,
            })?;

        Ok(directory)
    }

    /// Persist one fragment
    pub async fn write(
        &self,
        directory: &StagingDirectory,
        file_name: &str,
        audio: &[u8],
    ) -> Result<PathBuf, StagingError> {
        let path = directory.fragment_path(file_name);
        tokio::fs::write(&path, audio)
            .await
            .map_err(|source| StagingError::Write {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    /// Persist one fragment from a byte stream as it arrives. A fragment that
    /// fails half way is removed so the directory only holds complete ones.
    pub async fn write_stream<S>(
        &self,
        directory: &StagingDirectory,
        file_name: &str,
        stream: S,
    ) -> Result<u64, SynthesisError>
    where
        S: Stream<Item = Result<Bytes, SynthesisError>> + Send,
    {
        let path = directory.fragment_path(file_name);
        let result = Self::copy_stream(&path, stream).await;

        if result.is_err() {
            let _ = tokio::fs::remove_file(&path).await;
        }
        result
    }

    async fn copy_stream<S>(path: &Path, stream: S) -> Result<u64, SynthesisError>
    where
        S: Stream<Item = Result<Bytes, SynthesisError>> + Send,
    {
        let write_error = |e: std::io::Error| SynthesisError::StreamWrite {
            path: path.to_path_buf(),
            message: e.to_string(),
        };

        let mut file = tokio::fs::File::create(path).await.map_err(write_error)?;
        let mut written = 0u64;

        futures::pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await.map_err(write_error)?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(write_error)?;
        Ok(written)
    }

    /// Record that every fragment of the document is staged. Only a directory
    /// with a manifest may be merged later without re-synthesizing.
    pub async fn write_manifest(
        &self,
        directory: &StagingDirectory,
        file_names: &[String],
    ) -> Result<(), StagingError> {
        let path = directory.manifest_path();
        let mut content = file_names.join("\n");
        content.push('\n');

        tokio::fs::write(&path, content)
            .await
            .map_err(|source| StagingError::Write { path, source })
    }

    /// Fragment names recorded by `write_manifest`, or `None` when synthesis
    /// of the document never finished
    pub async fn read_manifest(
        &self,
        directory: &StagingDirectory,
    ) -> Result<Option<Vec<String>>, StagingError> {
        let path = directory.manifest_path();
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(
                content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect(),
            )),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StagingError::Read { path, source }),
        }
    }

    /// Fragment names in naming-scheme order
    pub async fn list(&self, directory: &StagingDirectory) -> Result<Vec<String>, StagingError> {
        let list_error = |source| StagingError::List {
            path: directory.path.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(&directory.path).await.map_err(list_error)?;
        let mut names = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(list_error)? {
            let path = entry.path();
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            let matches_extension = path
                .extension()
                .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(&self.extension));

            if is_file && matches_extension {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    /// Remove a staging directory and everything in it
    pub async fn dispose(&self, directory: &StagingDirectory) -> Result<(), StagingError> {
        tokio::fs::remove_dir_all(&directory.path)
            .await
            .map_err(|source| StagingError::Remove {
                path: directory.path.clone(),
                source,
            })
    }

    /// Staging directories currently on disk, sorted by document id
    pub async fn existing(&self) -> Result<Vec<StagingDirectory>, StagingError> {
        let list_error = |source| StagingError::List {
            path: self.root.clone(),
            source,
        };

        if !tokio::fs::try_exists(&self.root).await.map_err(list_error)? {
            return Ok(Vec::new());
        }

        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(list_error)?;
        let mut directories = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(list_error)? {
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                let doc_id = entry.file_name().to_string_lossy().to_string();
                if let Ok(directory) = self.directory_for(&doc_id) {
                    directories.push(directory);
                }
            }
        }

        directories.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
        Ok(directories)
    }
}
