/*!
 * Tests for the staging store
 */

use anyhow::Result;
use bytes::Bytes;
use yomiage::errors::{StagingError, SynthesisError};
use yomiage::staging::StagingStore;

use crate::common;

#[tokio::test]
async fn test_prepare_withLeftoverDirectory_shouldStartEmpty() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let store = StagingStore::new(temp_dir.path().join("tmp"), "wav");

    let directory = store.prepare("abcde").await?;
    store.write(&directory, "abcde-009000.wav", b"stale").await?;

    let directory = store.prepare("abcde").await?;

    assert!(directory.path().is_dir());
    assert!(store.list(&directory).await?.is_empty());
    Ok(())
}

#[test]
fn test_directoryFor_withPathLikeId_shouldReject() {
    let store = StagingStore::new("tmp", "wav");

    assert!(matches!(store.directory_for("../abcde"), Err(StagingError::InvalidDocumentId(_))));
    assert!(matches!(store.directory_for(".."), Err(StagingError::InvalidDocumentId(_))));
    assert!(matches!(store.directory_for(""), Err(StagingError::InvalidDocumentId(_))));
    assert!(store.directory_for("abcde").is_ok());
}

#[tokio::test]
async fn test_list_shouldSortNamesAndIgnoreOtherFiles() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let store = StagingStore::new(temp_dir.path(), ".wav");
    let directory = store.prepare("abcde").await?;

    store.write(&directory, "abcde-001000.wav", b"World").await?;
    store.write(&directory, "abcde-000001.wav", b"b").await?;
    store.write(&directory, "abcde-000000.wav", b"Hello").await?;
    store.write(&directory, "notes.txt", b"not audio").await?;

    let names = store.list(&directory).await?;

    assert_eq!(names, vec!["abcde-000000.wav", "abcde-000001.wav", "abcde-001000.wav"]);
    Ok(())
}

#[tokio::test]
async fn test_writeStream_shouldPersistEveryChunk() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let store = StagingStore::new(temp_dir.path(), "wav");
    let directory = store.prepare("abcde").await?;

    let stream = futures::stream::iter(vec![
        Ok::<_, SynthesisError>(Bytes::from_static(b"RI")),
        Ok(Bytes::from_static(b"FF")),
    ]);
    let written = store.write_stream(&directory, "abcde-000000.wav", stream).await?;

    assert_eq!(written, 4);
    assert_eq!(std::fs::read(directory.fragment_path("abcde-000000.wav"))?, b"RIFF");
    Ok(())
}

#[tokio::test]
async fn test_writeStream_withBrokenStream_shouldNotLeavePartialFragment() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let store = StagingStore::new(temp_dir.path(), "wav");
    let directory = store.prepare("abcde").await?;

    let stream = futures::stream::iter(vec![
        Ok(Bytes::from_static(b"RI")),
        Err(SynthesisError::ConnectionError("connection reset".to_string())),
    ]);
    let result = store.write_stream(&directory, "abcde-000000.wav", stream).await;

    assert!(matches!(result, Err(SynthesisError::ConnectionError(_))));
    assert!(store.list(&directory).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_dispose_shouldRemoveDirectoryAndFragments() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let store = StagingStore::new(temp_dir.path(), "wav");
    let directory = store.prepare("abcde").await?;
    store.write(&directory, "abcde-000000.wav", b"Hello").await?;

    store.dispose(&directory).await?;

    assert!(!directory.path().exists());
    Ok(())
}

#[tokio::test]
async fn test_existing_shouldListStagedDocumentsInOrder() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let store = StagingStore::new(temp_dir.path().join("tmp"), "wav");
    assert!(store.existing().await?.is_empty());

    store.prepare("fghij").await?;
    store.prepare("abcde").await?;
    common::create_test_file(store.root(), "stray.wav", "")?;

    let ids: Vec<String> = store
        .existing()
        .await?
        .iter()
        .map(|d| d.doc_id().to_string())
        .collect();

    assert_eq!(ids, vec!["abcde", "fghij"]);
    Ok(())
}

#[tokio::test]
async fn test_manifest_shouldBeAbsentUntilWrittenAndNotListed() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let store = StagingStore::new(temp_dir.path().join("tmp"), "wav");
    let directory = store.prepare("abcde").await?;
    store.write(&directory, "abcde-000000.wav", b"Hello").await?;

    assert_eq!(store.read_manifest(&directory).await?, None);

    let names = vec!["abcde-000000.wav".to_string(), "abcde-001000.wav".to_string()];
    store.write_manifest(&directory, &names).await?;

    assert_eq!(store.read_manifest(&directory).await?, Some(names));
    assert_eq!(store.list(&directory).await?, vec!["abcde-000000.wav"]);
    Ok(())
}

#[tokio::test]
async fn test_existing_withRootBeingFile_shouldReportListError() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let root = common::create_test_file(temp_dir.path(), "tmp", "not a directory")?;
    // Every path below the root now fails with "not a directory"
    let store = StagingStore::new(root.join("nested"), "wav");

    let result = store.existing().await;

    assert!(matches!(result, Err(StagingError::List { .. })));
    Ok(())
}

#[tokio::test]
async fn test_prepare_withUncheckablePath_shouldReportRemoveError() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let root = common::create_test_file(temp_dir.path(), "tmp", "not a directory")?;
    let store = StagingStore::new(root, "wav");

    let result = store.prepare("abcde").await;

    assert!(matches!(result, Err(StagingError::Remove { .. })));
    Ok(())
}
