/*!
 * Tests for merging staged fragments
 */

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use yomiage::errors::MergeError;
use yomiage::logging::CapturingLog;
use yomiage::merger::{AudioConcatenator, ByteConcatenator, FfmpegConcatenator, Merger};
use yomiage::staging::{StagingDirectory, StagingStore};

use crate::common::{self, FailingConcatenator};

struct Fixture {
    _temp_dir: tempfile::TempDir,
    store: StagingStore,
    directory: StagingDirectory,
    output_dir: std::path::PathBuf,
}

async fn fixture(fragments: &[(&str, &str)]) -> Result<Fixture> {
    let temp_dir = common::create_temp_dir()?;
    let store = StagingStore::new(temp_dir.path().join("tmp"), "wav");
    let directory = store.prepare("abcde").await?;
    for (name, content) in fragments {
        store.write(&directory, name, content.as_bytes()).await?;
    }

    Ok(Fixture {
        output_dir: temp_dir.path().join("download"),
        _temp_dir: temp_dir,
        store,
        directory,
    })
}

fn merger(fixture: &Fixture, concatenator: Arc<dyn AudioConcatenator>) -> Merger {
    Merger::new(concatenator, fixture.output_dir.clone(), "wav", Arc::new(CapturingLog::new()))
}

fn names(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[tokio::test]
async fn test_merge_withCompleteFragments_shouldConcatenateInNameOrder() -> Result<()> {
    // Written out of order on purpose
    let fixture = fixture(&[
        ("abcde-001000.wav", "World"),
        ("abcde-000001.wav", ", "),
        ("abcde-000000.wav", "Hello"),
    ])
    .await?;
    let merger = merger(&fixture, Arc::new(ByteConcatenator));

    let output = merger
        .merge(
            &fixture.store,
            &fixture.directory,
            &names(&["abcde-000000.wav", "abcde-000001.wav", "abcde-001000.wav"]),
        )
        .await?;

    assert_eq!(output, fixture.output_dir.join("abcde.wav"));
    assert_eq!(std::fs::read_to_string(&output)?, "Hello, World");
    assert!(!fixture.directory.path().exists());
    assert!(!fixture.output_dir.join(".abcde.partial.wav").exists());
    Ok(())
}

#[tokio::test]
async fn test_merge_withMissingFragment_shouldFailAndKeepStaging() -> Result<()> {
    let fixture = fixture(&[("abcde-000000.wav", "Hello")]).await?;
    let merger = merger(&fixture, Arc::new(ByteConcatenator));

    let result = merger
        .merge(
            &fixture.store,
            &fixture.directory,
            &names(&["abcde-000000.wav", "abcde-001000.wav"]),
        )
        .await;

    match result {
        Err(MergeError::Incomplete { missing, unexpected, .. }) => {
            assert_eq!(missing, vec!["abcde-001000.wav"]);
            assert!(unexpected.is_empty());
        }
        other => panic!("expected an incomplete merge, got {:?}", other),
    }
    assert!(!merger.output_path("abcde").exists());
    assert!(fixture.directory.fragment_path("abcde-000000.wav").exists());
    Ok(())
}

#[tokio::test]
async fn test_merge_withForeignFragment_shouldFail() -> Result<()> {
    let fixture = fixture(&[("abcde-000000.wav", "Hello"), ("abcde-005000.wav", "stale")]).await?;
    let merger = merger(&fixture, Arc::new(ByteConcatenator));

    let result = merger
        .merge(&fixture.store, &fixture.directory, &names(&["abcde-000000.wav"]))
        .await;

    assert!(matches!(result, Err(MergeError::Incomplete { ref unexpected, .. }) if unexpected == &vec!["abcde-005000.wav".to_string()]));
    Ok(())
}

#[tokio::test]
async fn test_merge_withFailingConcatenator_shouldLeaveNoArtifact() -> Result<()> {
    let fixture = fixture(&[("abcde-000000.wav", "Hello")]).await?;
    let merger = merger(&fixture, Arc::new(FailingConcatenator));

    let result = merger
        .merge(&fixture.store, &fixture.directory, &names(&["abcde-000000.wav"]))
        .await;

    assert!(matches!(result, Err(MergeError::ToolFailed(_))));
    assert!(!merger.output_path("abcde").exists());
    assert!(fixture.directory.path().exists());
    Ok(())
}

#[tokio::test]
async fn test_mergeStaged_withoutManifest_shouldRefuseAndKeepStaging() -> Result<()> {
    let fixture = fixture(&[("abcde-000000.wav", "Hello")]).await?;
    let merger = merger(&fixture, Arc::new(ByteConcatenator));

    let result = merger.merge_staged(&fixture.store, &fixture.directory).await;

    assert!(matches!(result, Err(MergeError::Unsealed { .. })));
    assert!(!merger.output_path("abcde").exists());
    assert!(fixture.directory.fragment_path("abcde-000000.wav").exists());
    Ok(())
}

#[tokio::test]
async fn test_mergeStaged_withManifest_shouldMergeListedFragments() -> Result<()> {
    let fixture = fixture(&[("abcde-001000.wav", "World"), ("abcde-000000.wav", "Hello")]).await?;
    fixture
        .store
        .write_manifest(&fixture.directory, &names(&["abcde-000000.wav", "abcde-001000.wav"]))
        .await?;
    let merger = merger(&fixture, Arc::new(ByteConcatenator));

    let output = merger.merge_staged(&fixture.store, &fixture.directory).await?;

    assert_eq!(std::fs::read_to_string(&output)?, "HelloWorld");
    assert!(!fixture.directory.path().exists());
    Ok(())
}

#[tokio::test]
async fn test_mergeStaged_withForeignManifestEntry_shouldFail() -> Result<()> {
    let fixture = fixture(&[("abcde-000000.wav", "Hello")]).await?;
    fixture
        .store
        .write_manifest(&fixture.directory, &names(&["abcde-000000.wav", "fghij-000000.wav"]))
        .await?;
    let merger = merger(&fixture, Arc::new(ByteConcatenator));

    let result = merger.merge_staged(&fixture.store, &fixture.directory).await;

    assert!(matches!(result, Err(MergeError::ForeignEntry { ref entry, .. }) if entry == "fghij-000000.wav"));
    assert!(!merger.output_path("abcde").exists());
    Ok(())
}

#[tokio::test]
async fn test_ffmpegConcatenator_withMissingProgram_shouldReportToolUnavailable() -> Result<()> {
    let fixture = fixture(&[("abcde-000000.wav", "Hello")]).await?;
    let concatenator = FfmpegConcatenator::new("yomiage-test-no-such-ffmpeg", Duration::from_secs(5));
    let merger = merger(&fixture, Arc::new(concatenator));

    let result = merger
        .merge(&fixture.store, &fixture.directory, &names(&["abcde-000000.wav"]))
        .await;

    assert!(matches!(result, Err(MergeError::ToolUnavailable(_))));
    assert!(fixture.directory.path().exists());
    Ok(())
}
