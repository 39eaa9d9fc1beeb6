/*!
 * Tests for merging documents left in the staging area
 */

use anyhow::Result;
use log::Level;
use std::sync::Arc;
use yomiage::errors::{DocumentError, MergeError};
use yomiage::logging::CapturingLog;
use yomiage::synthesis::mock::MockSynthesizer;

use crate::common::{FailingConcatenator, TestWorkspace};

#[tokio::test]
async fn test_mergeStaged_afterFailedMerge_shouldProduceArtifact() -> Result<()> {
    let workspace = TestWorkspace::new()?;
    workspace.add_document("abcde.txt", "Hello\nWorld")?;
    let mock = Arc::new(MockSynthesizer::working());
    let log = CapturingLog::new();

    // First run: synthesis succeeds, the merge tool breaks
    let summary = workspace
        .orchestrator_with(&mock, Arc::new(FailingConcatenator), &log)
        .run()
        .await?;
    assert!(matches!(
        summary.failed[0].error,
        DocumentError::Merge(MergeError::ToolFailed(_))
    ));
    assert_eq!(
        workspace.staged_files("abcde")?,
        vec![".fragments", "abcde-000000.wav", "abcde-001000.wav"]
    );
    assert!(!workspace.output("abcde").exists());

    // Retry the merge only
    let summary = workspace.orchestrator(&mock, &log).merge_staged().await?;

    assert!(summary.is_success());
    assert_eq!(summary.succeeded, vec!["abcde"]);
    assert_eq!(std::fs::read_to_string(workspace.output("abcde"))?, "HelloWorld");
    assert!(!workspace.staging("abcde").exists());
    assert_eq!(mock.call_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_mergeStaged_afterFailedSegment_shouldNotProduceArtifact() -> Result<()> {
    let workspace = TestWorkspace::new()?;
    workspace.add_document("abcde.txt", "Hello\nWorld")?;
    let mock = Arc::new(MockSynthesizer::fail_on("World"));
    let log = CapturingLog::new();

    let summary = workspace.orchestrator(&mock, &log).run().await?;
    assert!(summary.succeeded.is_empty());
    assert_eq!(workspace.staged_files("abcde")?, vec!["abcde-000000.wav"]);

    let summary = workspace.orchestrator(&mock, &log).merge_staged().await?;

    assert!(summary.succeeded.is_empty());
    assert!(!workspace.output("abcde").exists());
    assert_eq!(workspace.staged_files("abcde")?, vec!["abcde-000000.wav"]);
    assert!(log.contains(Level::Error, "Document 'abcde' has unfinished segments"));
    Ok(())
}

#[tokio::test]
async fn test_mergeStaged_withFragmentRemovedAfterSynthesis_shouldFail() -> Result<()> {
    let workspace = TestWorkspace::new()?;
    workspace.add_document("abcde.txt", "Hello\nWorld")?;
    let mock = Arc::new(MockSynthesizer::working());
    let log = CapturingLog::new();

    workspace
        .orchestrator_with(&mock, Arc::new(FailingConcatenator), &log)
        .run()
        .await?;
    std::fs::remove_file(workspace.staging("abcde").join("abcde-001000.wav"))?;

    let summary = workspace.orchestrator(&mock, &log).merge_staged().await?;

    assert_eq!(summary.failed.len(), 1);
    assert!(matches!(
        summary.failed[0].error,
        DocumentError::Merge(MergeError::Incomplete { .. })
    ));
    assert!(!workspace.output("abcde").exists());
    Ok(())
}

#[tokio::test]
async fn test_mergeStaged_withEmptyDirectory_shouldSkipWithWarning() -> Result<()> {
    let workspace = TestWorkspace::new()?;
    std::fs::create_dir_all(workspace.staging("abcde"))?;
    let mock = Arc::new(MockSynthesizer::working());
    let log = CapturingLog::new();

    let summary = workspace.orchestrator(&mock, &log).merge_staged().await?;

    assert_eq!(summary.documents_total(), 0);
    assert!(log.contains(Level::Warn, "abcde"));
    assert!(workspace.staging("abcde").exists());
    Ok(())
}

#[tokio::test]
async fn test_mergeStaged_withoutStagingArea_shouldDoNothing() -> Result<()> {
    let workspace = TestWorkspace::new()?;
    let mock = Arc::new(MockSynthesizer::working());
    let log = CapturingLog::new();

    let summary = workspace.orchestrator(&mock, &log).merge_staged().await?;

    assert!(summary.is_success());
    assert_eq!(summary.documents_total(), 0);
    Ok(())
}

#[tokio::test]
async fn test_mergeStaged_withSeveralDocuments_shouldMergeEach() -> Result<()> {
    let workspace = TestWorkspace::new()?;
    for (doc_id, fragments) in [
        ("abcde", vec![("abcde-000000.wav", "Hello"), ("abcde-001000.wav", "World")]),
        ("fghij", vec![("fghij-000001.wav", "Bar"), ("fghij-000000.wav", "Foo")]),
    ] {
        std::fs::create_dir_all(workspace.staging(doc_id))?;
        let mut manifest = String::new();
        for (name, content) in fragments {
            std::fs::write(workspace.staging(doc_id).join(name), content)?;
            manifest.push_str(name);
            manifest.push('\n');
        }
        std::fs::write(workspace.staging(doc_id).join(".fragments"), manifest)?;
    }
    let mock = Arc::new(MockSynthesizer::working());
    let log = CapturingLog::new();

    let summary = workspace.orchestrator(&mock, &log).merge_staged().await?;

    assert_eq!(summary.succeeded, vec!["abcde", "fghij"]);
    assert_eq!(std::fs::read_to_string(workspace.output("abcde"))?, "HelloWorld");
    assert_eq!(std::fs::read_to_string(workspace.output("fghij"))?, "FooBar");
    assert_eq!(mock.call_count(), 0);
    Ok(())
}
