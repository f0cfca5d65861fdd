use aoh_review::document::{DocumentLoader, InMemoryLoader, TextFileLoader};
use aoh_review::error::PipelineError;
use aoh_review::llm::MockModelClient;
use aoh_review::pipeline::{ReviewPipeline, ReviewSettings};
use std::fs;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[path = "test_utils.rs"]
mod test_utils;
use test_utils::{client, sample_documents};

#[test]
fn test_form_feeds_split_pages() {
    let (_dir, instructions, _aoh) = sample_documents();
    let locator = instructions.to_string_lossy();

    let pages = TextFileLoader
        .load_pages(&locator)
        .expect("sample is readable");

    assert_eq!(pages.len(), 2);
    assert!(pages[0].starts_with("TITLE REQUIREMENTS"));
    assert!(pages[1].contains("disinterested witnesses"));

    let text = TextFileLoader.load_text(&locator).expect("sample has text");
    assert!(!text.contains('\x0c'));
    assert!(text.find("TITLE REQUIREMENTS") < text.find("disinterested"));
}

#[test]
fn test_file_scheme_is_accepted() {
    let (_dir, _instructions, aoh) = sample_documents();
    let locator = format!("file://{}", aoh.display());

    let text = TextFileLoader.load_text(&locator).expect("readable");
    assert!(text.starts_with("AFFIDAVIT OF HEIRSHIP"));
}

#[test]
fn test_page_text_is_kept_verbatim() {
    let dir = TempDir::new().expect("Failed to create temporary directory");
    let path = dir.path().join("doc.txt");
    fs::write(&path, "first \x0c   \n\x0csecond\n").expect("Failed to write document");
    let locator = path.to_string_lossy();

    let pages = TextFileLoader.load_pages(&locator).expect("readable");
    assert_eq!(pages, vec!["first ", "   \n", "second\n"]);

    let text = TextFileLoader.load_text(&locator).expect("has text");
    assert_eq!(text, "first    \nsecond\n");
}

#[test]
fn test_missing_and_empty_files_are_unreadable() {
    let dir = TempDir::new().expect("Failed to create temporary directory");
    let missing = dir.path().join("nope.txt");
    let err = TextFileLoader
        .load_text(&missing.to_string_lossy())
        .expect_err("missing file");
    assert!(matches!(err, PipelineError::UnreadableDocument { .. }));

    let empty = dir.path().join("empty.txt");
    fs::write(&empty, "\x0c\n\x0c").expect("Failed to write document");
    let err = TextFileLoader
        .load_text(&empty.to_string_lossy())
        .expect_err("no text");
    match err {
        PipelineError::UnreadableDocument { locator, reason } => {
            assert!(locator.ends_with("empty.txt"));
            assert!(reason.contains("no text"));
        }
        other => panic!("expected UnreadableDocument, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unreadable_document_fails_before_any_stage_runs() {
    let mock = MockModelClient::new();
    let loader = InMemoryLoader::new().with_document("instructions", ["requirements page"]);
    let pipeline = ReviewPipeline::new(
        client(&mock, 1),
        &ReviewSettings::default(),
        Box::new(loader),
    )
    .expect("standard chain is valid");

    let err = pipeline
        .review("instructions", "missing-affidavit", &CancellationToken::new())
        .await
        .expect_err("affidavit cannot be loaded");

    assert!(matches!(err, PipelineError::UnreadableDocument { .. }));
    assert!(mock.requests().is_empty());
}
