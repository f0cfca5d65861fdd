use aoh_review::document::TextFileLoader;
use aoh_review::error::ModelError;
use aoh_review::llm::{InvocationRequest, MockModelClient};
use aoh_review::pipeline::{ReviewPipeline, ReviewSettings};
use aoh_review::session::Phase;
use tokio_util::sync::CancellationToken;

#[path = "test_utils.rs"]
mod test_utils;
use test_utils::{client, review_model, sample_documents};

fn pipeline(mock: &MockModelClient, settings: &ReviewSettings) -> ReviewPipeline {
    ReviewPipeline::new(client(mock, 2), settings, Box::new(TextFileLoader))
        .expect("standard chain is valid")
}

#[tokio::test]
async fn test_review_of_sample_documents_completes() {
    let (_dir, instructions, aoh) = sample_documents();
    let mock = review_model();
    let settings = ReviewSettings::default();

    let report = pipeline(&mock, &settings)
        .review(
            &instructions.to_string_lossy(),
            &aoh.to_string_lossy(),
            &CancellationToken::new(),
        )
        .await
        .expect("documents load");

    assert!(report.is_complete(), "{:?}", report.failure());
    assert!(report.instructions.is_some());
    assert!(report.instruction_summary.is_some());
    assert!(report.compliance_narrative.is_some());
    assert!(report.document_summary.is_some());
    assert_eq!(report.compliance_answers.len(), settings.questions.len());

    let record = report.extracted_record.as_ref().expect("record present");
    assert_eq!(record.get("date_affidavit"), Some("03/03/2021"));

    // Requirements prompt carries the checklist identity and the instruction text
    let first = &mock.prompts()[0];
    assert!(first.contains("First American"));
    assert!(first.contains("ATRQ/T137"));
    assert!(first.contains("disinterested witnesses"));

    let json = serde_json::to_value(&report).expect("serializable");
    assert_eq!(json["phase"], "done");
    assert_eq!(
        json["extracted_record"]["fields"]["children_all"],
        "Ann Doe; Bob Doe"
    );
}

#[tokio::test]
async fn test_failing_stage_returns_partial_report() {
    let (_dir, instructions, aoh) = sample_documents();
    let mock = MockModelClient::with_responder(|request: &InvocationRequest| {
        if request.prompt.contains("<question>") {
            Err(ModelError::Transient("503 service unavailable".to_string()))
        } else {
            Ok("stage output</summary>".to_string())
        }
    });

    let report = pipeline(&mock, &ReviewSettings::default())
        .review(
            &instructions.to_string_lossy(),
            &aoh.to_string_lossy(),
            &CancellationToken::new(),
        )
        .await
        .expect("documents load");

    let (stage, reason) = report.failure().expect("questions stage fails");
    assert_eq!(stage, "questions");
    assert!(reason.contains("2 attempt(s)"), "reason: {reason}");
    assert!(report.instructions.is_some());
    assert!(report.compliance_narrative.is_some());
    // Not JSON, so the record is kept unparsed
    let record = report.extracted_record.as_ref().expect("extraction ran");
    assert!(!record.is_parsed());
    assert!(report.compliance_answers.is_empty());
    assert_eq!(report.document_summary, None);
    assert!(matches!(report.outcome, Phase::Failed { .. }));
}

#[tokio::test]
async fn test_truncation_caps_embedded_documents() {
    let (_dir, instructions, aoh) = sample_documents();
    let mock = review_model();
    let settings = ReviewSettings {
        max_document_tokens: Some(8),
        ..ReviewSettings::default()
    };

    let report = pipeline(&mock, &settings)
        .review(
            &instructions.to_string_lossy(),
            &aoh.to_string_lossy(),
            &CancellationToken::new(),
        )
        .await
        .expect("documents load");

    assert!(report.is_complete(), "{:?}", report.failure());
    let prompts = mock.prompts();
    assert!(prompts.iter().all(|p| !p.contains("Dana Poe")));
}
