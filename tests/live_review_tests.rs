// tests/live_review_tests.rs

#![cfg(feature = "integration")]

use aoh_review::config::Config;
use aoh_review::document::TextFileLoader;
use aoh_review::llm::{InvocationClient, RigModelClient};
use aoh_review::logger;
use aoh_review::pipeline::ReviewPipeline;
use aoh_review::providers::{Provider, check_api_key};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[path = "test_utils.rs"]
mod test_utils;
use test_utils::sample_documents;

fn setup_pipeline() -> ReviewPipeline {
    let _ = logger::init(); // Initialize the logger
    logger::configure(None, true).expect("stderr logging");

    let config = Config {
        default_provider: Provider::Anthropic.name().to_string(),
        ..Default::default()
    };
    let provider = config.provider().expect("valid provider");
    check_api_key(provider).expect("ANTHROPIC_API_KEY not set");

    let backend = RigModelClient::from_config(provider, &config.provider_config(provider));
    let settings = config
        .review_settings(provider)
        .expect("default settings build");
    ReviewPipeline::new(
        InvocationClient::new(Arc::new(backend), config.retry),
        &settings,
        Box::new(TextFileLoader),
    )
    .expect("standard chain is valid")
}

#[tokio::test]
async fn test_live_review_of_sample_affidavit() {
    let pipeline = setup_pipeline();
    let (_dir, instructions, aoh) = sample_documents();

    let report = pipeline
        .review(
            &instructions.to_string_lossy(),
            &aoh.to_string_lossy(),
            &CancellationToken::new(),
        )
        .await
        .expect("documents load");

    assert!(report.is_complete(), "{:?}", report.failure());
    assert!(
        report
            .instructions
            .as_deref()
            .is_some_and(|text| !text.is_empty())
    );
    let record = report.extracted_record.expect("record present");
    assert_eq!(record.len(), 6);
    assert_eq!(report.compliance_answers.len(), 4);
}
