use aoh_review::error::{ModelError, PipelineError};
use aoh_review::llm::{
    InvocationClient, InvocationRequest, MockModelClient, ModelClient, RetryPolicy,
    SamplingParameters,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[path = "test_utils.rs"]
mod test_utils;
use test_utils::client;

fn request() -> InvocationRequest {
    InvocationRequest::new("test-model", "Summarize the affidavit", None)
}

#[tokio::test]
async fn test_transient_failures_are_retried_until_success() {
    let mock = MockModelClient::new();
    mock.push_failure(ModelError::Transient("503 overloaded".into()));
    mock.push_failure(ModelError::Transient("connection reset".into()));
    mock.push_response("ok");

    let result = client(&mock, 3)
        .invoke(&request())
        .await
        .expect("third attempt succeeds");

    assert_eq!(result.text, "ok");
    assert_eq!(mock.requests().len(), 3);
}

#[tokio::test]
async fn test_retry_budget_counts_total_attempts() {
    let mock = MockModelClient::new();
    mock.push_failure(ModelError::Transient("503".into()));
    mock.push_failure(ModelError::Transient("503".into()));
    mock.push_response("ok");

    let err = client(&mock, 2)
        .invoke(&request())
        .await
        .expect_err("budget exhausted before the success");

    match err {
        PipelineError::Invocation { attempts, cause } => {
            assert_eq!(attempts, 2);
            assert!(cause.is_transient());
        }
        other => panic!("expected Invocation error, got {other:?}"),
    }
    assert_eq!(mock.requests().len(), 2);
}

#[tokio::test]
async fn test_every_attempt_sends_the_same_request() {
    let mock = MockModelClient::new();
    mock.push_failure(ModelError::Transient("503".into()));
    mock.push_response("done");

    let params = SamplingParameters::default().with_max_tokens(8192);
    let request = InvocationRequest::new("model-x", "same prompt", Some(params));
    client(&mock, 3).invoke(&request).await.expect("succeeds");

    let seen = mock.requests();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], seen[1]);
    assert_eq!(seen[0].params.max_tokens, 8192);
}

#[tokio::test]
async fn test_default_sampling_parameters_are_sent() {
    let mock = MockModelClient::new();
    mock.push_response("fine");

    client(&mock, 1).invoke(&request()).await.expect("succeeds");

    let sent = &mock.requests()[0];
    assert_eq!(sent.params, SamplingParameters::default());
    assert_eq!(sent.params.max_tokens, 4096);
    assert_eq!(sent.params.top_k, 250);
}

#[tokio::test]
async fn test_zero_attempt_budget_makes_no_calls() {
    let mock = MockModelClient::new();
    mock.push_response("unused");

    let err = client(&mock, 0)
        .invoke(&request())
        .await
        .expect_err("nothing may be attempted");

    assert!(matches!(err, PipelineError::Invocation { attempts: 0, .. }));
    assert!(mock.requests().is_empty());
}

/// Backend that never answers within the timeout.
struct SlowModel;

#[async_trait]
impl ModelClient for SlowModel {
    async fn complete(&self, _request: &InvocationRequest) -> Result<String, ModelError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok("too late".to_string())
    }
}

#[tokio::test]
async fn test_calls_exceeding_the_timeout_fail_after_all_attempts() {
    let policy = RetryPolicy {
        timeout_ms: 20,
        ..RetryPolicy::immediate(2)
    };
    let client = InvocationClient::new(Arc::new(SlowModel), policy);

    let err = client
        .invoke(&request())
        .await
        .expect_err("every attempt times out");

    match err {
        PipelineError::Invocation { attempts, cause } => {
            assert_eq!(attempts, 2);
            assert_eq!(cause, ModelError::Timeout(20));
        }
        other => panic!("expected Invocation error, got {other:?}"),
    }
}
