//! Model-loading retry.
//!
//! The inference API answers HTTP 503 while a cold model is being loaded.
//! A call that hits this is re-issued exactly once with the wait-for-model
//! directive set. There is no backoff and no polling: the directive makes the
//! service hold the second request until the model is ready.

use std::future::Future;

use super::errors::InferenceError;

/// Per-call attempt state. Lives only for the duration of one logical call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    /// 0 for the first attempt, 1 for the retry.
    pub attempt: u8,
    pub wait_for_model: bool,
}

impl RetryState {
    pub fn first(wait_for_model: bool) -> Self {
        Self {
            attempt: 0,
            wait_for_model,
        }
    }

    /// State of the single follow-up attempt.
    pub fn retry(self) -> Self {
        Self {
            attempt: self.attempt + 1,
            wait_for_model: true,
        }
    }
}

/// Run `call`, retrying once with `wait_for_model` forced on if the first
/// attempt reports the model as loading.
///
/// A retry only happens when the caller did not already ask to wait. Any other
/// failure, or a second model-loading response, comes back as
/// [`InferenceError::RequestFailed`] wrapping the original error.
pub async fn execute<T, F, Fut>(wait_for_model: bool, mut call: F) -> Result<T, InferenceError>
where
    F: FnMut(RetryState) -> Fut,
    Fut: Future<Output = Result<T, InferenceError>>,
{
    let state = RetryState::first(wait_for_model);

    match call(state).await {
        Ok(value) => Ok(value),
        Err(e) if e.is_model_loading() && !state.wait_for_model => {
            let retry = state.retry();
            tracing::warn!(
                attempt = retry.attempt,
                body = e.error_body().unwrap_or_default(),
                "model is loading, retrying with wait-for-model"
            );
            call(retry).await.map_err(InferenceError::request_failed)
        }
        Err(e) => Err(InferenceError::request_failed(e)),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn loading() -> InferenceError {
        InferenceError::HttpError {
            status: 503,
            body: r#"{"error":"Model is currently loading"}"#.into(),
        }
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let seen = Mutex::new(Vec::new());
        let result = execute(false, |state| {
            seen.lock().unwrap().push(state);
            async { Ok::<_, InferenceError>(42) }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(*seen.lock().unwrap(), vec![RetryState::first(false)]);
    }

    #[tokio::test]
    async fn test_model_loading_then_success() {
        let seen = Mutex::new(Vec::new());
        let result = execute(false, |state| {
            seen.lock().unwrap().push(state);
            async move {
                if state.wait_for_model {
                    Ok("ready")
                } else {
                    Err(loading())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ready");
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(
            seen[1],
            RetryState {
                attempt: 1,
                wait_for_model: true
            }
        );
    }

    #[tokio::test]
    async fn test_two_model_loading_responses_fail_after_two_calls() {
        let calls = Mutex::new(0u32);
        let result: Result<(), _> = execute(false, |_| {
            *calls.lock().unwrap() += 1;
            async { Err(loading()) }
        })
        .await;

        assert_eq!(*calls.lock().unwrap(), 2);
        let err = result.unwrap_err();
        assert!(matches!(err, InferenceError::RequestFailed { status: Some(503), .. }));
    }

    #[tokio::test]
    async fn test_no_retry_when_already_waiting() {
        let calls = Mutex::new(0u32);
        let result: Result<(), _> = execute(true, |state| {
            assert!(state.wait_for_model);
            *calls.lock().unwrap() += 1;
            async { Err(loading()) }
        })
        .await;

        assert_eq!(*calls.lock().unwrap(), 1);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = Mutex::new(0u32);
        let result: Result<(), _> = execute(false, |_| {
            *calls.lock().unwrap() += 1;
            async {
                Err(InferenceError::ConnectionFailed {
                    endpoint: "https://example.test".into(),
                    reason: "refused".into(),
                })
            }
        })
        .await;

        assert_eq!(*calls.lock().unwrap(), 1);
        match result.unwrap_err() {
            InferenceError::RequestFailed { status, source } => {
                assert!(status.is_none());
                assert!(matches!(*source, InferenceError::ConnectionFailed { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
