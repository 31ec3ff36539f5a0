use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::GemError;
use crate::provider::google_gemini::{GeminiClient, RequestPayload};
use crate::types::DecodedEvent;

/// Default number of attempts per logical request.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Wait before the second attempt; doubles for every further attempt.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);
/// Upper bound for a single wait, including server-suggested ones.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Receives the text of the winning attempt.
pub trait DeltaSink {
    /// Called once per non-empty delta, in arrival order.
    fn on_delta(&mut self, text: &str);
}

/// Sink that drops every delta; used when only the final text matters.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DeltaSink for NullSink {
    fn on_delta(&mut self, _text: &str) {}
}

impl DeltaSink for String {
    fn on_delta(&mut self, text: &str) {
        self.push_str(text);
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total transport calls allowed per logical request, at least 1.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy allowing `max_attempts` calls with the default timings.
    ///
    /// # Errors
    ///
    /// Returns [`GemError::Config`] when `max_attempts` is zero.
    pub fn new(max_attempts: u32) -> Result<Self, GemError> {
        if max_attempts == 0 {
            return Err(GemError::config("retries", "at least one attempt is required"));
        }
        Ok(Self {
            max_attempts,
            ..Self::default()
        })
    }

    pub fn with_backoff(mut self, backoff_base: Duration, max_delay: Duration) -> Self {
        self.backoff_base = backoff_base;
        self.max_delay = max_delay;
        self
    }

    /// Exponential wait after failed attempt `attempt` (1-based), capped at `max_delay`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use mygem::provider::retry::RetryPolicy;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.backoff(1), Duration::from_secs(1));
    /// assert_eq!(policy.backoff(3), Duration::from_secs(4));
    /// assert_eq!(policy.backoff(12), Duration::from_secs(30));
    /// ```
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Wait after `attempt` failed with `cause`, honouring `Retry-After` up to the cap.
    pub fn delay_after(&self, attempt: u32, cause: &GemError) -> Duration {
        let backoff = self.backoff(attempt);
        match cause.retry_after() {
            Some(hint) => backoff.max(hint).min(self.max_delay),
            None => backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

/// How a single attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success,
    RetryableFailure(GemError),
    FatalFailure(GemError),
}

/// Record of one transport call.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestAttempt {
    /// 1-based attempt number.
    pub number: u32,
    pub started_at: Instant,
    pub outcome: AttemptOutcome,
}

/// Result of a logical request that eventually succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Concatenated deltas of the winning attempt.
    pub text: String,
    /// Every attempt made, oldest first; the last one succeeded.
    pub attempts: Vec<RequestAttempt>,
}

/// Drives one logical request through as many attempts as the policy allows.
///
/// Error classification happens here and nowhere else: callers observe either a
/// [`Completion`] or a single terminal [`GemError`].
#[derive(Debug, Clone, Default)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Executes the request built by `build`, retrying transient failures.
    ///
    /// `build` runs before every attempt so each one sends a fresh payload. Deltas are
    /// held per attempt and reach `sink` only once that attempt has ended cleanly, so
    /// text from a failed attempt is never shown next to the text of a retry.
    ///
    /// # Errors
    ///
    /// - the error returned by `build`, before any call is made;
    /// - the first non-retryable error, immediately;
    /// - [`GemError::ExhaustedRetries`] once `max_attempts` retryable failures occurred.
    pub async fn execute<F, S>(
        &self,
        client: &GeminiClient,
        streaming: bool,
        mut build: F,
        sink: &mut S,
    ) -> Result<Completion, GemError>
    where
        F: FnMut() -> Result<RequestPayload, GemError>,
        S: DeltaSink + ?Sized,
    {
        let mut attempts = Vec::new();
        let mut number = 0;

        loop {
            number += 1;
            let payload = build()?;
            let started_at = Instant::now();
            debug!(attempt = number, max_attempts = self.policy.max_attempts, "starting attempt");

            let mut deltas = Vec::new();
            let err = match run_attempt(client, &payload, streaming, &mut deltas).await {
                Ok(()) => {
                    for delta in &deltas {
                        sink.on_delta(delta);
                    }
                    attempts.push(RequestAttempt {
                        number,
                        started_at,
                        outcome: AttemptOutcome::Success,
                    });
                    return Ok(Completion {
                        text: deltas.concat(),
                        attempts,
                    });
                }
                Err(err) => err,
            };

            if !deltas.is_empty() {
                info!(
                    attempt = number,
                    deltas = deltas.len(),
                    "discarding partial output of failed attempt"
                );
            }

            if !err.is_retryable() {
                info!(attempt = number, error = %err, "request failed");
                return Err(err);
            }
            attempts.push(RequestAttempt {
                number,
                started_at,
                outcome: AttemptOutcome::RetryableFailure(err.clone()),
            });

            if number >= self.policy.max_attempts {
                info!(attempts = number, error = %err, "giving up");
                return Err(GemError::ExhaustedRetries {
                    attempts: number,
                    last: Box::new(err),
                });
            }

            let delay = self.policy.delay_after(number, &err);
            info!(
                attempt = number,
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "transient failure, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

async fn run_attempt(
    client: &GeminiClient,
    payload: &RequestPayload,
    streaming: bool,
    deltas: &mut Vec<String>,
) -> Result<(), GemError> {
    let mut events = client.send(payload, streaming).await?.decode();
    while let Some(event) = events.next().await {
        match event {
            DecodedEvent::TextDelta(delta) => deltas.push(delta),
            DecodedEvent::Done => return Ok(()),
            DecodedEvent::Error(err) => return Err(err),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use futures_util::stream;

    use super::*;
    use crate::http::{HttpRequest, HttpResponse, HttpStreamResponse, HttpTransport};
    use crate::provider::google_gemini::build_request;
    use crate::types::GenerationConfig;

    /// Replays scripted `(status, body)` pairs, one per call.
    struct ScriptedTransport {
        script: Mutex<VecDeque<(u16, String)>>,
        calls: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(script: Vec<(u16, String)>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn next(&self) -> (u16, String) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .expect("transport called more often than scripted")
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, GemError> {
            let (status, body) = self.next();
            Ok(HttpResponse {
                status,
                headers: HashMap::new(),
                body: body.into_bytes(),
            })
        }

        async fn send_stream(&self, _request: HttpRequest) -> Result<HttpStreamResponse, GemError> {
            let (status, body) = self.next();
            let chunks: Vec<Result<Vec<u8>, GemError>> = body
                .into_bytes()
                .chunks(16)
                .map(|c| Ok(c.to_vec()))
                .collect();
            Ok(HttpStreamResponse {
                status,
                headers: HashMap::new(),
                body: Box::pin(stream::iter(chunks)),
            })
        }
    }

    /// Records every delta it is handed.
    #[derive(Default)]
    struct RecordingSink {
        deltas: Vec<String>,
    }

    impl DeltaSink for RecordingSink {
        fn on_delta(&mut self, text: &str) {
            self.deltas.push(text.to_string());
        }
    }

    fn sse(texts: &[&str]) -> String {
        texts
            .iter()
            .map(|text| {
                format!(
                    "data: {}\n\n",
                    serde_json::json!({"candidates": [{"content": {"parts": [{"text": text}]}}]})
                )
            })
            .collect()
    }

    fn http_error(code: u16, status: &str) -> (u16, String) {
        (
            code,
            format!(r#"{{"error":{{"code":{code},"message":"failure","status":"{status}"}}}}"#),
        )
    }

    fn payload() -> Result<RequestPayload, GemError> {
        build_request("hi", &[], &GenerationConfig::default(), None)
    }

    fn controller(max_attempts: u32) -> RetryController {
        RetryController::new(RetryPolicy::new(max_attempts).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn transient_503_then_success() {
        let transport = ScriptedTransport::new(vec![
            http_error(503, "UNAVAILABLE"),
            (200, sse(&["ok"])),
        ]);
        let client = GeminiClient::new(transport.clone(), "key");
        let mut sink = RecordingSink::default();

        let completion = controller(3)
            .execute(&client, true, payload, &mut sink)
            .await
            .expect("second attempt succeeds");

        assert_eq!(completion.text, "ok");
        assert_eq!(transport.calls(), 2);
        assert_eq!(completion.attempts.len(), 2);
        assert!(matches!(
            completion.attempts[0].outcome,
            AttemptOutcome::RetryableFailure(GemError::Http { status: 503, .. })
        ));
        assert_eq!(completion.attempts[1].outcome, AttemptOutcome::Success);
        assert_eq!(
            completion.attempts[1].started_at - completion.attempts[0].started_at,
            Duration::from_secs(1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unauthorized_is_fatal_after_one_call() {
        let transport = ScriptedTransport::new(vec![http_error(401, "UNAUTHENTICATED")]);
        let client = GeminiClient::new(transport.clone(), "bad-key");

        let err = controller(3)
            .execute(&client, false, payload, &mut NullSink)
            .await
            .unwrap_err();

        assert!(matches!(err, GemError::Http { status: 401, .. }));
        assert_eq!(err.exit_code(), 1);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_exactly_max_attempts() {
        for max_attempts in 1..=4u32 {
            let script = (0..max_attempts).map(|_| http_error(500, "INTERNAL")).collect();
            let transport = ScriptedTransport::new(script);
            let client = GeminiClient::new(transport.clone(), "key");

            let err = controller(max_attempts)
                .execute(&client, true, payload, &mut NullSink)
                .await
                .unwrap_err();

            assert_eq!(transport.calls(), max_attempts as usize);
            match err {
                GemError::ExhaustedRetries { attempts, last } => {
                    assert_eq!(attempts, max_attempts);
                    assert!(matches!(*last, GemError::Http { status: 500, .. }));
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn waits_grow_between_attempts() {
        let transport = ScriptedTransport::new(vec![
            (200, "data: {\"trunc".to_string()),
            http_error(429, "RESOURCE_EXHAUSTED"),
            http_error(502, ""),
            (200, sse(&["done"])),
        ]);
        let client = GeminiClient::new(transport.clone(), "key");

        let completion = controller(4)
            .execute(&client, true, payload, &mut NullSink)
            .await
            .unwrap();

        let starts: Vec<Instant> = completion.attempts.iter().map(|a| a.started_at).collect();
        let gaps: Vec<Duration> = starts.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
        assert!(matches!(
            completion.attempts[0].outcome,
            AttemptOutcome::RetryableFailure(GemError::Protocol { .. })
        ));
    }

    #[test]
    fn backoff_is_monotone_and_capped() {
        let policy = RetryPolicy::default();
        let delays: Vec<Duration> = (1..=40).map(|attempt| policy.backoff(attempt)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= policy.max_delay));
        assert_eq!(delays.last(), Some(&Duration::from_secs(30)));

        let hinted = GemError::Http {
            status: 429,
            message: "slow down".into(),
            retry_after: Some(Duration::from_secs(10)),
        };
        assert_eq!(policy.delay_after(1, &hinted), Duration::from_secs(10));
        let huge = GemError::Http {
            status: 429,
            message: "slow down".into(),
            retry_after: Some(Duration::from_secs(600)),
        };
        assert_eq!(policy.delay_after(1, &huge), Duration::from_secs(30));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        assert!(matches!(
            RetryPolicy::new(0),
            Err(GemError::Config { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn only_the_winning_attempt_reaches_the_sink() {
        let mut truncated = sse(&["Hel"]);
        truncated.push_str("data: {\"candidates\": [");
        let in_stream_error = format!(
            "{}data: {}\n\n",
            sse(&["Hel"]),
            r#"{"error":{"code":503,"message":"overloaded","status":"UNAVAILABLE"}}"#
        );
        let transport = ScriptedTransport::new(vec![
            (200, truncated),
            (200, in_stream_error),
            (200, sse(&["Hel", "lo"])),
        ]);
        let client = GeminiClient::new(transport.clone(), "key");
        let mut sink = RecordingSink::default();

        let completion = controller(3)
            .execute(&client, true, payload, &mut sink)
            .await
            .unwrap();

        assert_eq!(completion.text, "Hello");
        assert_eq!(transport.calls(), 3);
        assert_eq!(sink.deltas, vec!["Hel", "lo"]);

        let mut echoed = String::new();
        let transport = ScriptedTransport::new(vec![
            (200, format!("{}data: {{oops\n\n", sse(&["stale"]))),
            (200, sse(&["fresh"])),
        ]);
        let client = GeminiClient::new(transport, "key");
        controller(2)
            .execute(&client, true, payload, &mut echoed)
            .await
            .unwrap();
        assert_eq!(echoed, "fresh");
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_deliver_nothing() {
        let transport = ScriptedTransport::new(vec![
            (200, format!("{}data: {{oops\n\n", sse(&["one"]))),
            (200, format!("{}data: {{oops\n\n", sse(&["two"]))),
        ]);
        let client = GeminiClient::new(transport, "key");
        let mut sink = RecordingSink::default();

        let err = controller(2)
            .execute(&client, true, payload, &mut sink)
            .await
            .unwrap_err();
        assert!(matches!(err, GemError::ExhaustedRetries { attempts: 2, .. }));
        assert!(sink.deltas.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_prompt_is_not_retried() {
        let transport = ScriptedTransport::new(vec![(
            200,
            r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#.to_string(),
        )]);
        let client = GeminiClient::new(transport.clone(), "key");

        let err = controller(3)
            .execute(&client, false, payload, &mut NullSink)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GemError::Blocked {
                reason: "SAFETY".into()
            }
        );
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn build_failure_makes_no_calls() {
        let transport = ScriptedTransport::new(Vec::new());
        let client = GeminiClient::new(transport.clone(), "key");
        let config = GenerationConfig::default().with_temperature(2.0);

        let err = controller(3)
            .execute(
                &client,
                true,
                || build_request("hi", &[], &config, None),
                &mut NullSink,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GemError::Config { .. }));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn payload_is_rebuilt_for_every_attempt() {
        let transport = ScriptedTransport::new(vec![
            http_error(504, "DEADLINE_EXCEEDED"),
            (200, sse(&["ok"])),
        ]);
        let client = GeminiClient::new(transport, "key");
        let mut builds = 0;

        controller(2)
            .execute(
                &client,
                true,
                || {
                    builds += 1;
                    payload()
                },
                &mut NullSink,
            )
            .await
            .unwrap();
        assert_eq!(builds, 2);
    }
}
