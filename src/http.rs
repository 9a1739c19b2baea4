//! HTTP retrieval with bounded retries.
//!
//! Every request goes through [`retry`], which applies one policy:
//!
//! - 404 and other client errors fail at once;
//! - 429 carrying a `Retry-After` below the configured ceiling waits exactly
//!   that long;
//! - other 429s, 5xx and transport errors back off for `2^attempt` seconds
//!   plus up to two seconds of jitter.
//!
//! Once the attempt budget is spent the last error is returned.

use async_trait::async_trait;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::HttpSettings;
use crate::error::{DevbootError, HttpError, Result};

/// Backoff stops growing at `2^10` seconds
const MAX_BACKOFF_EXPONENT: u32 = 10;

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    GiveUp,
    Wait(Duration),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&HttpSettings::default())
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &HttpSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            max_retry_after: settings.max_retry_after,
        }
    }

    /// `2^attempt` seconds plus `jitter * 2` seconds, `jitter` in `[0, 1)`
    pub fn backoff(attempt: u32, jitter: f64) -> Duration {
        let base = 2u64.pow(attempt.min(MAX_BACKOFF_EXPONENT));
        Duration::from_secs(base) + Duration::from_secs_f64(jitter.clamp(0.0, 1.0) * 2.0)
    }

    /// Decide after the zero-based `attempt` failed with `error`
    pub fn decide(&self, attempt: u32, error: &HttpError, jitter: f64) -> RetryDecision {
        if attempt + 1 >= self.max_attempts {
            return RetryDecision::GiveUp;
        }

        match error {
            HttpError::Status {
                status: 429,
                retry_after: Some(seconds),
                ..
            } if Duration::from_secs(*seconds) < self.max_retry_after => {
                RetryDecision::Wait(Duration::from_secs(*seconds))
            }
            HttpError::Status { status, .. } if *status == 429 || *status >= 500 => {
                RetryDecision::Wait(Self::backoff(attempt, jitter))
            }
            HttpError::Transport { .. } => RetryDecision::Wait(Self::backoff(attempt, jitter)),
            _ => RetryDecision::GiveUp,
        }
    }
}

/// Suspends between attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Run `operation` until it succeeds or the policy gives up
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    url: &str,
    mut operation: F,
) -> std::result::Result<T, HttpError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, HttpError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(url, attempt = attempt + 1, "Request succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => match policy.decide(attempt, &error, rand::random::<f64>()) {
                RetryDecision::GiveUp => {
                    warn!(url, attempts = attempt + 1, error = %error, "Giving up on request");
                    return Err(error);
                }
                RetryDecision::Wait(delay) => {
                    warn!(
                        url,
                        attempt = attempt + 1,
                        max_attempts = policy.max_attempts,
                        delay_secs = delay.as_secs_f64(),
                        error = %error,
                        "Request failed, retrying"
                    );
                    sleeper.sleep(delay).await;
                    attempt += 1;
                }
            },
        }
    }
}

/// Parse a `Retry-After` header given in whole seconds
pub fn parse_retry_after(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

/// HTTP client used for release metadata and archive downloads
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("policy", &self.policy)
            .finish()
    }
}

impl HttpClient {
    pub fn new(settings: &HttpSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.timeout)
            .build()?;
        Ok(Self {
            client,
            policy: RetryPolicy::from_settings(settings),
            sleeper: Arc::new(TokioSleeper),
        })
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        retry(&self.policy, self.sleeper.as_ref(), url, || self.fetch_once(url))
            .await
            .map_err(|e| DevbootError::Http(Box::new(e)))
    }

    pub async fn get_text(&self, url: &str) -> Result<String> {
        let bytes = self.get_bytes(url).await?;
        String::from_utf8(bytes).map_err(|e| {
            DevbootError::Http(Box::new(HttpError::InvalidResponse {
                url: url.to_string(),
                message: e.to_string(),
            }))
        })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let bytes = self.get_bytes(url).await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            DevbootError::Http(Box::new(HttpError::InvalidResponse {
                url: url.to_string(),
                message: e.to_string(),
            }))
        })
    }

    /// Stream `url` into `dest`, replacing it atomically
    pub async fn download(&self, url: &str, dest: &Path) -> Result<PathBuf> {
        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        let (staged, written) = retry(&self.policy, self.sleeper.as_ref(), url, || {
            self.download_once(url, parent)
        })
        .await
        .map_err(|e| DevbootError::Http(Box::new(e)))?;

        staged.persist(dest).map_err(|e| DevbootError::Io(e.error))?;
        debug!(url, dest = %dest.display(), bytes = written, "Downloaded");
        Ok(dest.to_path_buf())
    }

    async fn download_once(
        &self,
        url: &str,
        dir: &Path,
    ) -> std::result::Result<(tempfile::NamedTempFile, u64), HttpError> {
        let write_error = |e: std::io::Error| HttpError::Write {
            path: dir.display().to_string(),
            message: e.to_string(),
        };

        let response = self.send(url).await?;
        let mut staged = tempfile::NamedTempFile::new_in(dir).map_err(write_error)?;
        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| HttpError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;
            staged.write_all(&chunk).map_err(write_error)?;
            written += chunk.len() as u64;
        }
        staged.flush().map_err(write_error)?;
        Ok((staged, written))
    }

    async fn fetch_once(&self, url: &str) -> std::result::Result<Vec<u8>, HttpError> {
        self.send(url)
            .await?
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|e| HttpError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })
    }

    /// One request; a non-success status becomes `HttpError::Status`
    async fn send(&self, url: &str) -> std::result::Result<reqwest::Response, HttpError> {
        let mut request = self.client.get(url);
        if is_github_host(url) {
            if let Ok(token) = std::env::var("GITHUB_TOKEN").or_else(|_| std::env::var("GH_TOKEN"))
            {
                request = request.header("Authorization", format!("Bearer {token}"));
            }
        }

        let response = request.send().await.map_err(|e| HttpError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_retry_after);
            return Err(HttpError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                retry_after,
            });
        }
        Ok(response)
    }
}

fn is_github_host(url: &str) -> bool {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .host_str()
                .map(|host| host == "github.com" || host.ends_with(".github.com"))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSleeper {
        slept: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.slept.lock().unwrap().push(duration);
        }
    }

    fn status(code: u16, retry_after: Option<u64>) -> HttpError {
        HttpError::Status {
            url: "https://example.invalid/file".to_string(),
            status: code,
            retry_after,
        }
    }

    async fn run_script(
        policy: &RetryPolicy,
        script: Vec<std::result::Result<&'static str, HttpError>>,
    ) -> (std::result::Result<&'static str, HttpError>, Vec<Duration>, usize) {
        let sleeper = RecordingSleeper::default();
        let script = Mutex::new(VecDeque::from(script));
        let calls = Mutex::new(0usize);

        let result = retry(policy, &sleeper, "https://example.invalid/file", || {
            *calls.lock().unwrap() += 1;
            let next = script.lock().unwrap().pop_front().expect("script exhausted");
            async move { next }
        })
        .await;

        let slept = sleeper.slept.lock().unwrap().clone();
        let calls = *calls.lock().unwrap();
        (result, slept, calls)
    }

    #[tokio::test]
    async fn test_not_found_fails_without_retry() {
        let policy = RetryPolicy::default();
        let (result, slept, calls) = run_script(&policy, vec![Err(status(404, None))]).await;

        assert!(matches!(result, Err(HttpError::Status { status: 404, .. })));
        assert!(slept.is_empty());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_retry_after_is_honored() {
        let policy = RetryPolicy::default();
        let (result, slept, calls) =
            run_script(&policy, vec![Err(status(429, Some(7))), Ok("body")]).await;

        assert_eq!(result.unwrap(), "body");
        assert_eq!(slept, vec![Duration::from_secs(7)]);
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn test_long_retry_after_falls_back_to_backoff() {
        let policy = RetryPolicy::default();
        let (result, slept, _) =
            run_script(&policy, vec![Err(status(429, Some(600))), Ok("body")]).await;

        assert!(result.is_ok());
        assert_eq!(slept.len(), 1);
        assert!(slept[0] >= Duration::from_secs(1));
        assert!(slept[0] <= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let policy = RetryPolicy {
            max_attempts: 3,
            max_retry_after: Duration::from_secs(120),
        };
        let (result, slept, calls) = run_script(
            &policy,
            vec![
                Err(status(503, None)),
                Err(status(502, None)),
                Err(status(500, None)),
            ],
        )
        .await;

        assert!(matches!(result, Err(HttpError::Status { status: 500, .. })));
        assert_eq!(slept.len(), 2);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_transport_errors_are_retried() {
        let policy = RetryPolicy::default();
        let transport = HttpError::Transport {
            url: "https://example.invalid".to_string(),
            message: "connection reset".to_string(),
        };
        let (result, slept, _) = run_script(&policy, vec![Err(transport), Ok("ok")]).await;
        assert!(result.is_ok());
        assert_eq!(slept.len(), 1);
    }

    #[test]
    fn test_backoff_bounds() {
        assert_eq!(RetryPolicy::backoff(0, 0.0), Duration::from_secs(1));
        assert_eq!(RetryPolicy::backoff(3, 0.0), Duration::from_secs(8));
        assert_eq!(RetryPolicy::backoff(2, 0.5), Duration::from_secs(5));
        assert_eq!(RetryPolicy::backoff(64, 0.0), Duration::from_secs(1024));
    }

    #[test]
    fn test_write_failures_give_up() {
        let policy = RetryPolicy::default();
        let error = HttpError::Write {
            path: "/downloads".to_string(),
            message: "No space left on device".to_string(),
        };
        assert_eq!(policy.decide(0, &error, 0.0), RetryDecision::GiveUp);
    }

    #[test]
    fn test_client_errors_give_up() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(0, &status(403, None), 0.0),
            RetryDecision::GiveUp
        );
        assert_eq!(
            policy.decide(0, &status(429, Some(119)), 0.0),
            RetryDecision::Wait(Duration::from_secs(119))
        );
        assert_eq!(
            policy.decide(4, &status(503, None), 0.0),
            RetryDecision::GiveUp
        );
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after(" 30 "), Some(30));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_github_host_detection() {
        assert!(is_github_host("https://github.com/a/b/releases/download/x/y"));
        assert!(is_github_host("https://api.github.com/repos/a/b"));
        assert!(!is_github_host("https://example.com/file"));
        assert!(!is_github_host("https://evilgithub.com/a/b"));
        assert!(!is_github_host("https://github.com.example.net/a/b"));
    }
}
