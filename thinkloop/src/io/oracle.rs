//! Text generation oracle.
//!
//! The [`Oracle`] trait hides the remote model. Errors carry a retry
//! classification; [`complete_with_retry`] makes at most two attempts.

use std::thread;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::io::http::{self, snippet};

/// Attempts per cycle, including the first.
pub const MAX_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl CompletionRequest {
    /// Characters sent to the model, used when no usage is reported.
    pub fn prompt_chars(&self) -> usize {
        self.system.chars().count() + self.user.chars().count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    /// Cost reported by the provider, if any.
    pub tokens: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("rejected: {0}")]
    Rejected(String),
}

impl OracleError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, OracleError::Rejected(_))
    }
}

pub trait Oracle {
    fn complete(&self, request: &CompletionRequest) -> Result<Completion, OracleError>;
}

/// Call `oracle`, retrying once after `backoff` on a retryable error.
pub fn complete_with_retry(
    oracle: &dyn Oracle,
    request: &CompletionRequest,
    backoff: Duration,
) -> Result<Completion, OracleError> {
    let mut attempt = 1;
    loop {
        match oracle.complete(request) {
            Ok(completion) => return Ok(completion),
            Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                warn!(attempt, error = %err, backoff_secs = backoff.as_secs(), "oracle call failed; retrying");
                if !backoff.is_zero() {
                    thread::sleep(backoff);
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// OpenAI-compatible `POST {base_url}/chat/completions` (Groq by default).
pub struct ChatCompletionsOracle {
    http: Client,
    url: String,
    model: String,
    api_key: String,
}

impl ChatCompletionsOracle {
    pub fn new(base_url: &str, model: &str, api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            http: http::client(timeout)?,
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: Option<u64>,
}

impl Oracle for ChatCompletionsOracle {
    #[instrument(skip_all, fields(model = %self.model, max_tokens = request.max_tokens))]
    fn complete(&self, request: &CompletionRequest) -> Result<Completion, OracleError> {
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .map_err(classify_transport)?;
        let status = response.status();
        let body = response.text().map_err(classify_transport)?;
        if let Some(err) = classify_status(status, &body) {
            return Err(err);
        }
        let completion = parse_chat_response(&body)?;
        debug!(chars = completion.text.len(), tokens = ?completion.tokens, "oracle replied");
        Ok(completion)
    }
}

fn classify_transport(err: reqwest::Error) -> OracleError {
    if err.is_timeout() {
        OracleError::Timeout(err.to_string())
    } else {
        OracleError::Transient(err.to_string())
    }
}

fn classify_status(status: StatusCode, body: &str) -> Option<OracleError> {
    if status.is_success() {
        return None;
    }
    let detail = format!("{status}: {}", snippet(body, 200));
    Some(match status {
        StatusCode::TOO_MANY_REQUESTS => OracleError::RateLimited(detail),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => OracleError::Timeout(detail),
        s if s.is_server_error() => OracleError::Transient(detail),
        _ => OracleError::Rejected(detail),
    })
}

fn parse_chat_response(body: &str) -> Result<Completion, OracleError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|err| OracleError::Rejected(format!("malformed response: {err}")))?;
    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| OracleError::Rejected("response has no completion text".to_string()))?;
    Ok(Completion {
        text,
        tokens: parsed.usage.and_then(|usage| usage.total_tokens),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedOracle;

    fn request() -> CompletionRequest {
        CompletionRequest {
            system: "sys".to_string(),
            user: "user".to_string(),
            max_tokens: 100,
            temperature: 0.7,
        }
    }

    fn reply(text: &str) -> Completion {
        Completion {
            text: text.to_string(),
            tokens: Some(10),
        }
    }

    #[test]
    fn retries_once_on_rate_limit() {
        let oracle = ScriptedOracle::new(vec![
            Err(OracleError::RateLimited("429".to_string())),
            Ok(reply("second")),
        ]);
        let completion = complete_with_retry(&oracle, &request(), Duration::ZERO).expect("ok");
        assert_eq!(completion.text, "second");
        assert_eq!(oracle.calls(), 2);
    }

    #[test]
    fn gives_up_after_two_attempts() {
        let oracle = ScriptedOracle::new(vec![
            Err(OracleError::Timeout("t".to_string())),
            Err(OracleError::Transient("502".to_string())),
            Ok(reply("never")),
        ]);
        let err = complete_with_retry(&oracle, &request(), Duration::ZERO).expect_err("fails");
        assert!(matches!(err, OracleError::Transient(_)));
        assert_eq!(oracle.calls(), 2);
    }

    #[test]
    fn rejected_is_not_retried() {
        let oracle = ScriptedOracle::new(vec![
            Err(OracleError::Rejected("400".to_string())),
            Ok(reply("never")),
        ]);
        assert!(complete_with_retry(&oracle, &request(), Duration::ZERO).is_err());
        assert_eq!(oracle.calls(), 1);
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            Some(OracleError::RateLimited(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, ""),
            Some(OracleError::Transient(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, ""),
            Some(OracleError::Rejected(_))
        ));
        assert!(classify_status(StatusCode::OK, "").is_none());
    }

    #[test]
    fn chat_response_with_usage() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  hello  "}}],"usage":{"total_tokens":42}}"#;
        assert_eq!(
            parse_chat_response(body).expect("parse"),
            Completion {
                text: "hello".to_string(),
                tokens: Some(42)
            }
        );
        assert!(matches!(
            parse_chat_response(r#"{"choices":[]}"#),
            Err(OracleError::Rejected(_))
        ));
        assert!(matches!(
            parse_chat_response("<html>"),
            Err(OracleError::Rejected(_))
        ));
    }
}
