//! Blocking HTTP transport for the ArangoDB REST API
//!
//! Each request builds a ureq agent whose global timeout is the time left on
//! the caller's deadline. Cancellation is observed before a request is sent;
//! a request already in flight runs until its timeout.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use seedbed_core::{ClientError, ClientResult, ConnectionConfig, Deadline, Interrupt};
use serde_json::Value;
use std::time::Duration;

/// Request timeout used when the deadline is unbounded
const UNBOUNDED_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Method {
    Get,
    Post,
    Put,
}

/// Status and decoded JSON body of a response
#[derive(Debug, Clone)]
pub(crate) struct Reply {
    pub status: u16,
    pub body: Value,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Translate an error response, using the server's `errorMessage` and
    /// `errorNum` when present
    pub fn into_error(self) -> ClientError {
        let message = self
            .body
            .get("errorMessage")
            .and_then(Value::as_str)
            .unwrap_or("request failed")
            .to_string();
        let code = self
            .body
            .get("errorNum")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0);
        match self.status {
            401 | 403 => ClientError::Unauthorized(message),
            404 => ClientError::NotFound(message),
            409 => ClientError::Conflict(message),
            status => ClientError::Http {
                status,
                code,
                message,
            },
        }
    }

    /// The `result` field, which most endpoints use for their payload
    pub fn result(&self) -> Option<&Value> {
        self.body.get("result")
    }
}

/// Endpoint plus precomputed credentials
#[derive(Debug, Clone)]
pub(crate) struct Http {
    base: String,
    authorization: String,
}

impl Http {
    pub fn new(config: &ConnectionConfig) -> Self {
        let credentials = format!("{}:{}", config.user, config.password);
        Self {
            base: config.endpoint(),
            authorization: format!("Basic {}", STANDARD.encode(credentials)),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        deadline: &Deadline,
    ) -> ClientResult<Reply> {
        deadline.check()?;
        let timeout = deadline.remaining().unwrap_or(UNBOUNDED_REQUEST_TIMEOUT);
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        let agent = ureq::Agent::new_with_config(config);
        let url = self.url(path);

        let sent = match method {
            Method::Get => agent
                .get(url.as_str())
                .header("Authorization", &self.authorization)
                .call(),
            Method::Post => {
                let bytes = serde_json::to_vec(body.unwrap_or(&Value::Null)).map_err(|e| {
                    ClientError::Transport(format!("failed to serialize request: {e}"))
                })?;
                agent
                    .post(url.as_str())
                    .header("Authorization", &self.authorization)
                    .header("Content-Type", "application/json")
                    .send(&bytes[..])
            }
            Method::Put => agent
                .put(url.as_str())
                .header("Authorization", &self.authorization)
                .send_empty(),
        };

        let mut response = sent.map_err(|e| transport_error(e, deadline))?;
        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| ClientError::Transport(format!("failed to read response: {e}")))?;
        Ok(Reply {
            status,
            body: parse_body(&text)?,
        })
    }
}

fn parse_body(text: &str) -> ClientResult<Value> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(|e| {
        let excerpt = text.char_indices().nth(200).map_or(text, |(i, _)| &text[..i]);
        ClientError::Transport(format!("invalid JSON response: {e}: {excerpt}"))
    })
}

fn transport_error(error: ureq::Error, deadline: &Deadline) -> ClientError {
    if matches!(error, ureq::Error::Timeout(_)) || deadline.is_expired() {
        return ClientError::Interrupted(Interrupt::Expired);
    }
    ClientError::Transport(error.to_string())
}
