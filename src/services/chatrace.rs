use log::{debug, warn};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fmt, time::Duration};

use super::envelope::{Provider, RequestEnvelope};

pub const DEFAULT_URL: &str = "https://app.aiprlassist.com/php/user";

/// The API gates behaviour on the mobile client identifier.
pub const CLIENT_USER_AGENT: &str = "mobile-app";

pub const ACCESS_TOKEN_HEADER: &str = "X-ACCESS-TOKEN";

/// Terminal outcomes of a single call. Nothing is retried.
#[derive(thiserror::Error, Debug)]
pub enum ChatraceError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected HTTP status {status}")]
    Http { status: u16 },
    #[error("API returned null: identity not registered or tenant misconfigured")]
    NullResponse,
    #[error("malformed response body: {raw}")]
    MalformedBody { raw: String },
    #[error("API rejected the request (code {}): {raw}", display_code(.code))]
    Api { code: Option<i64>, raw: Value },
}

impl ChatraceError {
    /// Code 1 is the API's authentication/authorization failure.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, ChatraceError::Api { code: Some(1), .. })
    }
}

fn display_code(code: &Option<i64>) -> String {
    code.map_or_else(|| String::from("none"), |c| c.to_string())
}

pub type Result<T> = std::result::Result<T, ChatraceError>;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ClientConfig {
    pub url: String,
    pub timeout_secs: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            url: String::from(DEFAULT_URL),
            timeout_secs: None,
        }
    }
}

/// Bearer credential sent in the access token header.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials(String);

impl Credentials {
    pub fn new(token: impl Into<String>) -> Self {
        Credentials(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credentials(<redacted>)")
    }
}

/// Pending OTP login. Consumed by exactly one [`Client::validate_otp`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpSession {
    pub rid: String,
}

#[derive(Debug, Clone, Copy)]
pub enum Auth<'a> {
    Anonymous,
    Token(&'a Credentials),
}

#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    url: String,
}

impl Client {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Client {
            http: builder.build()?,
            url: config.url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Posts `envelope` once and returns the `data` of a success envelope.
    pub async fn send(&self, envelope: &RequestEnvelope, auth: Auth<'_>) -> Result<Value> {
        let mut request = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .json(envelope);

        if let Auth::Token(credentials) = auth {
            request = request.header(ACCESS_TOKEN_HEADER, credentials.token());
        }

        debug!(
            "POST {} op={} authenticated={}",
            self.url,
            envelope.command(),
            matches!(auth, Auth::Token(_))
        );

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        let result = classify(status, &body);
        if let Err(e) = &result {
            debug!("{} failed: {}", envelope.command(), e);
        }
        result
    }

    /// First half of the email login: asks the API to mail an OTP code.
    pub async fn request_otp(&self, email: &str) -> Result<OtpSession> {
        let data = self
            .send(&RequestEnvelope::request_otp(email), Auth::Anonymous)
            .await?;

        match rid_of(&data) {
            Some(rid) => Ok(OtpSession { rid }),
            None => {
                warn!("OTP request succeeded without a request id");
                Err(ChatraceError::MalformedBody {
                    raw: data.to_string(),
                })
            }
        }
    }

    /// Second half of the email login. The session is consumed whatever the
    /// outcome.
    pub async fn validate_otp(&self, session: OtpSession, code: &str) -> Result<Credentials> {
        let data = self
            .send(
                &RequestEnvelope::validate_otp(&session.rid, code),
                Auth::Anonymous,
            )
            .await?;
        token_from(data)
    }

    /// Exchanges an identity token from an external provider for credentials.
    pub async fn login_with_provider(&self, provider: Provider, token: &str) -> Result<Credentials> {
        let data = self
            .send(&RequestEnvelope::social_login(provider, token), Auth::Anonymous)
            .await?;
        token_from(data)
    }

    pub async fn logout(&self, credentials: &Credentials) -> Result<()> {
        self.send(&RequestEnvelope::logout(), Auth::Token(credentials))
            .await
            .map(|_| ())
    }
}

// Numeric request ids are forwarded in their string form.
fn rid_of(data: &Value) -> Option<String> {
    match data.get("rid")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn token_from(data: Value) -> Result<Credentials> {
    match data.get("token").and_then(Value::as_str) {
        Some(token) if !token.is_empty() => Ok(Credentials::new(token)),
        _ => Err(ChatraceError::MalformedBody {
            raw: data.to_string(),
        }),
    }
}

/// Classifies a received response. Checks run in a fixed order: status,
/// the literal `null` sentinel, JSON parse, then the envelope `status`.
pub fn classify(status: u16, body: &str) -> Result<Value> {
    if status != 200 {
        return Err(ChatraceError::Http { status });
    }

    // `null` parses as JSON, so it must be caught first.
    if body.trim() == "null" {
        return Err(ChatraceError::NullResponse);
    }

    let parsed: Value =
        serde_json::from_str(body).map_err(|_| ChatraceError::MalformedBody {
            raw: body.to_string(),
        })?;

    match parsed {
        Value::Object(mut map) if map.get("status").and_then(Value::as_str) == Some("OK") => {
            Ok(map.remove("data").unwrap_or(Value::Null))
        }
        raw => Err(ChatraceError::Api {
            code: code_of(&raw),
            raw,
        }),
    }
}

// The API sends the code as a number, occasionally as a numeric string.
fn code_of(body: &Value) -> Option<i64> {
    match body.get("code")? {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
