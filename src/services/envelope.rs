use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Validation failures raised while building a [`RequestEnvelope`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("empty operation name")]
    EmptyOp,
    #[error("{field} given without {missing}")]
    Discriminator {
        field: &'static str,
        missing: &'static str,
    },
    #[error("data must be a JSON object")]
    DataNotObject,
    #[error("data field {0:?} is nested; data must be a flat mapping")]
    NestedData(String),
    #[error("param {0:?} collides with an envelope field")]
    ReservedParam(String),
    #[error("command path has {0} segments past op3")]
    TooManySegments(usize),
}

const RESERVED: [&str; 7] = ["op", "op1", "op2", "op3", "data", "account_id", "rid"];

/// The JSON body posted to the single API endpoint.
///
/// Build it through [`RequestEnvelope::builder`] or one of the canned
/// constructors, which enforce the discriminator ordering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestEnvelope {
    op: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    op1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    op2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    op3: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rid: Option<String>,
    #[serde(flatten)]
    params: Map<String, Value>,
}

impl RequestEnvelope {
    pub fn builder(op: impl Into<String>) -> EnvelopeBuilder {
        EnvelopeBuilder {
            op: op.into(),
            ..Default::default()
        }
    }

    /// `login.email.requestOTP`
    pub fn request_otp(email: &str) -> Self {
        Self::fixed(
            ["login", "email", "requestOTP"],
            object([("email", Value::from(email))]),
        )
    }

    /// `login.email.validateOTP`, bound to the `rid` of the preceding request.
    pub fn validate_otp(rid: &str, code: &str) -> Self {
        Self::fixed(
            ["login", "email", "validateOTP"],
            object([("code", Value::from(code))]),
        )
        .with_rid(Some(rid.to_string()))
    }

    /// `login.authentication.validate.<provider>` carrying an identity token
    /// obtained from the provider's own flow.
    pub fn social_login(provider: Provider, token: &str) -> Self {
        let fields = match provider {
            Provider::Google => object([
                ("idToken", Value::from(token)),
                ("serverAuthCode", Value::from("")),
            ]),
            Provider::Apple => object([
                ("identityToken", Value::from(token)),
                ("authorizationCode", Value::from("")),
            ]),
            Provider::Facebook => object([("accessToken", Value::from(token))]),
        };
        RequestEnvelope {
            op: "login".into(),
            op1: Some("authentication".into()),
            op2: Some("validate".into()),
            op3: Some(provider.to_string()),
            data: Some(fields),
            account_id: None,
            rid: None,
            params: Map::new(),
        }
    }

    pub fn logout() -> Self {
        RequestEnvelope {
            op: "logout".into(),
            op1: None,
            op2: None,
            op3: None,
            data: None,
            account_id: None,
            rid: None,
            params: Map::new(),
        }
    }

    fn fixed(path: [&str; 3], fields: Map<String, Value>) -> Self {
        RequestEnvelope {
            op: path[0].into(),
            op1: Some(path[1].into()),
            op2: Some(path[2].into()),
            op3: None,
            data: Some(fields),
            account_id: None,
            rid: None,
            params: Map::new(),
        }
    }

    fn with_rid(mut self, rid: Option<String>) -> Self {
        self.rid = rid;
        self
    }

    /// Dotted command path, e.g. `login.email.requestOTP`.
    pub fn command(&self) -> String {
        [Some(&self.op), self.op1.as_ref(), self.op2.as_ref(), self.op3.as_ref()]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn rid(&self) -> Option<&str> {
        self.rid.as_deref()
    }

    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.data.as_ref()
    }
}

fn object<const N: usize>(fields: [(&str, Value); N]) -> Map<String, Value> {
    fields
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Identity providers accepted by the social login validate operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Google,
    Apple,
    Facebook,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Provider::Google => "google",
            Provider::Apple => "apple",
            Provider::Facebook => "facebook",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default)]
pub struct EnvelopeBuilder {
    op: String,
    op1: Option<String>,
    op2: Option<String>,
    op3: Option<String>,
    data: Option<Value>,
    account_id: Option<String>,
    rid: Option<String>,
    params: Map<String, Value>,
    overflow: usize,
}

impl EnvelopeBuilder {
    pub fn op1(mut self, op1: impl Into<String>) -> Self {
        self.op1 = Some(op1.into());
        self
    }

    pub fn op2(mut self, op2: impl Into<String>) -> Self {
        self.op2 = Some(op2.into());
        self
    }

    pub fn op3(mut self, op3: impl Into<String>) -> Self {
        self.op3 = Some(op3.into());
        self
    }

    /// Sets the whole sub-operation path at once. More than three segments
    /// fail at [`EnvelopeBuilder::build`].
    pub fn path<S: AsRef<str>>(mut self, segments: &[S]) -> Self {
        let mut it = segments.iter().map(|s| s.as_ref().to_string());
        self.op1 = it.next();
        self.op2 = it.next();
        self.op3 = it.next();
        self.overflow = it.count();
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn rid(mut self, rid: impl Into<String>) -> Self {
        self.rid = Some(rid.into());
        self
    }

    /// Adds an extra top-level field such as `contact_id`.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Result<RequestEnvelope, EnvelopeError> {
        if self.op.trim().is_empty() {
            return Err(EnvelopeError::EmptyOp);
        }
        if self.overflow > 0 {
            return Err(EnvelopeError::TooManySegments(self.overflow));
        }
        if self.op2.is_some() && self.op1.is_none() {
            return Err(EnvelopeError::Discriminator {
                field: "op2",
                missing: "op1",
            });
        }
        if self.op3.is_some() && self.op2.is_none() {
            return Err(EnvelopeError::Discriminator {
                field: "op3",
                missing: "op2",
            });
        }
        if let Some(key) = self.params.keys().find(|k| RESERVED.contains(&k.as_str())) {
            return Err(EnvelopeError::ReservedParam(key.clone()));
        }
        let data = match self.data {
            None => None,
            Some(Value::Object(map)) => {
                if let Some((key, _)) = map.iter().find(|(_, v)| !is_flat(v)) {
                    return Err(EnvelopeError::NestedData(key.clone()));
                }
                Some(map)
            }
            Some(_) => return Err(EnvelopeError::DataNotObject),
        };

        Ok(RequestEnvelope {
            op: self.op,
            op1: self.op1,
            op2: self.op2,
            op3: self.op3,
            data,
            account_id: self.account_id,
            rid: self.rid,
            params: self.params,
        })
    }
}

// Scalars, or arrays of scalars.
fn is_flat(value: &Value) -> bool {
    match value {
        Value::Object(_) => false,
        Value::Array(items) => items
            .iter()
            .all(|v| !matches!(v, Value::Object(_) | Value::Array(_))),
        _ => true,
    }
}
