use anyhow::{bail, Context, Result};
use log::info;
use serde::Serialize;
use std::{fs, io::Write, path::Path};
use tinytemplate::TinyTemplate;
use tokio::io::{self, AsyncBufReadExt, BufReader};

use crate::services::{
    chatrace::{Client, Credentials},
    envelope::RequestEnvelope,
};

static TEMPLATE: &str = r#"# Optional log level, default "info"
loglevel = "info"

[chatrace]
# Optional. The single endpoint every operation is posted to.
url = "{url}"

# Required. Long-lived API token of the business account.
api_token = "MYAPITOKEN"

# Required. Business account id sent as `account_id` on account-scoped calls.
business_id = "{business_id}"

# Optional. Used by `chatrace probe` for the user info check.
# user_id = "MYUSERID"

# Optional. User token, preferred over api_token for authenticated calls.
# You can generate one using `chatrace login --email you@example.com`
user_token = "{user_token}"

# Optional request timeout in secs. No timeout by default.
# timeout_secs = 30
"#;

#[derive(Serialize)]
struct TemplateContext {
    url: String,
    business_id: String,
    user_token: String,
}

pub async fn generate_config(
    config_path: &str,
    client: &Client,
    email: &str,
    business_id: &str,
) -> Result<()> {
    println!("Generating config {}", &config_path);
    let credentials = login(client, email, None).await?;

    let mut tt = TinyTemplate::new();
    tt.set_default_formatter(&tinytemplate::format_unescaped);
    tt.add_template("config", TEMPLATE)?;

    let context = TemplateContext {
        url: client.url().to_string(),
        business_id: business_id.to_string(),
        user_token: credentials.token().to_string(),
    };

    let rendered = tt.render("config", &context)?;

    if let Some(dir) = Path::new(config_path).parent() {
        fs::create_dir_all(dir)?;
    }
    if Path::new(&config_path).exists() {
        println!("Backing up config {}", &config_path);
        fs::rename(config_path, format!("{}.bak", &config_path))?;
    }
    println!("Writing {}", &config_path);
    let mut file = fs::File::create(config_path)?;
    file.write_all(rendered.as_bytes())?;
    file.flush()?;

    Ok(())
}

/// Email OTP login. Prompts on stdin for the code unless one is given.
pub async fn login(client: &Client, email: &str, code: Option<String>) -> Result<Credentials> {
    let session = client
        .request_otp(email)
        .await
        .with_context(|| format!("requesting OTP for {email}"))?;
    info!("OTP sent to {}, request id {}", email, session.rid);

    let code = match code {
        Some(code) => code,
        None => prompt("Enter the OTP code you received: ").await?,
    };

    let credentials = client
        .validate_otp(session, &code)
        .await
        .context("validating OTP")?;
    Ok(credentials)
}

async fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    std::io::stdout().flush()?;

    let mut line = String::new();
    BufReader::new(io::stdin()).read_line(&mut line).await?;
    let line = line.trim().to_string();
    if line.is_empty() {
        bail!("no OTP code entered");
    }
    Ok(line)
}

/// Parses `key=value`. Values that parse as JSON are kept typed, anything
/// else is sent as a string.
pub fn parse_param(s: &str) -> Result<(String, serde_json::Value)> {
    let Some((key, value)) = s.split_once('=') else {
        bail!("expected key=value, got {s:?}");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("empty key in {s:?}");
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Builds the envelope for `chatrace call`: a dotted command path, an
/// optional JSON `data` object, `key=value` params and an optional account.
pub fn call_envelope(
    command: &str,
    data: Option<&str>,
    params: &[String],
    account_id: Option<&str>,
) -> Result<RequestEnvelope> {
    let mut segments = command.split('.').map(str::trim);
    let op = segments.next().unwrap_or_default();
    let path: Vec<&str> = segments.collect();
    if path.iter().any(|s| s.is_empty()) {
        bail!("{command:?} has an empty segment");
    }

    let mut builder = RequestEnvelope::builder(op).path(&path);
    if let Some(data) = data {
        let data = serde_json::from_str(data).context("--data is not valid JSON")?;
        builder = builder.data(data);
    }
    if let Some(account_id) = account_id {
        builder = builder.account_id(account_id);
    }
    for param in params {
        let (key, value) = parse_param(param)?;
        builder = builder.param(key, value);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn template_renders_values() {
        let mut tt = TinyTemplate::new();
        tt.set_default_formatter(&tinytemplate::format_unescaped);
        tt.add_template("config", TEMPLATE).unwrap();
        let rendered = tt
            .render(
                "config",
                &TemplateContext {
                    url: "http://localhost/php/user".into(),
                    business_id: "1145545".into(),
                    user_token: "tok".into(),
                },
            )
            .unwrap();
        assert!(rendered.contains(r#"url = "http://localhost/php/user""#));
        assert!(rendered.contains(r#"business_id = "1145545""#));
        assert!(rendered.contains(r#"user_token = "tok""#));
    }

    #[test]
    fn params_keep_json_types() {
        assert_eq!(parse_param("contact_id=42").unwrap(), (String::from("contact_id"), json!(42)));
        assert_eq!(parse_param("steps=true").unwrap(), (String::from("steps"), json!(true)));
        assert_eq!(
            parse_param("channel=whatsapp").unwrap(),
            (String::from("channel"), json!("whatsapp"))
        );
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=1").is_err());
    }

    #[test]
    fn call_envelope_splits_dotted_path() {
        let envelope = call_envelope(
            "conversations.notes.add",
            Some(r#"{"text": "hi"}"#),
            &["contact_id=42".to_string()],
            None,
        )
        .unwrap();
        assert_eq!(envelope.command(), "conversations.notes.add");
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({
                "op": "conversations",
                "op1": "notes",
                "op2": "add",
                "data": {"text": "hi"},
                "contact_id": 42
            })
        );
    }

    #[test]
    fn call_envelope_injects_account_id() {
        let envelope = call_envelope("flows.get", None, &[], Some("1145545")).unwrap();
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"op": "flows", "op1": "get", "account_id": "1145545"})
        );
    }

    #[test]
    fn call_envelope_rejects_bad_commands() {
        assert!(call_envelope("a..b", None, &[], None).is_err());
        assert!(call_envelope("a.b.", None, &[], None).is_err());
        assert!(call_envelope("", None, &[], None).is_err());
        assert!(call_envelope("a.b.c.d.e", None, &[], None).is_err());
        assert!(call_envelope("wt.get", Some("{not json"), &[], None).is_err());
        assert!(call_envelope("wt.get", None, &["novalue".to_string()], None).is_err());
    }
}
