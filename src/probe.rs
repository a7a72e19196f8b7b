use colored::Colorize;
use log::info;
use serde_json::Value;

use crate::{
    config::Config,
    services::{
        chatrace::{Auth, ChatraceError, Client},
        envelope::{EnvelopeError, RequestEnvelope},
    },
};

/// One read-only endpoint check.
#[derive(Debug, Clone)]
pub struct Probe {
    pub name: &'static str,
    pub envelope: RequestEnvelope,
    pub auth_required: bool,
}

#[derive(Debug)]
pub struct ProbeReport {
    pub name: &'static str,
    pub result: Result<Value, ChatraceError>,
}

impl ProbeReport {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// The read-only endpoints worth checking against a tenant.
pub fn catalog(config: &Config) -> Result<Vec<Probe>, EnvelopeError> {
    let account = &config.chatrace.business_id;
    let mut user = RequestEnvelope::builder("users").op1("get").account_id(account);
    if let Some(user_id) = &config.chatrace.user_id {
        user = user.param("user_id", user_id.as_str());
    }

    Ok(vec![
        Probe {
            name: "whitelabel info",
            envelope: RequestEnvelope::builder("wt").op1("get").build()?,
            auth_required: false,
        },
        Probe {
            name: "user info",
            envelope: user.build()?,
            auth_required: true,
        },
        Probe {
            name: "conversations",
            envelope: RequestEnvelope::builder("conversations")
                .op1("get")
                .account_id(account)
                .build()?,
            auth_required: true,
        },
        Probe {
            name: "admins",
            envelope: RequestEnvelope::builder("admins")
                .op1("get")
                .account_id(account)
                .param("basic_info", true)
                .build()?,
            auth_required: true,
        },
        Probe {
            name: "inbox teams",
            envelope: RequestEnvelope::builder("inbox_team")
                .op1("get")
                .account_id(account)
                .build()?,
            auth_required: true,
        },
        Probe {
            name: "flows",
            envelope: RequestEnvelope::builder("flows")
                .op1("get")
                .account_id(account)
                .build()?,
            auth_required: true,
        },
    ])
}

/// Runs every probe one after the other. A failing probe is recorded and
/// does not stop the rest.
pub async fn run(client: &Client, config: &Config, probes: Vec<Probe>) -> Vec<ProbeReport> {
    let credentials = config.credentials();
    let mut reports = Vec::with_capacity(probes.len());

    for probe in probes {
        let auth = if probe.auth_required {
            Auth::Token(&credentials)
        } else {
            Auth::Anonymous
        };
        info!("Probing {} ({})", probe.name, probe.envelope.command());
        let result = client.send(&probe.envelope, auth).await;
        reports.push(ProbeReport {
            name: probe.name,
            result,
        });
    }
    reports
}

/// One line per outcome, suitable for a terminal.
pub fn describe(result: &Result<Value, ChatraceError>) -> String {
    match result {
        Ok(data) => format!("{} {}", "OK".green(), data),
        Err(e) if e.is_auth_failure() => format!("{} {}", "AUTH FAILED".red(), e),
        Err(ChatraceError::NullResponse) => format!("{} {}", "NULL".yellow(), ChatraceError::NullResponse),
        Err(e) => format!("{} {}", "FAILED".red(), e),
    }
}

pub fn summary(reports: &[ProbeReport]) -> String {
    let working: Vec<&str> = reports.iter().filter(|r| r.is_success()).map(|r| r.name).collect();
    let failed: Vec<&str> = reports.iter().filter(|r| !r.is_success()).map(|r| r.name).collect();

    let mut out = format!("Working: {}, failed: {}", working.len(), failed.len());
    if !working.is_empty() {
        out.push_str(&format!("\n  working: {}", working.join(", ")));
    }
    if !failed.is_empty() {
        out.push_str(&format!("\n  failed: {}", failed.join(", ")));
    }
    out
}
