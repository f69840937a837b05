use crate::config::Config;
use serde::Serialize;
use tokio::net::TcpListener;

#[derive(Debug, Serialize)]
pub struct PreflightIssue {
    pub field: String,
    pub message: String,
}

#[derive(Debug)]
pub struct PreflightError {
    pub issues: Vec<PreflightIssue>,
}

impl PreflightError {
    pub fn new(issues: Vec<PreflightIssue>) -> Self {
        Self { issues }
    }
}

/// Checks everything `check-config` reports: configuration values and
/// whether the HTTP listener address can be bound.
pub async fn validate_start(config: &Config) -> Result<(), PreflightError> {
    let mut issues = config
        .issues()
        .into_iter()
        .map(|(field, message)| PreflightIssue {
            field: field.to_string(),
            message,
        })
        .collect::<Vec<_>>();

    if let Ok(addr) = config.socket_addr() {
        if let Err(err) = TcpListener::bind(addr).await.map(drop) {
            issues.push(PreflightIssue {
                field: "http_addr".to_string(),
                message: format!("Address {} is unavailable ({})", addr, err),
            });
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(PreflightError::new(issues))
    }
}
