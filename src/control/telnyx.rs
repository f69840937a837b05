use super::{CallControl, CommandError, CommandResult};
use crate::call::{DepartmentTable, MenuPrompt};
use crate::config::PlatformConfig;
use crate::version;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{error, info};
use url::Url;
use uuid::Uuid;

#[derive(Debug, Serialize)]
struct AnswerCommand {
    command_id: String,
}

#[derive(Debug, Serialize)]
struct TransferCommand<'a> {
    to: &'a str,
    command_id: String,
}

#[derive(Debug, Serialize)]
struct GatherUsingSpeakCommand<'a> {
    #[serde(flatten)]
    prompt: &'a MenuPrompt,
    valid_digits: &'a str,
    command_id: String,
}

/// Call Control v2 REST client.
///
/// Uses one pooled `reqwest::Client` with a fixed request timeout; a timeout
/// is reported as `CommandError::Timeout`. Only HTTP 200 counts as success.
pub struct TelnyxControl {
    client: Client,
    api_base: Url,
    api_key: String,
    menu: MenuPrompt,
    valid_digits: String,
}

impl TelnyxControl {
    pub fn new(
        platform: &PlatformConfig,
        menu: MenuPrompt,
        departments: &DepartmentTable,
    ) -> Result<Self> {
        let api_base = Url::parse(platform.api_base.trim())?;
        if api_base.cannot_be_a_base() {
            anyhow::bail!("api_base {} cannot carry a path", api_base);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(platform.timeout_secs))
            .user_agent(version::get_useragent())
            .build()?;
        Ok(Self {
            client,
            api_base,
            api_key: platform.api_key.trim().to_string(),
            menu,
            valid_digits: departments.valid_digits(),
        })
    }

    /// `{api_base}/calls/{id}/actions/{action}`. The id is pushed as one
    /// percent-encoded segment, so `/`, `?` or `#` in it stay inside it.
    fn action_url(&self, call_control_id: &str, action: &str) -> Result<Url, CommandError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| CommandError::Transport(format!("invalid api base {}", self.api_base)))?
            .pop_if_empty()
            .extend(["calls", call_control_id, "actions", action]);
        Ok(url)
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        call_control_id: &str,
        action: &'static str,
        body: &T,
    ) -> CommandResult {
        let url = self.action_url(call_control_id, action)?;
        let start_time = Instant::now();
        let result = self
            .client
            .post(url.clone())
            .bearer_auth(&self.api_key)
            .header(header::ACCEPT, "application/json")
            .json(body)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                let err = CommandError::from(e);
                error!(
                    call_control_id,
                    action,
                    %url,
                    elapsed = start_time.elapsed().as_millis(),
                    "{} failed: {}",
                    action,
                    err
                );
                return Err(err);
            }
        };

        let status = response.status();
        if status == StatusCode::OK {
            info!(
                call_control_id,
                action,
                elapsed = start_time.elapsed().as_millis(),
                "command accepted"
            );
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        error!(
            call_control_id,
            action,
            status = status.as_u16(),
            elapsed = start_time.elapsed().as_millis(),
            "{} failed: {} {}",
            action,
            status.as_u16(),
            body
        );
        Err(CommandError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

fn new_command_id() -> String {
    Uuid::new_v4().to_string()
}

#[async_trait]
impl CallControl for TelnyxControl {
    async fn answer(&self, call_control_id: &str) -> CommandResult {
        let body = AnswerCommand {
            command_id: new_command_id(),
        };
        self.post(call_control_id, "answer", &body).await
    }

    async fn transfer(&self, call_control_id: &str, destination: &str) -> CommandResult {
        let body = TransferCommand {
            to: destination,
            command_id: new_command_id(),
        };
        self.post(call_control_id, "transfer", &body).await
    }

    async fn start_menu(&self, call_control_id: &str) -> CommandResult {
        let body = GatherUsingSpeakCommand {
            prompt: &self.menu,
            valid_digits: &self.valid_digits,
            command_id: new_command_id(),
        };
        self.post(call_control_id, "gather_using_speak", &body).await
    }
}
