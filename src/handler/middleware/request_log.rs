use crate::handler::middleware::clientaddr::ClientAddr;
use axum::{
    body::Body,
    extract::State,
    http::{header::CONTENT_LENGTH, Request},
    middleware::Next,
    response::Response,
};
use std::{fmt, sync::Arc, time::Instant};
use tracing::field::{Field, Visit};
use tracing::{info, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};
use tracing_subscriber::fmt::{format, FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

pub const ACCESS_LOG_TARGET: &str = "http.access";

/// Renders `http.access` events as one pipe separated line and everything
/// else with the default formatter.
#[derive(Clone, Default)]
pub struct AccessLogEventFormat<T = SystemTime> {
    timer: T,
}

impl<T> AccessLogEventFormat<T>
where
    T: FormatTime,
{
    pub fn new(timer: T) -> Self {
        Self { timer }
    }
}

#[derive(Default)]
struct AccessLogFields {
    client_ip: Option<String>,
    method: Option<String>,
    status: Option<u64>,
    body_len: Option<String>,
    cost_ms: Option<f64>,
    uri: Option<String>,
}

impl AccessLogFields {
    fn render(&self) -> String {
        format!(
            "{} | {} | {} | {} | {} | {}",
            self.client_ip.as_deref().unwrap_or("-"),
            self.method.as_deref().unwrap_or("-"),
            self.status
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".to_string()),
            self.body_len.as_deref().unwrap_or("-"),
            self.cost_ms
                .map(|v| format!("{v:.3}ms"))
                .unwrap_or_else(|| "-".to_string()),
            self.uri.as_deref().unwrap_or("-"),
        )
    }
}

impl Visit for AccessLogFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "client_ip" => self.client_ip = Some(value.to_string()),
            "method" => self.method = Some(value.to_string()),
            "body_len" => self.body_len = Some(value.to_string()),
            "uri" => self.uri = Some(value.to_string()),
            _ => {}
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_str(field, format!("{value:?}").trim_matches('"'));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == "status" {
            self.status = Some(value);
        }
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if field.name() == "cost_ms" {
            self.cost_ms = Some(value);
        }
    }
}

impl<S, N, T> FormatEvent<S, N> for AccessLogEventFormat<T>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'writer> FormatFields<'writer> + 'static,
    T: FormatTime + Clone,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        if metadata.target() != ACCESS_LOG_TARGET {
            return format::Format::default()
                .with_timer(self.timer.clone())
                .with_target(true)
                .format_event(ctx, writer, event);
        }

        let mut fields = AccessLogFields::default();
        event.record(&mut fields);
        self.timer.format_time(&mut writer)?;
        writeln!(
            writer,
            " {} {} | {}",
            metadata.level(),
            metadata.target(),
            fields.render()
        )
    }
}

fn should_skip_logging(path: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| match pattern.strip_suffix('*') {
        Some(prefix) => path.starts_with(prefix),
        None => path == pattern,
    })
}

/// Emits one `http.access` event per request after the handler returns.
pub async fn log_requests(
    State(skip_paths): State<Arc<Vec<String>>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let started_at = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().to_string();
    let skip = should_skip_logging(req.uri().path(), skip_paths.as_slice());
    let connect_info = req
        .extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map(|info| info.0);
    let client_ip = ClientAddr::from_http_parts(req.headers(), connect_info)
        .ip()
        .to_string();

    let response = next.run(req).await;

    if !skip {
        let body_len = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("-");
        info!(
            target: ACCESS_LOG_TARGET,
            client_ip = client_ip.as_str(),
            method = method.as_str(),
            status = response.status().as_u16() as u64,
            body_len,
            cost_ms = started_at.elapsed().as_secs_f64() * 1_000.0,
            uri = uri.as_str(),
        );
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_patterns() {
        let patterns = vec!["/calls".to_string(), "/static/*".to_string()];
        assert!(should_skip_logging("/calls", &patterns));
        assert!(should_skip_logging("/static/app.js", &patterns));
        assert!(!should_skip_logging("/webhook", &patterns));
        assert!(!should_skip_logging("/calls/abc", &patterns));
    }

    #[test]
    fn test_render_missing_fields() {
        let fields = AccessLogFields {
            method: Some("POST".to_string()),
            status: Some(200),
            ..Default::default()
        };
        assert_eq!(fields.render(), "- | POST | 200 | - | - | -");
    }

    #[test]
    fn test_render_full_line() {
        let fields = AccessLogFields {
            client_ip: Some("10.0.0.7".to_string()),
            method: Some("POST".to_string()),
            status: Some(200),
            body_len: Some("30".to_string()),
            cost_ms: Some(1.5),
            uri: Some("/webhook".to_string()),
        };
        assert_eq!(
            fields.render(),
            "10.0.0.7 | POST | 200 | 30 | 1.500ms | /webhook"
        );
    }
}
