use crate::{
    call::{CallRegistry, CallRegistryRef, DepartmentTable},
    config::Config,
    control::{CallControlRef, TelnyxControl},
    handler::{middleware::request_log::log_requests, Dispatcher, DispatcherRef},
};
use anyhow::Result;
use axum::{middleware, Router};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct AppStateInner {
    pub config: Arc<Config>,
    pub registry: CallRegistryRef,
    pub dispatcher: DispatcherRef,
    pub token: CancellationToken,
}

pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[derive(Default)]
pub struct AppStateBuilder {
    pub config: Option<Config>,
    pub control: Option<CallControlRef>,
    pub registry: Option<CallRegistryRef>,
}

impl AppStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Replaces the platform client, mainly for tests.
    pub fn with_control(mut self, control: CallControlRef) -> Self {
        self.control = Some(control);
        self
    }

    pub fn with_registry(mut self, registry: CallRegistryRef) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Fails when the configuration is invalid, e.g. no usable api key.
    pub async fn build(self) -> Result<AppState> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let departments = Arc::new(DepartmentTable::new(&config.departments)?);
        let control = match self.control {
            Some(control) => control,
            None => Arc::new(TelnyxControl::new(
                &config.platform,
                config.menu.clone(),
                &departments,
            )?),
        };
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(CallRegistry::new()));
        let dispatcher = Arc::new(Dispatcher::new(
            registry.clone(),
            control,
            departments.clone(),
        ));

        info!(
            api_base = %config.platform.api_base,
            departments = departments.len(),
            valid_digits = %departments.valid_digits(),
            "call router ready"
        );

        Ok(Arc::new(AppStateInner {
            config: Arc::new(config),
            registry,
            dispatcher,
            token: CancellationToken::new(),
        }))
    }
}

pub fn create_router(state: AppState) -> Router {
    let skip_paths = Arc::new(vec!["/calls".to_string()]);
    crate::handler::router()
        .with_state(state)
        .layer(middleware::from_fn_with_state(skip_paths, log_requests))
}

pub async fn run(state: AppState, router: Router) -> Result<()> {
    let token = state.token.clone();
    let addr = state.config.socket_addr()?;
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return Err(anyhow::anyhow!("Failed to bind to {}: {}", addr, e));
        }
    };
    info!("listening on {}", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { token.cancelled().await })
    .await
    .map_err(|e| {
        error!("Server error: {}", e);
        anyhow::anyhow!("Server error: {}", e)
    })?;

    info!("Server shut down gracefully");
    Ok(())
}
