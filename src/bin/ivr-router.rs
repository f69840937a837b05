use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use ivr_router::{
    app::{create_router, AppStateBuilder},
    config::Config,
    handler::middleware::request_log::AccessLogEventFormat,
    preflight, version,
};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{
    fmt::time::LocalTime, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version = version::get_short_version(),
    about = "Routes inbound calls to departments from a one-key DTMF menu",
    long_about = version::get_version_info()
)]
struct Cli {
    /// Path to the configuration file
    #[clap(
        long,
        global = true,
        help = "Path to the configuration file (TOML format)"
    )]
    conf: Option<String>,
    #[clap(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate configuration and exit without starting the server
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let config = match cli.conf {
        Some(ref path) => {
            println!("Loading config from: {}", path);
            Config::load(path)?
        }
        None => {
            println!("Loading default config");
            Config::default()
        }
    }
    .with_env()?;

    if matches!(cli.command, Some(Commands::CheckConfig)) {
        match preflight::validate_start(&config).await {
            Ok(_) => {
                println!("Configuration is valid; the listener address is available.");
                return Ok(());
            }
            Err(err) => {
                eprintln!("Configuration validation failed:");
                for issue in err.issues {
                    eprintln!("- {}: {}", issue.field, issue.message);
                }
                std::process::exit(1);
            }
        }
    }

    let mut env_filter = EnvFilter::from_default_env();
    if let Some(Ok(level)) = config
        .effective_log_level()
        .map(|level| level.parse::<LevelFilter>())
    {
        env_filter = env_filter.add_directive(level.into());
    }

    let mut guard_holder = None;
    if let Some(ref log_file) = config.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        guard_holder = Some(guard);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .event_format(AccessLogEventFormat::new(LocalTime::rfc_3339()))
                    .with_ansi(false)
                    .with_writer(non_blocking),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .event_format(AccessLogEventFormat::new(LocalTime::rfc_3339())),
            )
            .try_init()?;
    }
    let _ = guard_holder; // keep the guard alive

    // An invalid api key stops us here, before anything is bound.
    let state = AppStateBuilder::new().with_config(config).build().await?;

    info!(
        "starting ivr-router on {} (debug={})",
        state.config().http_addr,
        state.config().debug
    );
    let router = create_router(state.clone());
    let mut app_future = Box::pin(ivr_router::app::run(state.clone(), router));

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate())?
    };

    #[cfg(unix)]
    {
        tokio::select! {
            result = &mut app_future => return result,
            _ = tokio::signal::ctrl_c() => {
                info!("received CTRL+C, shutting down");
            }
            _ = sigterm_stream.recv() => {
                info!("received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            result = &mut app_future => return result,
            _ = tokio::signal::ctrl_c() => {
                info!("received CTRL+C, shutting down");
            }
        }
    }

    state.token().cancel();
    app_future.await
}
