use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use glyph_smoke::cli::Cli;
use glyph_smoke::config::{MailboxStrategy, SmokeConfig};
use glyph_smoke::identity::SignupContext;
use glyph_smoke::session::BrowserSession;
use glyph_smoke::signup::SignupOrchestrator;

fn main() -> Result<ExitCode> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        warn!(path = %cli.config, "config file not found, using defaults");
        include_str!("../config/default.toml").to_string()
    });
    let mut config = SmokeConfig::from_toml(&config_str)?;

    // Environment variable overrides for CI poll tuning
    if let Ok(v) = std::env::var("SMOKE_MAX_ATTEMPTS") {
        if let Ok(n) = v.parse::<u32>() {
            config.poll.max_attempts = n;
        }
    }
    if let Ok(v) = std::env::var("SMOKE_INTERVAL_MS") {
        if let Ok(n) = v.parse::<u64>() {
            config.poll.interval_ms = n;
        }
    }
    if let Ok(v) = std::env::var("SMOKE_HEADLESS") {
        config.browser.headless = v != "0" && v.to_lowercase() != "false";
    }

    // CLI overrides (take precedence over env)
    if let Some(base_url) = cli.base_url {
        config.target.base_url = base_url;
    }
    if let Some(strategy) = cli.mailbox {
        config.mailbox.strategy = match strategy.as_str() {
            "webmail" => MailboxStrategy::Webmail,
            "api" => MailboxStrategy::Api,
            other => anyhow::bail!("unknown mailbox strategy: {other}"),
        };
    }
    if let Some(max_attempts) = cli.max_attempts {
        config.poll.max_attempts = max_attempts;
    }
    if let Some(interval_ms) = cli.interval_ms {
        config.poll.interval_ms = interval_ms;
    }
    if cli.headed {
        config.browser.headless = false;
    }
    if let Some(artifact_dir) = cli.artifact_dir {
        config.artifacts.screenshot_dir = artifact_dir;
    }
    config.validate()?;

    let session = BrowserSession::launch(&config.browser)?;
    let context = SignupContext::generate(&config);
    let mut orchestrator = SignupOrchestrator::new(session, config, context);

    match orchestrator.run().await {
        Ok(report) => {
            info!(
                "✓ signup smoke passed: unified id {} for {} in {:?}",
                report.unified_id, report.email, report.elapsed
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(cause) => {
            let screenshot = orchestrator
                .capture_failure(&cause)
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "unavailable".to_string());
            error!(
                step = orchestrator.state().name(),
                category = cause.category(),
                screenshot = %screenshot,
                "✗ signup smoke failed: {cause}"
            );
            // Browser teardown happens when the orchestrator drops with this
            // scope; the distinguishable exit status is what CI gates on.
            Ok(ExitCode::FAILURE)
        }
    }
}
