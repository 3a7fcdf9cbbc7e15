use anyhow::{Context as _, Result};
use clap::Parser;
use spotd::config::{CliOverrides, WatchConfig};
use spotd::watchdog::Watchdog;
use std::time::Duration;
use tracing::{error, info};

/// Per-request timeout for backend polls and webhook posts. The core has no
/// timeout policy of its own; this is the HTTP client's.
const HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Parser, Debug)]
#[command(
    name = "spotd",
    about = "Offline build-agent watchdog — polls CI fleets and alerts on newly offline agents",
    version
)]
struct Args {
    /// Jenkins instance to watch: <url> or <url>,<user>,<pass>. Repeatable.
    #[arg(long = "jenkins", value_name = "SPEC", env = "SPOTD_JENKINS")]
    jenkins: Vec<String>,

    /// Bamboo instance to watch: <url> or <url>,<user>,<pass>. Repeatable.
    #[arg(long = "bamboo", value_name = "SPEC", env = "SPOTD_BAMBOO")]
    bamboo: Vec<String>,

    /// Slack-compatible incoming-webhook URL for notifications
    #[arg(long, value_name = "URL", env = "SPOTD_SLACK_WEBHOOK")]
    slack_webhook: Option<String>,

    /// Webhook display name (default: spotd)
    #[arg(long, value_name = "NAME")]
    slack_username: Option<String>,

    /// Webhook avatar image URL
    #[arg(long, value_name = "URL")]
    slack_icon_url: Option<String>,

    /// Polling interval in seconds (default: 300)
    #[arg(long, value_name = "SECS", env = "SPOTD_INTERVAL")]
    interval: Option<u64>,

    /// Override the Jenkins node _class allowlist. Repeatable.
    #[arg(long = "jenkins-class", value_name = "CLASS")]
    jenkins_class: Vec<String>,

    /// Optional spotd.toml config file (CLI and env vars take priority)
    #[arg(long, value_name = "PATH", env = "SPOTD_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Run a single cycle and exit (non-zero if notification delivery fails)
    #[arg(long, conflicts_with = "warm_up")]
    once: bool,

    /// Prime the cache on the first cycle without notifying, so agents that
    /// were already offline at startup don't all fire as "new"
    #[arg(long)]
    warm_up: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "SPOTD_LOG")]
    log: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "SPOTD_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Init once — must happen before any tracing calls.
    let log_level = args.log.as_deref().unwrap_or("info").to_owned();
    let log_format = std::env::var("SPOTD_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let _file_guard = setup_logging(&log_level, args.log_file.as_deref(), &log_format);

    let config = WatchConfig::resolve(
        CliOverrides {
            jenkins: args.jenkins,
            bamboo: args.bamboo,
            jenkins_class: args.jenkins_class,
            slack_webhook: args.slack_webhook,
            slack_username: args.slack_username,
            slack_icon_url: args.slack_icon_url,
            interval_secs: args.interval,
        },
        args.config.as_deref(),
    )
    .context("invalid configuration")?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .context("failed to build HTTP client")?;

    let sources = config.build_sources(&client);
    let notifier = config.build_notifier(&client);
    if notifier.is_none() {
        info!("no webhook configured — offline agents will be logged only");
    }

    let mut watchdog = Watchdog::new(sources, notifier);
    info!(
        jenkins = config.jenkins.len(),
        bamboo = config.bamboo.len(),
        interval_secs = config.interval.as_secs(),
        "spotd starting"
    );

    if args.once {
        watchdog
            .run_cycle_and_notify()
            .await
            .context("notification delivery failed")?;
        return Ok(());
    }

    run_loop(&mut watchdog, config.interval, args.warm_up).await;
    info!("goodbye");
    Ok(())
}

/// The long-lived polling loop. One cycle at a time; the next tick is only
/// awaited after the previous cycle (including its notify step) completes,
/// so a shutdown signal never abandons a cycle half-way.
async fn run_loop(watchdog: &mut Watchdog, interval: Duration, warm_up: bool) {
    let shutdown = make_shutdown_future();
    tokio::pin!(shutdown);

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await; // the first tick completes immediately

    if warm_up {
        let primed = watchdog.run_cycle().await;
        info!(
            offline = primed.values().map(Vec::len).sum::<usize>(),
            "cache warmed up — pre-existing offline agents will not alert"
        );
    } else if let Err(err) = watchdog.run_cycle_and_notify().await {
        error!(err = %err, "notification delivery failed");
    }

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("shutdown signal received — stopping watchdog loop");
                break;
            }

            _ = ticker.tick() => {
                if let Err(err) = watchdog.run_cycle_and_notify().await {
                    error!(err = %err, "notification delivery failed");
                }
            }
        }
    }
}

/// Returns a future that resolves when a shutdown signal is received.
///
/// On Unix we listen for SIGTERM *and* Ctrl-C.
/// On other platforms we listen for Ctrl-C only.
async fn make_shutdown_future() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}


/// Initialize the tracing subscriber.
/// If `log_file` is set, logs go to both stdout and a daily-rolling file.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
///
/// `log_format` may be `"pretty"` (default, human-readable compact format) or
/// `"json"` (structured JSON for log aggregators).
///
/// If the log directory cannot be created, falls back to stdout-only logging
/// with a warning — never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("spotd.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::fmt().json().with_env_filter(log_level).init();
            } else {
                tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
            }
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }

        Some(guard)
    } else if use_json {
        tracing_subscriber::fmt().json().with_env_filter(log_level).init();
        None
    } else {
        tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
        None
    }
}
