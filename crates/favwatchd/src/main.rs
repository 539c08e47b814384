// # favwatchd - Favorites Watch Daemon
//
// The favwatchd daemon is a thin integration layer. It is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing the runtime
// 3. Registering feed sources and seen stores
// 4. Running PollEngine checks on a fixed schedule
// 5. Writing every emitted event to stdout as one JSON line, flushed before
//    the seen buffer is saved
//
// Dedup, cutoff and persistence rules live in favwatch-core. Retry is simply
// the next tick of the schedule.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Agent
// - `FAVWATCH_USERNAME`: Screen name whose favorites are followed (required)
// - `FAVWATCH_NUMBER`: Favorites fetched per poll (default 10)
// - `FAVWATCH_HISTORY`: Tweet ids remembered between polls (default 100)
// - `FAVWATCH_EXPECTED_UPDATE_PERIOD_IN_DAYS`: Liveness window (default 2)
// - `FAVWATCH_STARTING_AT`: Earliest tweet creation time to emit (optional)
// - `FAVWATCH_CREATED_AT`: Agent creation time (default: first check, persisted)
// - `FAVWATCH_AGENT_ID`: Key for the seen buffer (default `favwatch-<username>`)
//
// ### Feed Source
// - `FAVWATCH_BEARER_TOKEN`: Twitter API bearer token (required)
// - `FAVWATCH_API_BASE`: Override for the API base URL (optional)
//
// ### State Store
// - `FAVWATCH_STATE_STORE_TYPE`: Type of seen store (file, memory)
// - `FAVWATCH_STATE_PATH`: Path to state file (for file store)
//
// ### Daemon
// - `FAVWATCH_POLL_INTERVAL_SECS`: Seconds between checks (default 3600)
// - `FAVWATCH_DRY_RUN`: Run a single dry run and exit (true/false)
// - `FAVWATCH_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export FAVWATCH_USERNAME=tectonic
// export FAVWATCH_BEARER_TOKEN=your_token
// export FAVWATCH_STATE_STORE_TYPE=file
// export FAVWATCH_STATE_PATH=/var/lib/favwatch/state.json
//
// favwatchd | jq .payload.expanded_text
// ```

use anyhow::Result;
use chrono::{DateTime, TimeDelta, Utc};
use favwatch_core::config::parse_timestamp;
use favwatch_core::traits::{EventSink, SeenStore};
use favwatch_core::{
    AgentConfig, AgentOptions, Error, FeedSourceConfig, FileSeenStore, JsonLinesSink, PollEngine,
    SeenStoreConfig, SourceRegistry,
};
use std::env;
use std::process::ExitCode;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Default seconds between checks (hourly)
const DEFAULT_POLL_INTERVAL_SECS: u64 = 3600;

/// Buffered engine events for the monitor task
const MONITOR_CHANNEL_CAPACITY: usize = 256;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum FavwatchExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<FavwatchExitCode> for ExitCode {
    fn from(code: FavwatchExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Raw configuration, exactly as found in the environment
#[derive(Debug, Default)]
struct Config {
    username: Option<String>,
    number: Option<String>,
    history: Option<String>,
    expected_update_period_in_days: Option<String>,
    starting_at: Option<String>,
    created_at: Option<String>,
    agent_id: Option<String>,
    bearer_token: Option<String>,
    api_base: Option<String>,
    state_store_type: Option<String>,
    state_path: Option<String>,
    poll_interval_secs: Option<String>,
    dry_run: Option<String>,
    log_level: Option<String>,
}

/// Configuration after validation
#[derive(Debug)]
struct Settings {
    agent_id: String,
    agent: AgentConfig,
    feed_source: FeedSourceConfig,
    seen_store: SeenStoreConfig,
    poll_interval: Duration,
    dry_run: bool,
    log_level: Level,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            username: var("FAVWATCH_USERNAME"),
            number: var("FAVWATCH_NUMBER"),
            history: var("FAVWATCH_HISTORY"),
            expected_update_period_in_days: var("FAVWATCH_EXPECTED_UPDATE_PERIOD_IN_DAYS"),
            starting_at: var("FAVWATCH_STARTING_AT"),
            created_at: var("FAVWATCH_CREATED_AT"),
            agent_id: var("FAVWATCH_AGENT_ID"),
            bearer_token: var("FAVWATCH_BEARER_TOKEN"),
            api_base: var("FAVWATCH_API_BASE"),
            state_store_type: var("FAVWATCH_STATE_STORE_TYPE"),
            state_path: var("FAVWATCH_STATE_PATH"),
            poll_interval_secs: var("FAVWATCH_POLL_INTERVAL_SECS"),
            dry_run: var("FAVWATCH_DRY_RUN"),
            log_level: var("FAVWATCH_LOG_LEVEL"),
        }
    }

    /// Validate the configuration
    ///
    /// Every problem is collected so a single run reports all of them.
    ///
    /// Without `FAVWATCH_CREATED_AT` the engine fixes the creation time at
    /// the first check and persists it with the seen buffer.
    fn validate(&self) -> Result<Settings> {
        let mut problems: Vec<String> = Vec::new();

        let created_at = self.created_at.as_deref().and_then(|raw| {
            let parsed = parse_timestamp(raw);
            if parsed.is_none() {
                problems.push(format!("FAVWATCH_CREATED_AT could not be parsed: '{}'", raw));
            }
            parsed
        });

        let defaults = AgentOptions::default();
        let options = AgentOptions {
            username: self.username.clone().unwrap_or_default(),
            number: self.number.clone().unwrap_or(defaults.number),
            history: self.history.clone().unwrap_or(defaults.history),
            expected_update_period_in_days: self
                .expected_update_period_in_days
                .clone()
                .unwrap_or(defaults.expected_update_period_in_days),
            starting_at: self.starting_at.clone(),
        };

        let agent = match options.validate(created_at) {
            Ok(agent) => Some(agent),
            Err(errors) => {
                for field in errors.errors() {
                    problems.push(format!("{} ({})", field.message, env_key(field.field)));
                }
                None
            }
        };

        let feed_source = FeedSourceConfig::Twitter {
            bearer_token: self.bearer_token.clone().unwrap_or_default(),
            api_base: self.api_base.clone(),
        };
        if self.bearer_token.is_none() {
            problems.push(
                "FAVWATCH_BEARER_TOKEN is required. \
                Set it via: export FAVWATCH_BEARER_TOKEN=your_token"
                    .to_string(),
            );
        } else if let Err(e) = feed_source.validate() {
            problems.push(e.to_string());
        }

        let seen_store = match self.state_store_type.as_deref().unwrap_or("file") {
            "memory" => Some(SeenStoreConfig::Memory),
            "file" => match self.state_path.as_deref() {
                Some(path) => {
                    if let Some(parent) = std::path::Path::new(path).parent()
                        && !parent.as_os_str().is_empty()
                        && !parent.exists()
                    {
                        problems.push(format!(
                            "FAVWATCH_STATE_PATH parent directory does not exist: {}. \
                            Create it first: mkdir -p {}",
                            parent.display(),
                            parent.display()
                        ));
                    }
                    Some(SeenStoreConfig::File {
                        path: path.to_string(),
                    })
                }
                None => {
                    problems.push(
                        "FAVWATCH_STATE_PATH is required when FAVWATCH_STATE_STORE_TYPE=file. \
                        Set it via: export FAVWATCH_STATE_PATH=/var/lib/favwatch/state.json"
                            .to_string(),
                    );
                    None
                }
            },
            other => {
                problems.push(format!(
                    "FAVWATCH_STATE_STORE_TYPE '{}' is not supported. \
                    Supported types: file, memory",
                    other
                ));
                None
            }
        };

        let poll_interval = match self.poll_interval_secs.as_deref() {
            None => Some(Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS)),
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Some(Duration::from_secs(secs)),
                _ => {
                    problems.push(format!(
                        "FAVWATCH_POLL_INTERVAL_SECS must be a positive number of seconds. Got: {}",
                        raw
                    ));
                    None
                }
            },
        };

        let dry_run = match self.dry_run.as_deref().map(|v| v.trim().to_lowercase()) {
            None => Some(false),
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes") => Some(true),
            Some(v) if matches!(v.as_str(), "0" | "false" | "no") => Some(false),
            Some(v) => {
                problems.push(format!("FAVWATCH_DRY_RUN must be true or false. Got: {}", v));
                None
            }
        };

        let log_level = match self.log_level.as_deref().unwrap_or("info").to_lowercase().as_str() {
            "trace" => Some(Level::TRACE),
            "debug" => Some(Level::DEBUG),
            "info" => Some(Level::INFO),
            "warn" => Some(Level::WARN),
            "error" => Some(Level::ERROR),
            other => {
                problems.push(format!(
                    "FAVWATCH_LOG_LEVEL '{}' is not valid. \
                    Valid levels: trace, debug, info, warn, error",
                    other
                ));
                None
            }
        };

        if let Some(id) = &self.agent_id
            && id.chars().any(char::is_whitespace)
        {
            problems.push(format!("FAVWATCH_AGENT_ID cannot contain whitespace. Got: '{}'", id));
        }

        match (agent, seen_store, poll_interval, dry_run, log_level) {
            (Some(agent), Some(seen_store), Some(poll_interval), Some(dry_run), Some(log_level))
                if problems.is_empty() =>
            {
                let agent_id = self
                    .agent_id
                    .clone()
                    .unwrap_or_else(|| format!("favwatch-{}", agent.username));
                Ok(Settings {
                    agent_id,
                    agent,
                    feed_source,
                    seen_store,
                    poll_interval,
                    dry_run,
                    log_level,
                })
            }
            _ => anyhow::bail!("\n  - {}", problems.join("\n  - ")),
        }
    }
}

/// Environment variable behind an agent option
fn env_key(field: &str) -> String {
    format!("FAVWATCH_{}", field.to_uppercase())
}

fn main() -> ExitCode {
    // Load and validate configuration from environment
    let config = Config::from_env();
    let settings = match config.validate() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration validation error: {}", e);
            return FavwatchExitCode::ConfigError.into();
        }
    };

    // Logs go to stderr; stdout carries only events
    let subscriber = FmtSubscriber::builder()
        .with_max_level(settings.log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return FavwatchExitCode::ConfigError.into();
    }

    info!("Starting favwatchd daemon");
    info!(
        "Watching favorites of {} ({} per poll, history {})",
        settings.agent.username, settings.agent.page_size, settings.agent.history_size
    );

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return FavwatchExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run_daemon(settings).await {
            Ok(()) => FavwatchExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                match e.downcast_ref::<Error>() {
                    Some(Error::Config(_)) | Some(Error::Validation(_)) => FavwatchExitCode::ConfigError,
                    _ => FavwatchExitCode::RuntimeError,
                }
            }
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(settings: Settings) -> Result<()> {
    let registry = SourceRegistry::with_builtin_stores();

    #[cfg(feature = "twitter")]
    {
        info!("Registering Twitter feed source");
        favwatch_source_twitter::register(&registry);
    }

    let source = registry.create_feed_source(&settings.feed_source)?;
    let store = build_store(&registry, &settings.seen_store, settings.dry_run).await?;
    info!("Feed source: {}", source.source_name());
    info!("Seen store type: {}", settings.seen_store.type_name());

    // Written and flushed inside emit, before the engine saves the buffer
    let sink = JsonLinesSink::new(tokio::io::stdout());

    let (engine, mut monitor) = PollEngine::new(
        settings.agent_id.clone(),
        settings.agent,
        source,
        store,
        Box::new(sink),
        MONITOR_CHANNEL_CAPACITY,
    )?;

    tokio::spawn(async move {
        while let Some(event) = monitor.recv().await {
            debug!("Engine event: {:?}", event);
        }
    });

    if settings.dry_run {
        dry_run(&engine).await
    } else {
        poll_until_shutdown(&engine, settings.poll_interval).await
    }
}

/// Build the seen store; a dry run leaves the state file exactly as it was
async fn build_store(
    registry: &SourceRegistry,
    config: &SeenStoreConfig,
    dry_run: bool,
) -> Result<Box<dyn SeenStore>> {
    let store: Box<dyn SeenStore> = match config {
        SeenStoreConfig::File { path } if dry_run => Box::new(FileSeenStore::open_read_only(path).await?),
        config => registry.create_seen_store(config).await?,
    };
    Ok(store)
}

/// Run a single dry run and print what would be emitted
async fn dry_run(engine: &PollEngine) -> Result<()> {
    info!("Dry run for agent {}", engine.agent_id());
    let events = engine.dry_run().await?;
    let count = events.len();

    let stdout = JsonLinesSink::new(tokio::io::stdout());
    for event in events {
        stdout.emit(event).await?;
    }

    info!("Dry run complete: {} event(s) would be emitted", count);
    Ok(())
}

/// Check on every tick until SIGTERM or SIGINT
async fn poll_until_shutdown(engine: &PollEngine, poll_interval: Duration) -> Result<()> {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    info!("Polling every {:?}", poll_interval);

    let period = engine.config().expected_update_period;
    let mut liveness = Liveness::new(Utc::now());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Utc::now();
                match engine.check_at(now).await {
                    Ok(report) => {
                        info!(
                            "Check complete: {} emitted, {} already seen, {} before cutoff",
                            report.emitted, report.skipped_seen, report.skipped_old
                        );
                        liveness.record_success(now, report.emitted);
                    }
                    Err(e) => {
                        if e.is_transient() {
                            warn!("Check failed (will retry next tick): {}", e);
                        } else {
                            error!("Check failed: {}", e);
                        }
                        liveness.record_failure();
                    }
                }
                if !liveness.is_working(now, period) {
                    warn!(
                        "Agent {} is not working: no new favorites within {} day(s) or last check failed",
                        engine.agent_id(),
                        period.num_days()
                    );
                }
            }
            signal = &mut shutdown => {
                let signal = signal?;
                info!("Received shutdown signal: {}", signal);
                info!("Shutting down daemon");
                return Ok(());
            }
        }
    }
}

/// Health signal derived from check outcomes
///
/// An agent is working when its last check succeeded and it produced an
/// event within the expected update period. Time since startup counts as
/// an event for the first period.
#[derive(Debug, Clone, Copy)]
struct Liveness {
    last_event_at: DateTime<Utc>,
    last_check_failed: bool,
}

impl Liveness {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            last_event_at: started_at,
            last_check_failed: false,
        }
    }

    fn record_success(&mut self, now: DateTime<Utc>, emitted: usize) {
        self.last_check_failed = false;
        if emitted > 0 {
            self.last_event_at = now;
        }
    }

    fn record_failure(&mut self) {
        self.last_check_failed = true;
    }

    fn is_working(&self, now: DateTime<Utc>, period: TimeDelta) -> bool {
        !self.last_check_failed && now - self.last_event_at <= period
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(signal)
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
