use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::sync::Mutex;
use tracing::info;

mod clock;
mod config;
mod database;
mod discord;
mod error;
mod monitoring;
mod pool;
mod render;

use config::Config;
use database::{DatabaseImpl, ZoneStore};
use discord::{
    AnnouncementRules, AnnouncementWatcher, CommandWatcher, DiscordClient, MessageId, MessageSync,
};
use error::AppError;
use monitoring::checker::HttpChecker;
use monitoring::sources::{SourceFetcher, StatusSource};
use monitoring::state::RestartGrace;
use monitoring::useragent::UserAgentPool;
use monitoring::{MonitoringScheduler, StatusExecutor, Zone};

#[derive(Debug, Parser)]
#[command(version, about = "Keeps a Discord status message in sync with a FiveM server")]
struct Cli {
    /// Config file (defaults to $XDG_CONFIG_HOME/zonewatch/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the monitor (default)
    Run,
    /// Print the effective configuration
    Config,
    /// Read the player limit from the server once and store it
    RefreshMaxPlayers,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let (config, created) = Config::from_config(cli.config.as_ref())?;
    logger::init_tracing(&config.log_level);
    if let Some(path) = created {
        info!("Wrote default config to {}", path.display());
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Config => {
            print!("{config}");
            Ok(())
        }
        Command::RefreshMaxPlayers => refresh_max_players(&config).await,
    }
}

async fn open_store(config: &Config) -> Result<Arc<DatabaseImpl>, AppError> {
    let pool = pool::open_pool(&config.database.path).await.map_err(AppError::Store)?;
    {
        let conn = pool.get().await.map_err(|e| AppError::Store(e.into()))?;
        database::initialize_database(&conn).await.map_err(AppError::Store)?;
    }
    info!("Opened zone store at {}", config.database.path.display());
    Ok(Arc::new(DatabaseImpl::new_from_pool(pool)))
}

async fn refresh_max_players(config: &Config) -> Result<(), AppError> {
    let store = open_store(config).await?;
    let zone = store.load_or_create_zone().await.map_err(AppError::Store)?;
    let checker = HttpChecker::new(config.server.address.clone(), config.server.timeout_seconds)?;

    let max_players = checker.fetch_max_players().await?;
    store.set_max_players(zone.id, max_players, Utc::now()).await.map_err(AppError::Store)?;
    println!("Max players: {max_players}");
    Ok(())
}

async fn run(config: Config) -> Result<(), AppError> {
    config.validate()?;

    let store = open_store(&config).await?;
    let mut record = store.load_or_create_zone().await.map_err(AppError::Store)?;
    let custom_message = config.presentation.custom_message.as_deref();
    if custom_message != record.custom_message.as_deref() {
        store.set_custom_message(record.id, custom_message).await.map_err(AppError::Store)?;
        record = store.load_or_create_zone().await.map_err(AppError::Store)?;
    }

    let grace = RestartGrace::from_seconds(
        config.server.restart_grace_before_seconds,
        config.server.restart_grace_after_seconds,
    );
    let zone = Arc::new(Mutex::new(Zone::from_record(&record, grace)));
    info!("Restored zone {} in state {}", record.id, record.last_status);

    let discord = DiscordClient::connect(
        config.discord.api_base.as_str(),
        config.discord.token.as_str(),
        config.server.timeout_seconds.max(10),
    )
    .await
    .map_err(AppError::Login)?;
    let channel_id = config.discord.status_channel_id;
    let status_channel = discord
        .channel(channel_id)
        .await
        .map_err(|source| AppError::Channel { channel_id, source })?;

    let checker = Arc::new(HttpChecker::new(
        config.server.address.clone(),
        config.server.timeout_seconds,
    )?);
    let executor = StatusExecutor::new(
        checker.clone(),
        store.clone(),
        MessageSync::new(
            Arc::new(status_channel),
            config.discord.history_purge_limit,
            config.discord.history_scan_limit,
        ),
        config.presentation.clone(),
        zone.clone(),
        record.message_handle(),
    )
    .with_probe_timeout(config.server.timeout_seconds);

    let agents = match &config.sources.user_agents_file {
        Some(path) => UserAgentPool::from_file(path)?,
        None => UserAgentPool::builtin(),
    };
    let fetcher = Arc::new(SourceFetcher::new(Arc::new(agents))?);
    let sources = vec![
        StatusSource::official(
            config.sources.official_url.as_str(),
            config.sources.official_timeout_seconds,
        ),
        StatusSource::community(
            config.sources.community_url.as_str(),
            &config.sources.community_selector,
            config.sources.community_timeout_seconds,
        )?,
    ];

    let mut scheduler = MonitoringScheduler::new(store.clone(), zone.clone());
    scheduler.spawn_max_players_loop(
        checker,
        Duration::from_secs(config.server.max_players_refresh_hours.max(1) * 3600),
    );
    scheduler.spawn_status_loop(executor, Duration::from_secs(config.server.update_interval_seconds));
    scheduler.spawn_source_loop(
        fetcher,
        sources,
        Duration::from_secs(config.sources.interval_base_seconds),
        Duration::from_secs(config.sources.interval_jitter_seconds),
    );

    if let Some(announcements) = &config.discord.announcements {
        let channel_id = announcements.channel_id;
        let feed = discord
            .channel(channel_id)
            .await
            .map_err(|source| AppError::Channel { channel_id, source })?;
        let rules = AnnouncementRules::new(
            MessageId(announcements.author_id),
            &announcements.restarting_phrase,
            &announcements.restart_soon_phrase,
            announcements.restart_soon_minutes,
        );
        scheduler.spawn_announcement_loop(
            AnnouncementWatcher::new(Arc::new(feed), rules),
            Duration::from_secs(announcements.poll_interval_seconds.max(1)),
        );
    }

    if let Some(commands) = &config.discord.commands {
        let channel_id = commands.channel_id;
        let channel = Arc::new(
            discord
                .channel(channel_id)
                .await
                .map_err(|source| AppError::Channel { channel_id, source })?,
        );
        scheduler.spawn_command_loop(
            CommandWatcher::new(channel.clone(), channel, &commands.prefix),
            config.presentation.clone(),
            Duration::from_secs(commands.poll_interval_seconds.max(1)),
        );
    }

    info!(
        "Monitoring {} every {}s ({} tasks)",
        config.server.address,
        config.server.update_interval_seconds,
        scheduler.task_count()
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    scheduler.shutdown();

    Ok(())
}
