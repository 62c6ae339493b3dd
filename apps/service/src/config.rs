use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: std::io::Error },
    #[error("failed to write {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: std::io::Error },
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config directory available (set XDG_CONFIG_HOME or HOME)")]
    ConfigPathUnavailable,
    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub server: ServerConfig,
    pub discord: DiscordConfig,
    pub sources: SourcesConfig,
    pub presentation: PresentationConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `host:port` of the game server's HTTP endpoint
    pub address: String,
    pub timeout_seconds: u64,
    pub update_interval_seconds: u64,
    pub restart_grace_before_seconds: u64,
    pub restart_grace_after_seconds: u64,
    pub max_players_refresh_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub token: String,
    pub api_base: String,
    pub status_channel_id: u64,
    pub history_purge_limit: u8,
    pub history_scan_limit: u8,
    pub announcements: Option<AnnouncementsConfig>,
    pub commands: Option<CommandsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnouncementsConfig {
    pub channel_id: u64,
    pub author_id: u64,
    pub restarting_phrase: String,
    pub restart_soon_phrase: String,
    pub restart_soon_minutes: u32,
    pub poll_interval_seconds: u64,
}

/// Channel watched for on-demand status requests
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    pub channel_id: u64,
    pub prefix: String,
    pub poll_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub official_url: String,
    pub official_timeout_seconds: u64,
    pub community_url: String,
    pub community_selector: String,
    pub community_timeout_seconds: u64,
    pub interval_base_seconds: u64,
    pub interval_jitter_seconds: u64,
    /// One user agent per line; the built-in pool is used when unset
    pub user_agents_file: Option<path::PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationConfig {
    pub project_name: String,
    /// Shown as the connect address, e.g. `connect play.example.net`
    pub connect_hint: String,
    pub icon_url: Option<String>,
    pub website_url: Option<String>,
    pub custom_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: path::PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            server: ServerConfig::default(),
            discord: DiscordConfig::default(),
            sources: SourcesConfig::default(),
            presentation: PresentationConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:30120".into(),
            timeout_seconds: 4,
            update_interval_seconds: 10,
            restart_grace_before_seconds: 6,
            restart_grace_after_seconds: 16,
            max_players_refresh_hours: 6,
        }
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base: "https://discord.com/api/v10".into(),
            status_channel_id: 0,
            history_purge_limit: 100,
            history_scan_limit: 11,
            announcements: None,
            commands: None,
        }
    }
}

impl Default for AnnouncementsConfig {
    fn default() -> Self {
        Self {
            channel_id: 0,
            author_id: 0,
            restarting_phrase: "restarting".into(),
            restart_soon_phrase: "restart in 5 minutes".into(),
            restart_soon_minutes: 5,
            poll_interval_seconds: 5,
        }
    }
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self { channel_id: 0, prefix: "!fivem".into(), poll_interval_seconds: 5 }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            official_url: "https://status.cfx.re/api/v2/status.json".into(),
            official_timeout_seconds: 10,
            community_url: "https://xn--allestrungen-9ib.de/stoerung/fivem/".into(),
            community_selector: "body div#company div.h2.entry-title".into(),
            community_timeout_seconds: 6,
            interval_base_seconds: 28,
            interval_jitter_seconds: 6,
            user_agents_file: None,
        }
    }
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            project_name: "FiveM".into(),
            connect_hint: String::new(),
            icon_url: None,
            website_url: None,
            custom_message: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: path::PathBuf::from("zonewatch.db") }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/zonewatch/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("zonewatch/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };
        let or_unset = |value: &Option<String>| value.clone().unwrap_or_else(|| "<unset>".into());

        let write_title_1 = write_title_indented(1);
        let write_title_2 = write_title_indented(2);
        let write_1 = write_indented(1);
        let write_2 = write_indented(2);

        writeln!(f, "Current Internal Configuration State:")?;
        write_1(f, "Log Level", &self.log_level)?;

        write_title_1(f, "Server")?;
        write_1(f, "Address", &self.server.address)?;
        write_1(f, "Timeout (s)", &self.server.timeout_seconds)?;
        write_1(f, "Update Interval (s)", &self.server.update_interval_seconds)?;
        write_1(
            f,
            "Restart Grace (s)",
            &format!(
                "-{} / +{}",
                self.server.restart_grace_before_seconds, self.server.restart_grace_after_seconds
            ),
        )?;
        write_1(f, "Max Players Refresh (h)", &self.server.max_players_refresh_hours)?;

        write_title_1(f, "Discord")?;
        let token = if self.discord.token.is_empty() { "<unset>" } else { "<redacted>" };
        write_1(f, "Token", &token)?;
        write_1(f, "API Base", &self.discord.api_base)?;
        write_1(f, "Status Channel", &self.discord.status_channel_id)?;
        write_1(f, "History Purge Limit", &self.discord.history_purge_limit)?;
        write_1(f, "History Scan Limit", &self.discord.history_scan_limit)?;
        if let Some(announcements) = &self.discord.announcements {
            write_title_2(f, "Announcements")?;
            write_2(f, "Channel", &announcements.channel_id)?;
            write_2(f, "Author", &announcements.author_id)?;
            write_2(f, "Restarting Phrase", &announcements.restarting_phrase)?;
            write_2(f, "Restart Soon Phrase", &announcements.restart_soon_phrase)?;
            write_2(f, "Restart Soon (min)", &announcements.restart_soon_minutes)?;
            write_2(f, "Poll Interval (s)", &announcements.poll_interval_seconds)?;
        }
        if let Some(commands) = &self.discord.commands {
            write_title_2(f, "Commands")?;
            write_2(f, "Channel", &commands.channel_id)?;
            write_2(f, "Prefix", &commands.prefix)?;
            write_2(f, "Poll Interval (s)", &commands.poll_interval_seconds)?;
        }

        write_title_1(f, "Sources")?;
        write_1(f, "Official", &self.sources.official_url)?;
        write_1(f, "Community", &self.sources.community_url)?;
        write_1(f, "Community Selector", &self.sources.community_selector)?;
        write_1(
            f,
            "Interval (s)",
            &format!(
                "{} + rand(0..={})",
                self.sources.interval_base_seconds, self.sources.interval_jitter_seconds
            ),
        )?;

        write_title_1(f, "Presentation")?;
        write_1(f, "Project", &self.presentation.project_name)?;
        write_1(f, "Connect Hint", &self.presentation.connect_hint)?;
        write_1(f, "Website", &or_unset(&self.presentation.website_url))?;
        write_1(f, "Custom Message", &or_unset(&self.presentation.custom_message))?;

        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path.display())?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/zonewatch/config.toml
    ///  or the specified path, with the name config.toml if one does not exist.
    ///  The path of a freshly written default is returned alongside, so it can
    ///  be reported once logging is up.
    ///
    /// ```rust,ignore
    /// let (cfg, _) = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(
        optional_path: Option<impl AsRef<path::Path>>,
    ) -> Result<(Self, Option<path::PathBuf>), Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let (mut config, created) = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| Error::ReadFailed { path: config_path.clone(), source })?;
            (toml::from_str(raw_string.as_str())?, None)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            (config, Some(config_path))
        };

        config.apply_env(|name| env::var(name).ok())?;
        Ok((config, created))
    }

    /// Override secrets and deployment specifics from the environment
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), Error> {
        if let Some(token) = lookup("ZONEWATCH_DISCORD_TOKEN") {
            self.discord.token = token;
        }
        if let Some(address) = lookup("ZONEWATCH_SERVER_ADDRESS") {
            self.server.address = address;
        }
        if let Some(value) = lookup("ZONEWATCH_STATUS_CHANNEL_ID") {
            self.discord.status_channel_id = value
                .trim()
                .parse()
                .map_err(|_| Error::InvalidEnv { name: "ZONEWATCH_STATUS_CHANNEL_ID", value })?;
        }
        if let Some(path) = lookup("ZONEWATCH_DATABASE_PATH") {
            self.database.path = path.into();
        }
        Ok(())
    }

    /// Reject configurations the service cannot run with
    pub fn validate(&self) -> Result<(), Error> {
        if self.server.address.trim().is_empty() {
            return Err(Error::Invalid("server.address is empty".into()));
        }
        if self.server.timeout_seconds == 0 || self.server.update_interval_seconds == 0 {
            return Err(Error::Invalid("server timeout and interval must be positive".into()));
        }
        if self.discord.token.is_empty() {
            return Err(Error::Invalid(
                "discord.token is empty (set ZONEWATCH_DISCORD_TOKEN)".into(),
            ));
        }
        if self.discord.status_channel_id == 0 {
            return Err(Error::Invalid("discord.status_channel_id is not set".into()));
        }
        if self.discord.history_scan_limit == 0 || self.discord.history_purge_limit == 0 {
            return Err(Error::Invalid("discord history limits must be positive".into()));
        }
        if self.sources.interval_base_seconds == 0 {
            return Err(Error::Invalid("sources.interval_base_seconds must be positive".into()));
        }
        if let Some(announcements) = &self.discord.announcements {
            if announcements.channel_id == 0 || announcements.author_id == 0 {
                return Err(Error::Invalid(
                    "discord.announcements needs channel_id and author_id".into(),
                ));
            }
        }
        if let Some(commands) = &self.discord.commands {
            if commands.channel_id == 0 || commands.prefix.trim().is_empty() {
                return Err(Error::Invalid("discord.commands needs channel_id and prefix".into()));
            }
        }
        Ok(())
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &std::path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| Error::WriteFailed { path: parent.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| Error::WriteFailed { path: path.to_path_buf(), source })
    }
}
