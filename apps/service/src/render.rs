//! Turns a status snapshot into the Discord embed shown in the status channel.

use chrono::{DateTime, Utc};

use crate::clock::{Interval, format_duration};
use crate::config::PresentationConfig;
use crate::discord::Embed;
use crate::discord::embed::{EmbedAuthor, EmbedFooter};
use crate::monitoring::indicator::{Indicator, NO_DATA};
use crate::monitoring::state::ServerStatus;
use crate::monitoring::types::ServerState;

const COLOR_ONLINE: u32 = 0x74EE15;
const COLOR_RESTARTING: u32 = 0xFFAC00;
const COLOR_DOWN: u32 = 0xFF0000;
const COLOR_ERROR: u32 = 0xFF6600;

const FIVEM_ICON_URL: &str = "https://fivem.net/favicon.png";

/// Zero-width space, keeps Discord from collapsing blank lines
const SPACER: &str = "\u{200b}";

/// Everything the status message shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub state: ServerState,
    pub players: u32,
    pub max_players: u32,
    pub uptime_seconds: u64,
    pub downtime_seconds: u64,
    pub next_restart_at: Option<DateTime<Utc>>,
    pub custom_message: Option<String>,
    pub official_status: String,
    pub community_status: String,
    /// Probe timeout shown when the server does not answer; 0 hides it
    pub probe_timeout_seconds: u64,
}

impl Snapshot {
    pub fn capture(
        status: &ServerStatus,
        max_players: u32,
        custom_message: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            state: status.state(),
            players: status.players(),
            max_players,
            uptime_seconds: status.uptime_seconds(now),
            downtime_seconds: status.downtime_seconds(now),
            next_restart_at: status.next_restart_at(),
            custom_message,
            official_status: NO_DATA.into(),
            community_status: NO_DATA.into(),
            probe_timeout_seconds: 0,
        }
    }

    pub fn with_auxiliary(mut self, official: Option<String>, community: Option<String>) -> Self {
        self.official_status = official.unwrap_or_else(|| NO_DATA.into());
        self.community_status = community.unwrap_or_else(|| NO_DATA.into());
        self
    }

    pub fn with_probe_timeout(mut self, seconds: u64) -> Self {
        self.probe_timeout_seconds = seconds;
        self
    }
}

pub fn render(snapshot: &Snapshot, presentation: &PresentationConfig, now: DateTime<Utc>) -> Embed {
    let project = &presentation.project_name;
    let mut embed = template(presentation, now);

    match snapshot.state {
        ServerState::Online => {
            embed.title = Some(format!("**{project}** is currently **Online!** :white_check_mark:"));
            embed.color = Some(COLOR_ONLINE);
            embed = embed.field(
                "**Players:**",
                format!("`{} / {}`", snapshot.players, snapshot.max_players),
                false,
            );
            if snapshot.uptime_seconds > Interval::Minute.seconds() {
                embed = embed.field(
                    "**Uptime:**",
                    format!("`{}`", format_duration(snapshot.uptime_seconds)),
                    false,
                );
            }
            if let Some(warning) = restart_warning(project, snapshot.next_restart_at, now) {
                embed.append_description(&warning);
            }
        }
        ServerState::Restarting => {
            embed.title = Some(format!("**{project}** is restarting!"));
            embed.color = Some(COLOR_RESTARTING);
        }
        ServerState::Offline => {
            embed.title = Some(format!("**{project}** is currently **Offline!** :no_entry:"));
            embed.color = Some(COLOR_DOWN);
            embed = downtime_field(embed, snapshot);
        }
        ServerState::NotReachable => {
            embed.title = Some(format!("**{project}** is currently **Not reachable!** :no_entry:"));
            embed.color = Some(COLOR_DOWN);
            if snapshot.probe_timeout_seconds > 0 {
                embed.append_description(&format!(
                    "```no answer within {}s```\n{SPACER}",
                    snapshot.probe_timeout_seconds
                ));
            }
            embed = downtime_field(embed, snapshot);
        }
        ServerState::Error => {
            embed.title =
                Some(format!("**{project}** is answering with **invalid data!** :warning:"));
            embed.color = Some(COLOR_ERROR);
            embed = downtime_field(embed, snapshot);
        }
        ServerState::Unknown => {
            embed.title = Some(format!("**{project}** is currently **Unknown!** :black_circle:"));
        }
    }

    if let Some(message) = snapshot.custom_message.as_deref().filter(|m| !m.trim().is_empty()) {
        embed.append_description(&format!("{message}\n{SPACER}"));
    }

    auxiliary_fields(embed, &snapshot.official_status, &snapshot.community_status)
}

/// Reply to a status request: just the two third-party statuses
pub fn render_fivem_status(
    official: Option<&str>,
    community: Option<&str>,
    presentation: &PresentationConfig,
    now: DateTime<Utc>,
) -> Embed {
    let embed = Embed {
        author: Some(EmbedAuthor {
            name: "FiveM Status".into(),
            url: None,
            icon_url: Some(FIVEM_ICON_URL.into()),
        }),
        footer: Some(EmbedFooter {
            text: presentation.project_name.clone(),
            icon_url: presentation.icon_url.clone(),
        }),
        timestamp: Some(now.to_rfc3339()),
        ..Default::default()
    };
    auxiliary_fields(embed, official.unwrap_or(NO_DATA), community.unwrap_or(NO_DATA))
}

fn auxiliary_fields(embed: Embed, official: &str, community: &str) -> Embed {
    embed
        .field(SPACER, auxiliary_value("Cfx.re status", official), true)
        .field(SPACER, auxiliary_value("User reports", community), true)
}

fn template(presentation: &PresentationConfig, now: DateTime<Utc>) -> Embed {
    let mut embed = Embed {
        author: Some(EmbedAuthor {
            name: format!("{} Server Status", presentation.project_name),
            url: presentation.website_url.clone(),
            icon_url: presentation.icon_url.clone(),
        }),
        footer: Some(EmbedFooter {
            text: "Last updated".into(),
            icon_url: presentation.icon_url.clone(),
        }),
        timestamp: Some(now.to_rfc3339()),
        ..Default::default()
    };
    if !presentation.connect_hint.is_empty() {
        embed = embed.field("**Connect:**", format!("`{}`", presentation.connect_hint), false);
    }
    embed
}

fn downtime_field(embed: Embed, snapshot: &Snapshot) -> Embed {
    if snapshot.downtime_seconds > Interval::Minute.seconds() {
        embed.field("**Downtime:**", format!("`{}`", format_duration(snapshot.downtime_seconds)), false)
    } else {
        embed
    }
}

/// Warning for an upcoming restart, counted in started minutes
fn restart_warning(
    project: &str,
    next_restart_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<String> {
    let at = next_restart_at.filter(|at| *at > now)?;
    let minutes = (at - now).num_seconds() / Interval::Minute.seconds() as i64 + 1;
    Some(if minutes <= 1 {
        format!(":warning: {project} restarts shortly!\n{SPACER}")
    } else {
        format!(":warning: {project} restarts in {minutes} minutes!\n{SPACER}")
    })
}

fn auxiliary_value(label: &str, text: &str) -> String {
    let indicator = Indicator::classify(text);
    format!("**{label}**\n{} {}\n{SPACER}", indicator.emoji(), text.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn presentation() -> PresentationConfig {
        PresentationConfig {
            project_name: "Harbor RP".into(),
            connect_hint: "connect play.harbor.gg".into(),
            ..Default::default()
        }
    }

    fn snapshot(state: ServerState) -> Snapshot {
        Snapshot {
            state,
            players: 12,
            max_players: 64,
            uptime_seconds: 0,
            downtime_seconds: 0,
            next_restart_at: None,
            custom_message: None,
            official_status: "All Systems Operational".into(),
            community_status: "no connection".into(),
            probe_timeout_seconds: 4,
        }
    }

    fn field<'a>(embed: &'a Embed, name: &str) -> Option<&'a str> {
        embed.fields.iter().find(|f| f.name == name).map(|f| f.value.as_str())
    }

    #[test]
    fn test_online_shows_players_and_uptime() {
        let mut online = snapshot(ServerState::Online);
        online.uptime_seconds = 3 * 3600 + 5 * 60;

        let embed = render(&online, &presentation(), now());
        assert_eq!(embed.color, Some(COLOR_ONLINE));
        assert!(embed.title.as_deref().unwrap().contains("Online"));
        assert_eq!(field(&embed, "**Players:**"), Some("`12 / 64`"));
        assert_eq!(field(&embed, "**Uptime:**"), Some("`3 hours, 5 minutes`"));
        assert_eq!(field(&embed, "**Connect:**"), Some("`connect play.harbor.gg`"));
        assert_eq!(embed.description, None);
    }

    #[test]
    fn test_short_uptime_hidden() {
        let mut online = snapshot(ServerState::Online);
        online.uptime_seconds = 60;
        assert_eq!(field(&render(&online, &presentation(), now()), "**Uptime:**"), None);
    }

    #[test]
    fn test_restart_warning() {
        let mut online = snapshot(ServerState::Online);
        online.next_restart_at = Some(now() + Duration::seconds(4 * 60 + 30));
        let description = render(&online, &presentation(), now()).description.unwrap();
        assert!(description.contains("restarts in 5 minutes"), "{description}");

        online.next_restart_at = Some(now() + Duration::seconds(40));
        let description = render(&online, &presentation(), now()).description.unwrap();
        assert!(description.contains("restarts shortly"), "{description}");

        online.next_restart_at = Some(now() - Duration::seconds(1));
        assert_eq!(render(&online, &presentation(), now()).description, None);
    }

    #[test]
    fn test_down_states_show_downtime() {
        for state in [ServerState::Offline, ServerState::NotReachable, ServerState::Error] {
            let mut down = snapshot(state);
            down.downtime_seconds = 86_400 + 60;
            let embed = render(&down, &presentation(), now());
            assert_eq!(field(&embed, "**Downtime:**"), Some("`1 day, 1 minute`"), "{state}");
            assert_eq!(field(&embed, "**Players:**"), None);
        }
    }

    #[test]
    fn test_restarting_and_unknown() {
        let restarting = render(&snapshot(ServerState::Restarting), &presentation(), now());
        assert_eq!(restarting.color, Some(COLOR_RESTARTING));
        assert!(restarting.title.unwrap().contains("restarting"));

        let unknown = render(&snapshot(ServerState::Unknown), &presentation(), now());
        assert_eq!(unknown.color, None);
        assert!(unknown.title.unwrap().contains("Unknown"));
    }

    #[test]
    fn test_custom_message_appended_after_warning() {
        let mut online = snapshot(ServerState::Online);
        online.next_restart_at = Some(now() + Duration::minutes(10));
        online.custom_message = Some("Event tonight at 8".into());

        let description = render(&online, &presentation(), now()).description.unwrap();
        let warning = description.find("restarts in").unwrap();
        let message = description.find("Event tonight").unwrap();
        assert!(warning < message);
    }

    #[test]
    fn test_auxiliary_fields_carry_indicators() {
        let embed = render(&snapshot(ServerState::Online), &presentation(), now());
        let auxiliary: Vec<_> = embed.fields.iter().filter(|f| f.inline).collect();
        assert_eq!(auxiliary.len(), 2);
        assert!(auxiliary[0].value.contains(":green_circle: All Systems Operational"));
        assert!(auxiliary[1].value.contains(":grey_question: no connection"));
    }

    #[test]
    fn test_snapshot_defaults_missing_auxiliary_to_no_data() {
        let status = ServerStatus::default();
        let snapshot = Snapshot::capture(&status, 64, None, now())
            .with_auxiliary(Some("All Systems Operational".into()), None);
        assert_eq!(snapshot.state, ServerState::Unknown);
        assert_eq!(snapshot.community_status, NO_DATA);
        assert_eq!(snapshot.uptime_seconds, 0);
    }

    #[test]
    fn test_not_reachable_shows_probe_timeout() {
        let embed = render(&snapshot(ServerState::NotReachable), &presentation(), now());
        assert_eq!(embed.description.as_deref(), Some("```no answer within 4s```\n\u{200b}"));

        let mut no_hint = snapshot(ServerState::NotReachable);
        no_hint.probe_timeout_seconds = 0;
        assert_eq!(render(&no_hint, &presentation(), now()).description, None);

        let offline = render(&snapshot(ServerState::Offline), &presentation(), now());
        assert_eq!(offline.description, None);
    }

    #[test]
    fn test_fivem_status_reply() {
        let embed = render_fivem_status(Some("Minor Service Outage"), None, &presentation(), now());
        assert_eq!(embed.author.unwrap().name, "FiveM Status");
        assert_eq!(embed.footer.unwrap().text, "Harbor RP");
        assert_eq!(embed.title, None);
        assert_eq!(embed.fields.len(), 2);
        assert!(embed.fields.iter().all(|f| f.inline));
        assert!(embed.fields[0].value.contains(":orange_circle: Minor Service Outage"));
        assert!(embed.fields[1].value.contains(":grey_question: no data"));
    }
}
