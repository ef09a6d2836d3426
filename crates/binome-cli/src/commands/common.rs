use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use binome_core::access::visible_zones;
use binome_core::auth::{KvSessionStore, SessionManager};
use binome_core::config::SyncSettings;
use binome_core::gateway::HttpTableGateway;
use binome_core::store::{FieldStore, LocalReplica, SqliteKvStore};
use binome_core::sync::{SyncEngine, SyncScheduler, SyncScope};
use binome_core::util::normalize_text_option;
use binome_core::{Distribution, Session, Zone};
use chrono::Utc;
use serde::Serialize;

use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

pub type Engine = SyncEngine<SqliteKvStore, HttpTableGateway>;

/// Everything a command needs, opened once per invocation.
pub struct Context {
    pub store: FieldStore<SqliteKvStore>,
    pub sessions: SessionManager<KvSessionStore<SqliteKvStore>>,
    pub settings: SyncSettings,
    scheduler: Option<SyncScheduler>,
}

impl Context {
    pub fn open(db_path: &Path, profile: Option<&str>) -> Result<Self, CliError> {
        let settings = load_settings(profile)?;
        let kv = Arc::new(SqliteKvStore::open(db_path)?);
        let store = FieldStore::new(LocalReplica::from_shared(Arc::clone(&kv)));
        let sessions =
            SessionManager::with_ttl(KvSessionStore::new(kv), settings.session_ttl);
        Ok(Self {
            store,
            sessions,
            settings,
            scheduler: None,
        })
    }

    /// The signed-in session, slid forward for this activity.
    pub fn session(&self) -> Result<Session, CliError> {
        match self.sessions.touch() {
            Ok(session) => Ok(session),
            Err(binome_core::Error::NotFound(_) | binome_core::Error::SessionExpired) => {
                Err(CliError::NotSignedIn)
            }
            Err(error) => Err(error.into()),
        }
    }

    pub fn require_admin(session: &Session, action: &'static str) -> Result<(), CliError> {
        if session.is_admin {
            Ok(())
        } else {
            Err(CliError::AdminOnly(action))
        }
    }

    /// Sync engine scoped to what `session` may write.
    pub fn engine(&self, session: &Session) -> Result<Arc<Engine>, CliError> {
        let gateway = self
            .settings
            .build_gateway()?
            .ok_or(CliError::SyncNotConfigured)?;
        let scope = if session.is_admin {
            SyncScope::Everything
        } else {
            SyncScope::Team {
                owner_id: session.user_id.clone(),
            }
        };
        let engine = SyncEngine::new(self.store.replica().clone(), Arc::new(gateway))
            .with_tables(self.settings.tables.clone())
            .with_policy(self.settings.update_policy)
            .with_scope(scope);
        Ok(Arc::new(engine))
    }

    /// Attach a debounced sync to every following mutation.
    pub fn enable_auto_sync(&mut self, session: &Session) -> Result<(), CliError> {
        let engine = self.engine(session)?;
        let scheduler = SyncScheduler::for_engine(engine, self.settings.debounce);
        self.store = self.store.clone().with_scheduler(scheduler.clone());
        self.scheduler = Some(scheduler);
        Ok(())
    }

    /// Wait for the debounced cycle started by the last mutation, if any.
    pub async fn finish(&self) {
        if let Some(scheduler) = &self.scheduler {
            if scheduler.is_pending() || scheduler.is_in_progress() {
                println!("Syncing...");
            }
            scheduler.flush().await;
        }
    }
}

/// Sync settings from the environment, falling back to the profile file.
pub fn load_settings(profile: Option<&str>) -> Result<SyncSettings, CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Profile)?;
    let profile_name = config.resolve_profile_name(profile);
    let profile = config.profile(&profile_name).cloned().unwrap_or_default();
    settings_from_sources(|key| env::var(key).ok(), &profile)
}

pub fn settings_from_sources(
    env_lookup: impl Fn(&str) -> Option<String>,
    profile: &CliProfile,
) -> Result<SyncSettings, CliError> {
    let settings = SyncSettings::from_lookup(|key| {
        normalize_text_option(env_lookup(key)).or_else(|| profile.lookup(key))
    })?;
    Ok(settings)
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("BINOME_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(env::temp_dir)
        .join("binome")
        .join("binome.db")
}

/// Find the one record whose id equals or starts with `query`.
pub fn resolve_by_id_prefix<'a, T>(
    query: &str,
    candidates: &'a [T],
    id_of: impl Fn(&T) -> &str,
    kind: &'static str,
) -> Result<&'a T, CliError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(CliError::InvalidArgument(format!("{kind} id cannot be empty")));
    }

    if let Some(exact) = candidates.iter().find(|candidate| id_of(candidate) == query) {
        return Ok(exact);
    }

    let matches: Vec<&T> = candidates
        .iter()
        .filter(|candidate| id_of(candidate).starts_with(query))
        .collect();
    match matches.as_slice() {
        [] => Err(CliError::NotFound {
            kind,
            query: query.to_string(),
        }),
        [only] => Ok(*only),
        many => {
            let options = many
                .iter()
                .take(5)
                .map(|candidate| id_of(candidate).to_string())
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::Ambiguous(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

/// Resolve a visible zone by exact name, id or id prefix.
pub fn resolve_zone<'a>(
    session: &Session,
    query: &str,
    zones: &'a [Zone],
) -> Result<&'a Zone, CliError> {
    let visible = visible_zones(session, zones);
    let named: Vec<&Zone> = visible
        .iter()
        .copied()
        .filter(|zone| zone.name == query.trim())
        .collect();
    if let [only] = named.as_slice() {
        return Ok(*only);
    }
    resolve_by_id_prefix(query, &visible, |zone| zone.id.as_str(), "zone").copied()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitListItem {
    #[serde(flatten)]
    pub visit: Distribution,
    pub relative_time: String,
}

pub fn visit_to_list_item(visit: &Distribution, now_ms: i64) -> VisitListItem {
    VisitListItem {
        visit: visit.clone(),
        relative_time: format_relative_time(visit.updated_at, now_ms),
    }
}

pub fn format_visit_lines(visits: &[&Distribution]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    visits
        .iter()
        .map(|visit| {
            let short_id = visit.id.as_str().chars().take(13).collect::<String>();
            let address = truncate(&visit.address, 32);
            let relative_time = format_relative_time(visit.updated_at, now_ms);
            let payment = if visit.status.takes_payment() && visit.amount > 0.0 {
                match visit.payment_method {
                    Some(method) => format!("  {:.2} ({method})", visit.amount),
                    None => format!("  {:.2}", visit.amount),
                }
            } else {
                String::new()
            };
            format!(
                "{short_id:<13}  {address:<32}  {:<7}  {relative_time:<8}  {}{payment}",
                visit.status.as_str(),
                visit.owner_id
            )
        })
        .collect()
}

pub fn format_zone_line(zone: &Zone) -> String {
    let short_id = zone.id.as_str().chars().take(13).collect::<String>();
    let shape = match &zone.shape {
        binome_core::Shape::Circle { radius_meters, .. } => format!("circle {radius_meters:.0}m"),
        binome_core::Shape::Polygon { vertices } => format!("polygon {} pts", vertices.len()),
        binome_core::Shape::Rectangle { .. } => "rectangle".to_string(),
    };
    let team = zone.owner_team_id.as_deref().unwrap_or("-");
    format!(
        "{short_id:<13}  {:<20}  {shape:<16}  {:<8}  {team}",
        truncate(&zone.name, 20),
        zone.color
    )
}

pub fn truncate(value: &str, max_chars: usize) -> String {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}
