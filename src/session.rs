//! Session state: every decision and failure of a run, plus the persisted
//! snapshot carried between runs

use crate::data::{Action, Decision, ExecutionOutcome};
use crate::error::Result;
use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Keys of the snapshot that are not component names
pub const RESERVED_KEYS: [&str; 2] = ["last_updated", "distro"];

/// Last decision recorded for one component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub action: Action,
    pub rationale: String,
    pub timestamp: DateTime<Utc>,
}

/// Persisted form: one entry per component plus the two reserved keys.
///
/// Keys that do not decode as a component record (written by other tools or
/// older versions) are carried in `extra` and written back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawSnapshot", into = "RawSnapshot")]
pub struct Snapshot {
    pub last_updated: DateTime<Utc>,
    pub distro: String,
    pub components: BTreeMap<String, ComponentRecord>,
    pub extra: BTreeMap<String, Value>,
}

#[derive(Serialize, Deserialize)]
struct RawSnapshot {
    #[serde(default)]
    last_updated: Value,
    #[serde(default)]
    distro: String,
    #[serde(flatten)]
    entries: BTreeMap<String, Value>,
}

impl From<RawSnapshot> for Snapshot {
    fn from(raw: RawSnapshot) -> Self {
        let mut components = BTreeMap::new();
        let mut extra = BTreeMap::new();
        for (key, value) in raw.entries {
            match serde_json::from_value::<ComponentRecord>(value.clone()) {
                Ok(record) => {
                    components.insert(key, record);
                }
                Err(err) => {
                    debug!("Keeping state key '{}' as is: {}", key, err);
                    extra.insert(key, value);
                }
            }
        }
        let last_updated = parse_timestamp(&raw.last_updated).unwrap_or_else(|| {
            warn!("State file has no usable last_updated, treating it as oldest");
            DateTime::<Utc>::MIN_UTC
        });
        Self {
            last_updated,
            distro: raw.distro,
            components,
            extra,
        }
    }
}

impl From<Snapshot> for RawSnapshot {
    fn from(snapshot: Snapshot) -> Self {
        let mut entries = snapshot.extra;
        for (key, record) in snapshot.components {
            match serde_json::to_value(&record) {
                Ok(value) => {
                    entries.insert(key, value);
                }
                Err(err) => warn!("Could not encode state for '{}': {}", key, err),
            }
        }
        Self {
            last_updated: Value::String(
                snapshot
                    .last_updated
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true),
            ),
            distro: snapshot.distro,
            entries,
        }
    }
}

/// RFC 3339, or a naive ISO timestamp taken as UTC
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?;
    if let Ok(stamp) = DateTime::parse_from_rfc3339(text) {
        return Some(stamp.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// In-memory state of one run.
///
/// `decisions` and `failures` only grow. Component records inherited from a
/// previous snapshot are kept until this run decides the same component.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    decisions: Vec<Decision>,
    failures: Vec<ExecutionOutcome>,
    components: BTreeMap<String, ComponentRecord>,
    extra: BTreeMap<String, Value>,
    detected_distro: String,
    last_updated: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a run on top of a previously persisted snapshot
    pub fn load(previous: Option<Snapshot>) -> Self {
        match previous {
            Some(snapshot) => Self {
                components: snapshot.components,
                extra: snapshot.extra,
                detected_distro: snapshot.distro,
                last_updated: Some(snapshot.last_updated),
                ..Self::default()
            },
            None => Self::default(),
        }
    }

    pub fn set_distro(&mut self, distro: &str) {
        self.detected_distro = distro.to_string();
    }

    pub fn record_decision(&mut self, decision: Decision) {
        if RESERVED_KEYS.contains(&decision.component.as_str()) {
            warn!(
                "Component name '{}' collides with a reserved state key and will not be persisted",
                decision.component
            );
        } else {
            self.extra.remove(&decision.component);
            self.components.insert(
                decision.component.clone(),
                ComponentRecord {
                    action: decision.action,
                    rationale: decision.rationale.clone(),
                    timestamp: Utc::now(),
                },
            );
        }
        self.decisions.push(decision);
    }

    /// Append to the failure ledger; successful outcomes are ignored
    pub fn record_failure(&mut self, outcome: ExecutionOutcome) {
        if !outcome.is_success() {
            self.failures.push(outcome);
        }
    }

    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    pub fn failures(&self) -> &[ExecutionOutcome] {
        &self.failures
    }

    pub fn detected_distro(&self) -> &str {
        &self.detected_distro
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    /// Persisted form. The timestamp always moves forward past the one this
    /// state was loaded from, even if the wall clock did not.
    pub fn snapshot(&self) -> Snapshot {
        let mut now = Utc::now();
        if let Some(previous) = self.last_updated {
            if now <= previous {
                now = previous + Duration::microseconds(1);
            }
        }
        Snapshot {
            last_updated: now,
            distro: self.detected_distro.clone(),
            components: self.components.clone(),
            extra: self.extra.clone(),
        }
    }
}

/// Read a snapshot; a missing file is `Ok(None)`
pub fn read_snapshot(path: &Path) -> Result<Option<Snapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read_to_string(path)?;
    let snapshot: Snapshot = serde_json::from_str(&data)?;
    info!(
        "Loaded installation state: {} entries",
        snapshot.components.len()
    );
    Ok(Some(snapshot))
}

/// Move an unreadable state file out of the way so the next write cannot
/// destroy it. Returns where it went.
pub fn set_aside(path: &Path, stamp: &str) -> Result<PathBuf> {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".unreadable-{}", stamp));
    let target = path.with_file_name(name);
    fs::rename(path, &target)?;
    warn!("Moved unreadable installation state to {}", target.display());
    Ok(target)
}

/// Write a snapshot. Under dry-run nothing touches the disk.
pub fn write_snapshot(path: &Path, snapshot: &Snapshot, dry_run: bool) -> Result<bool> {
    if dry_run {
        info!("[DRY RUN] installation state not written");
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_string_pretty(snapshot)?;
    fs::write(path, data)?;
    info!("Installation state saved to {}", path.display());
    Ok(true)
}

/// Write a snapshot, logging instead of failing. True when the file was written.
pub fn save_snapshot(path: &Path, snapshot: &Snapshot, dry_run: bool) -> bool {
    match write_snapshot(path, snapshot, dry_run) {
        Ok(written) => written,
        Err(err) => {
            error!("Could not save installation state to {}: {}", path.display(), err);
            false
        }
    }
}
