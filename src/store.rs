//! Durable schema history
//!
//! Every topic owns one append-only JSON-lines file. Each line records an
//! accepted version exactly once; history is reloaded from these files on
//! open, never recomputed.
//!
//! ```text
//! <data_dir>/
//! ├── persistent_public_default_orders-1f3a9c0e.log
//! ├── persistent_public_schema-testing_schema-test1-77b2d410.log
//! └── strategies.json
//! ```

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::compatibility::CompatibilityStrategy;
use crate::error::{Result, SchemaError};
use crate::fingerprint::Fingerprint;
use crate::schema::SchemaDefinition;
use crate::topic::TopicName;
use crate::version::SchemaVersion;

const LOG_EXTENSION: &str = "log";
const STRATEGIES_FILE: &str = "strategies.json";

/// One line of a topic log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub topic: TopicName,
    pub version: u64,
    pub fingerprint: Fingerprint,
    pub definition: SchemaDefinition,
    pub created_at: DateTime<Utc>,
}

impl LogRecord {
    fn new(topic: &TopicName, version: &SchemaVersion) -> Self {
        Self {
            topic: topic.clone(),
            version: version.version,
            fingerprint: version.fingerprint.clone(),
            definition: version.definition.clone(),
            created_at: version.created_at,
        }
    }

    fn into_version(self) -> SchemaVersion {
        SchemaVersion {
            version: self.version,
            definition: self.definition,
            created_at: self.created_at,
            fingerprint: self.fingerprint,
        }
    }
}

/// Persisted strategy overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategySnapshot {
    /// Topic overrides keyed by full topic name
    #[serde(default)]
    pub topics: BTreeMap<String, CompatibilityStrategy>,
    /// Namespace policies keyed by `tenant/namespace`
    #[serde(default)]
    pub namespaces: BTreeMap<String, CompatibilityStrategy>,
}

/// Append-only on-disk store for topic histories
#[derive(Debug, Clone)]
pub struct LogStore {
    dir: PathBuf,
}

impl LogStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the log file holding `topic`'s history
    pub fn log_path(&self, topic: &TopicName) -> PathBuf {
        let stem = unsafe_chars().replace_all(topic.as_str(), "_");
        let tag = Fingerprint::of_canonical(topic.as_str());
        self.dir
            .join(format!("{}-{}.{}", stem, tag.short(8), LOG_EXTENSION))
    }

    /// Append one accepted version; the line is flushed to disk before returning
    pub fn append(&self, topic: &TopicName, version: &SchemaVersion) -> Result<()> {
        let mut line = serde_json::to_string(&LogRecord::new(topic, version))?;
        line.push('\n');

        let path = self.log_path(topic);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let previous_len = file.metadata()?.len();

        if let Err(e) = file.write_all(line.as_bytes()).and_then(|_| file.sync_data()) {
            // Drop any partial line so the next append starts on a clean boundary
            if let Err(truncate) = file.set_len(previous_len) {
                warn!(path = ?path, error = %truncate, "could not roll back partial schema record");
            }
            return Err(e.into());
        }

        debug!(topic = %topic, version = version.version, path = ?path, "appended schema record");
        Ok(())
    }

    /// Load every topic history, verifying fingerprints and version continuity
    pub fn load(&self) -> Result<Vec<(TopicName, Vec<SchemaVersion>)>> {
        let mut topics = Vec::new();

        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| SchemaError::Io(e.into()))?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some(LOG_EXTENSION)
            {
                continue;
            }
            if let Some(history) = Self::load_log(path)? {
                topics.push(history);
            }
        }

        topics.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(topics)
    }

    fn load_log(path: &Path) -> Result<Option<(TopicName, Vec<SchemaVersion>)>> {
        let corrupt = |reason: String| SchemaError::CorruptLog {
            path: path.to_path_buf(),
            reason,
        };

        let content = fs::read_to_string(path)?;
        let mut topic: Option<TopicName> = None;
        let mut history = Vec::new();
        let mut offset = 0usize;

        for (index, raw) in content.split_inclusive('\n').enumerate() {
            let start = offset;
            offset += raw.len();
            let terminated = raw.ends_with('\n');
            let line = raw.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() {
                continue;
            }

            let record: LogRecord = match serde_json::from_str(line) {
                Ok(record) => record,
                Err(e) if !terminated => {
                    // Crash mid-append: the unterminated tail never became a version
                    warn!(
                        path = ?path,
                        line = index + 1,
                        error = %e,
                        "truncating torn schema record"
                    );
                    OpenOptions::new().write(true).open(path)?.set_len(start as u64)?;
                    break;
                }
                Err(e) => return Err(corrupt(format!("line {}: {}", index + 1, e))),
            };

            match &topic {
                Some(t) if *t != record.topic => {
                    return Err(corrupt(format!(
                        "line {}: record for {} in log of {}",
                        index + 1,
                        record.topic,
                        t
                    )));
                }
                Some(_) => {}
                None => topic = Some(record.topic.clone()),
            }

            if record.version != history.len() as u64 {
                return Err(corrupt(format!(
                    "line {}: expected version {}, found {}",
                    index + 1,
                    history.len(),
                    record.version
                )));
            }

            let version = record.into_version();
            if !version.verify_fingerprint() {
                return Err(corrupt(format!(
                    "line {}: fingerprint mismatch for version {}",
                    index + 1,
                    version.version
                )));
            }
            if !terminated {
                // Complete record missing only its newline
                OpenOptions::new().append(true).open(path)?.write_all(b"\n")?;
            }
            history.push(version);
        }

        Ok(topic.map(|t| (t, history)))
    }

    /// Read the persisted strategy overrides (empty if never saved)
    pub fn load_strategies(&self) -> Result<StrategySnapshot> {
        let path = self.dir.join(STRATEGIES_FILE);
        if !path.exists() {
            return Ok(StrategySnapshot::default());
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Replace the persisted strategy overrides
    pub fn save_strategies(&self, snapshot: &StrategySnapshot) -> Result<()> {
        let path = self.dir.join(STRATEGIES_FILE);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(snapshot)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

fn unsafe_chars() -> &'static Regex {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid file name pattern"))
}
