use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use tm_scheduler::SchedulerConfig;
use tm_types::TargetId;

use crate::error::{SourceError, SourceResult};

/// One traced target as declared in a trace configuration file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    /// Observer host the target is attached to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Firmware image used to resolve symbols.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elf_path: Option<PathBuf>,
    /// Variables whose memory accesses are traced.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub watched_vars: Vec<String>,
}

impl TargetConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
            elf_path: None,
            watched_vars: Vec::new(),
        }
    }

    pub fn id(&self) -> TargetId {
        TargetId::new(self.name.clone())
    }
}

/// A trace session: the set of targets and optional scheduler tuning.
///
/// ```toml
/// [scheduler]
/// eviction_interval = 1000
///
/// [[targets]]
/// name = "node-a"
/// host = "observer-1"
/// watched_vars = ["counter"]
///
/// [[targets]]
/// name = "node-b"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceConfig {
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<SchedulerConfig>,
}

impl TraceConfig {
    /// Load from a `.toml` or `.json` file, chosen by extension.
    pub fn load(path: impl AsRef<Path>) -> SourceResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&text)?,
            Some("json") => Self::from_json(&text)?,
            _ => return Err(SourceError::UnsupportedFormat(path.to_path_buf())),
        };
        debug!(path = %path.display(), targets = config.targets.len(), "trace config loaded");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> SourceResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(text: &str) -> SourceResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject empty target lists, empty names, and duplicate names.
    pub fn validate(&self) -> SourceResult<()> {
        if self.targets.is_empty() {
            return Err(SourceError::NoTargets);
        }
        let mut seen = HashSet::new();
        for target in &self.targets {
            if target.name.trim().is_empty() {
                return Err(SourceError::EmptyTargetName);
            }
            if !seen.insert(target.name.as_str()) {
                return Err(SourceError::DuplicateTarget(target.name.clone()));
            }
        }
        Ok(())
    }

    pub fn target_ids(&self) -> Vec<TargetId> {
        self.targets.iter().map(TargetConfig::id).collect()
    }

    /// Scheduler settings from the file, or the defaults.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        self.scheduler.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TOML: &str = r#"
[scheduler]
eviction_interval = 100

[[targets]]
name = "node-a"
host = "observer-1"
elf_path = "fw/node-a.elf"
watched_vars = ["counter", "state"]

[[targets]]
name = "node-b"
"#;

    #[test]
    fn parses_toml() {
        let config = TraceConfig::from_toml(TOML).unwrap();
        assert_eq!(config.targets.len(), 2);
        let a = &config.targets[0];
        assert_eq!(a.host.as_deref(), Some("observer-1"));
        assert_eq!(a.elf_path, Some(PathBuf::from("fw/node-a.elf")));
        assert_eq!(a.watched_vars, vec!["counter", "state"]);
        assert_eq!(config.targets[1], TargetConfig::new("node-b"));

        let scheduler = config.scheduler_config();
        assert_eq!(scheduler.eviction_interval, 100);
        assert_eq!(scheduler.stall_backoff_ms, SchedulerConfig::default().stall_backoff_ms);
    }

    #[test]
    fn parses_json() {
        let json = r#"{"targets":[{"name":"x"},{"name":"y","watched_vars":["v"]}]}"#;
        let config = TraceConfig::from_json(json).unwrap();
        assert_eq!(config.target_ids(), vec![TargetId::from("x"), TargetId::from("y")]);
        assert_eq!(config.scheduler_config(), SchedulerConfig::default());
    }

    #[test]
    fn rejects_invalid_target_sets() {
        assert!(matches!(TraceConfig::from_toml(""), Err(SourceError::NoTargets)));
        assert!(matches!(
            TraceConfig::from_json(r#"{"targets":[{"name":"a"},{"name":"a"}]}"#),
            Err(SourceError::DuplicateTarget(name)) if name == "a"
        ));
        assert!(matches!(
            TraceConfig::from_json(r#"{"targets":[{"name":" "}]}"#),
            Err(SourceError::EmptyTargetName)
        ));
        assert!(matches!(
            TraceConfig::from_toml("targets = 3"),
            Err(SourceError::Toml(_))
        ));
    }

    #[test]
    fn loads_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("trace.toml");
        std::fs::write(&toml_path, TOML).unwrap();
        assert_eq!(TraceConfig::load(&toml_path).unwrap().targets.len(), 2);

        let json_path = dir.path().join("trace.json");
        let mut file = std::fs::File::create(&json_path).unwrap();
        write!(file, r#"{{"targets":[{{"name":"solo"}}]}}"#).unwrap();
        assert_eq!(TraceConfig::load(&json_path).unwrap().targets[0].name, "solo");

        let yaml_path = dir.path().join("trace.yaml");
        std::fs::write(&yaml_path, "targets: []").unwrap();
        assert!(matches!(
            TraceConfig::load(&yaml_path),
            Err(SourceError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            TraceConfig::load(dir.path().join("absent.toml")),
            Err(SourceError::Io(_))
        ));
    }

    #[test]
    fn serializes_back_to_toml() {
        let config = TraceConfig::from_toml(TOML).unwrap();
        let text = toml::to_string(&config).unwrap();
        assert_eq!(TraceConfig::from_toml(&text).unwrap(), config);
    }
}
