use tm_scheduler::Target;
use tm_types::TargetId;

use crate::config::TraceConfig;
use crate::error::{SourceError, SourceResult};

/// Supplies the fixed set of targets a scheduler runs over.
///
/// Every returned target's vector clock covers all returned ids.
pub trait TargetProvider: Send + Sync {
    fn targets(&self) -> SourceResult<Vec<Target>>;
}

/// Targets with explicitly given names.
#[derive(Clone, Debug)]
pub struct StaticTargetProvider {
    ids: Vec<TargetId>,
}

impl StaticTargetProvider {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TargetId>,
    {
        Self {
            ids: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl TargetProvider for StaticTargetProvider {
    fn targets(&self) -> SourceResult<Vec<Target>> {
        if self.ids.is_empty() {
            return Err(SourceError::NoTargets);
        }
        Ok(Target::group(self.ids.iter().cloned()))
    }
}

/// `count` targets named `"0"` to `"count - 1"`.
#[derive(Clone, Copy, Debug)]
pub struct SimulationTargetProvider {
    count: usize,
}

impl SimulationTargetProvider {
    pub fn new(count: usize) -> Self {
        Self { count }
    }

    pub fn ids(&self) -> Vec<TargetId> {
        (0..self.count).map(|i| TargetId::new(i.to_string())).collect()
    }
}

impl TargetProvider for SimulationTargetProvider {
    fn targets(&self) -> SourceResult<Vec<Target>> {
        if self.count < 2 {
            return Err(SourceError::TooFewTargets(self.count));
        }
        Ok(Target::group(self.ids()))
    }
}

/// Targets declared in a [`TraceConfig`]. Hosts from the file are attached
/// to the targets' metadata.
#[derive(Clone, Debug)]
pub struct ConfigTargetProvider {
    config: TraceConfig,
}

impl ConfigTargetProvider {
    pub fn new(config: TraceConfig) -> SourceResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }
}

impl TargetProvider for ConfigTargetProvider {
    fn targets(&self) -> SourceResult<Vec<Target>> {
        let targets = Target::group(self.config.target_ids());
        for (target, declared) in targets.iter().zip(&self.config.targets) {
            if let Some(host) = &declared.host {
                target.handle().set_host(host.clone());
            }
        }
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetConfig;

    #[test]
    fn static_provider_keeps_names() {
        let targets = StaticTargetProvider::new(["a", "b"]).targets().unwrap();
        let names: Vec<_> = targets.iter().map(|t| t.id().as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(targets[0].clock().to_string(), "{a=0, b=0}");
    }

    #[test]
    fn static_provider_rejects_empty() {
        let provider = StaticTargetProvider::new(Vec::<String>::new());
        assert!(matches!(provider.targets(), Err(SourceError::NoTargets)));
    }

    #[test]
    fn simulation_provider_names_by_index() {
        let targets = SimulationTargetProvider::new(3).targets().unwrap();
        let names: Vec<_> = targets.iter().map(|t| t.id().to_string()).collect();
        assert_eq!(names, vec!["0", "1", "2"]);
        for target in &targets {
            assert_eq!(target.clock().len(), 3);
        }
        assert!(matches!(
            SimulationTargetProvider::new(1).targets(),
            Err(SourceError::TooFewTargets(1))
        ));
    }

    #[test]
    fn config_provider_attaches_hosts() {
        let mut a = TargetConfig::new("a");
        a.host = Some("observer-1".into());
        let config = TraceConfig {
            targets: vec![a, TargetConfig::new("b")],
            scheduler: None,
        };
        let targets = ConfigTargetProvider::new(config).unwrap().targets().unwrap();
        assert_eq!(targets[0].host().as_deref(), Some("observer-1"));
        assert!(targets[1].host().is_none());
    }

    #[test]
    fn config_provider_validates() {
        assert!(matches!(
            ConfigTargetProvider::new(TraceConfig::default()),
            Err(SourceError::NoTargets)
        ));
    }
}
