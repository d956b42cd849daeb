use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Result};

/// What the server knows about one supervised process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessConfig {
    pub name: String,
    pub stdout_logfile: Option<PathBuf>,
}

impl ProcessConfig {
    pub fn new(name: impl Into<String>, stdout_logfile: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            stdout_logfile,
        }
    }

    /// Parses `NAME` or `NAME=PATH`. An empty path counts as unset.
    pub fn parse(spec: &str) -> Result<Self> {
        let (name, path) = match spec.split_once('=') {
            Some((name, path)) => (name.trim(), path.trim()),
            None => (spec.trim(), ""),
        };
        if name.is_empty() {
            bail!("process spec {spec:?} has no name");
        }
        let logfile = (!path.is_empty()).then(|| PathBuf::from(path));
        Ok(Self::new(name, logfile))
    }
}

/// Read-only lookup of processes by name, shared by all requests.
pub trait ProcessRegistry: Send + Sync {
    fn get(&self, name: &str) -> Option<&ProcessConfig>;
}

/// Registry fixed at startup.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    processes: HashMap<String, ProcessConfig>,
}

impl StaticRegistry {
    pub fn new(processes: impl IntoIterator<Item = ProcessConfig>) -> Self {
        Self {
            processes: processes.into_iter().map(|p| (p.name.clone(), p)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }
}

impl ProcessRegistry for StaticRegistry {
    fn get(&self, name: &str) -> Option<&ProcessConfig> {
        self.processes.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_and_path() {
        let p = ProcessConfig::parse("web=/var/log/web.log").unwrap();
        assert_eq!(p.name, "web");
        assert_eq!(p.stdout_logfile, Some(PathBuf::from("/var/log/web.log")));
    }

    #[test]
    fn bare_name_has_no_logfile() {
        assert_eq!(ProcessConfig::parse("worker").unwrap().stdout_logfile, None);
        assert_eq!(ProcessConfig::parse("worker=").unwrap().stdout_logfile, None);
    }

    #[test]
    fn rejects_missing_name() {
        assert!(ProcessConfig::parse("=/tmp/x.log").is_err());
    }

    #[test]
    fn lookup_by_name() {
        let reg = StaticRegistry::new([ProcessConfig::new("a", None)]);
        assert!(reg.get("a").is_some());
        assert!(reg.get("b").is_none());
        assert_eq!(reg.len(), 1);
        assert!(!reg.is_empty());
        assert!(StaticRegistry::new(Vec::new()).is_empty());
    }
}
