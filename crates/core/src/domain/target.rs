// Target Domain Model

use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of competitor sites per job
pub const MAX_COMPETITORS: usize = 5;

/// A single URL to be measured (main site or competitor)
///
/// Only absolute `http`/`https` URLs with a host are accepted. The string is
/// kept as the caller wrote it (trimmed) so results echo the input back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Target(String);

impl Target {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::InvalidTarget("target URL is empty".to_string()));
        }

        let url = url::Url::parse(trimmed)
            .map_err(|e| DomainError::InvalidTarget(format!("{}: {}", trimmed, e)))?;

        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(DomainError::InvalidTarget(format!(
                    "{}: unsupported scheme '{}'",
                    trimmed, other
                )))
            }
        }

        if url.host_str().map_or(true, str::is_empty) {
            return Err(DomainError::InvalidTarget(format!(
                "{}: missing host",
                trimmed
            )));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical form used for duplicate detection (`https://A.example` == `https://a.example/`)
    fn canonical(&self) -> String {
        url::Url::parse(&self.0)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| self.0.clone())
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Main target plus ordered competitors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSet {
    pub main: Target,
    pub competitors: Vec<Target>,
}

impl TargetSet {
    /// Validate raw input and build a target set
    ///
    /// Rejects malformed URLs, more than [`MAX_COMPETITORS`] competitors, and
    /// competitors that repeat the main site or each other.
    pub fn parse(main: &str, competitors: &[String]) -> Result<Self> {
        let main = Target::parse(main)?;

        if competitors.len() > MAX_COMPETITORS {
            return Err(DomainError::InvalidTarget(format!(
                "too many competitors: {} (max {})",
                competitors.len(),
                MAX_COMPETITORS
            )));
        }

        let mut seen = vec![main.canonical()];
        let mut parsed = Vec::with_capacity(competitors.len());
        for raw in competitors {
            let target = Target::parse(raw)?;
            let canonical = target.canonical();
            if seen.contains(&canonical) {
                return Err(DomainError::InvalidTarget(format!(
                    "{}: duplicate target",
                    target
                )));
            }
            seen.push(canonical);
            parsed.push(target);
        }

        Ok(Self {
            main,
            competitors: parsed,
        })
    }

    /// All targets in input order, main first
    pub fn all(&self) -> Vec<Target> {
        std::iter::once(self.main.clone())
            .chain(self.competitors.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        1 + self.competitors.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn is_main(&self, target: &Target) -> bool {
        &self.main == target
    }
}
