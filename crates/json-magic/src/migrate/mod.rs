//! Versioned data migrations.
//!
//! A [`Migrator`] holds a contiguous chain of [`MigrationStep`]s. Data comes
//! in as a [`PersistedState`]; when it carries no version marker the version
//! is inferred from ordered shape [`Fingerprint`]s. Steps then run one after
//! another until the target version is reached. A failing step aborts the
//! whole run; no intermediate version is ever returned.
//!
//! ```
//! use json_magic::migrate::{MigrationStep, Migrator, PersistedState, Version};
//! use serde_json::json;
//!
//! let migrator = Migrator::new()
//!     .register(MigrationStep::new(Version::new(1, 0, 0), Version::new(2, 0, 0), |mut data| {
//!         let old = data["old"].take();
//!         data["renamed"] = old;
//!         Ok(data)
//!     }))
//!     .unwrap();
//!
//! let state = PersistedState::new(Some(Version::new(1, 0, 0)), json!({"old": 1}));
//! let migrated = migrator.migrate(state).unwrap();
//! assert_eq!(migrated.version, Some(Version::new(2, 0, 0)));
//! assert_eq!(migrated.data["renamed"], json!(1));
//! ```

pub mod builtin;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MigrationError {
    #[error("migration step must move forward: {from} -> {to}")]
    InvalidStep { from: Version, to: Version },
    #[error("migration step from {found} does not continue from {expected}")]
    Gap { expected: Version, found: Version },
    #[error("unknown data version {version}")]
    UnknownVersion { version: Version },
    #[error("migration {from} -> {to} failed: {reason}")]
    Step { from: Version, to: Version, reason: String },
    #[error("invalid version: {value}")]
    InvalidVersion { value: String },
}

// ── Version ────────────────────────────────────────────────────────────

/// A `major.minor.patch` data version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = MigrationError;

    /// Parses `1.2.3`, with an optional leading `v`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MigrationError::InvalidVersion { value: s.to_string() };
        let trimmed = s.strip_prefix('v').unwrap_or(s);
        let parts = trimmed
            .split('.')
            .map(|part| part.parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;
        match parts.as_slice() {
            [major, minor, patch] => Ok(Version::new(*major, *minor, *patch)),
            _ => Err(invalid()),
        }
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ── Steps and fingerprints ─────────────────────────────────────────────

/// Error type returned by a step function.
pub type StepError = Box<dyn std::error::Error + Send + Sync>;

type StepFn = Box<dyn Fn(Value) -> Result<Value, StepError> + Send + Sync>;

/// Transforms data of version `from` into data of version `to`.
pub struct MigrationStep {
    from: Version,
    to: Version,
    run: StepFn,
}

impl MigrationStep {
    pub fn new<F>(from: Version, to: Version, run: F) -> Self
    where
        F: Fn(Value) -> Result<Value, StepError> + Send + Sync + 'static,
    {
        Self {
            from,
            to,
            run: Box::new(run),
        }
    }

    pub fn from(&self) -> Version {
        self.from
    }

    pub fn to(&self) -> Version {
        self.to
    }
}

impl fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationStep")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish_non_exhaustive()
    }
}

/// A shape predicate identifying data of `version`.
#[derive(Clone, Copy)]
pub struct Fingerprint {
    pub version: Version,
    pub name: &'static str,
    pub matches: fn(&Value) -> bool,
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fingerprint")
            .field("version", &self.version)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Data together with its stored version marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub version: Option<Version>,
    pub data: Value,
}

impl PersistedState {
    pub fn new(version: Option<Version>, data: Value) -> Self {
        Self { version, data }
    }

    /// State without a version marker.
    pub fn unversioned(data: Value) -> Self {
        Self { version: None, data }
    }
}

// ── Migrator ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Migrator {
    steps: Vec<MigrationStep>,
    fingerprints: Vec<Fingerprint>,
}

impl Migrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a step. Each step must move forward and start where the
    /// previous one ended.
    pub fn register(mut self, step: MigrationStep) -> Result<Self, MigrationError> {
        if step.from >= step.to {
            return Err(MigrationError::InvalidStep {
                from: step.from,
                to: step.to,
            });
        }
        if let Some(last) = self.steps.last() {
            if last.to != step.from {
                return Err(MigrationError::Gap {
                    expected: last.to,
                    found: step.from,
                });
            }
        }
        self.steps.push(step);
        Ok(self)
    }

    pub fn with_fingerprint(mut self, fingerprint: Fingerprint) -> Self {
        self.fingerprints.push(fingerprint);
        self.fingerprints.sort_by_key(|fp| fp.version);
        self
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    /// The version data starts from when nothing else is known.
    pub fn earliest(&self) -> Version {
        self.steps.first().map(|step| step.from).unwrap_or_default()
    }

    pub fn latest(&self) -> Version {
        self.steps.last().map(|step| step.to).unwrap_or_default()
    }

    fn is_known(&self, version: Version) -> bool {
        version == self.earliest() || self.steps.iter().any(|step| step.to == version)
    }

    /// The stored marker if present, otherwise the oldest version whose
    /// fingerprint matches, otherwise the earliest known version.
    pub fn detect_version(&self, state: &PersistedState) -> Version {
        if let Some(version) = state.version {
            return version;
        }
        if let Some(fp) = self.fingerprints.iter().find(|fp| (fp.matches)(&state.data)) {
            info!(version = %fp.version, fingerprint = fp.name, "Detected data version");
            return fp.version;
        }
        let fallback = self.earliest();
        warn!(version = %fallback, "No version marker or matching shape, assuming earliest version");
        fallback
    }

    /// Migrates to the latest registered version.
    pub fn migrate(&self, state: PersistedState) -> Result<PersistedState, MigrationError> {
        self.migrate_to(state, self.latest())
    }

    /// Migrates up to `target`, which must be a registered version not older
    /// than the data.
    pub fn migrate_to(&self, state: PersistedState, target: Version) -> Result<PersistedState, MigrationError> {
        let mut version = self.detect_version(&state);
        if !self.is_known(version) {
            return Err(MigrationError::UnknownVersion { version });
        }
        if !self.is_known(target) || target < version {
            return Err(MigrationError::UnknownVersion { version: target });
        }

        let start = version;
        let mut data = state.data;
        for step in self.steps.iter().skip_while(move |step| step.from != start) {
            if version == target {
                break;
            }
            info!(from = %step.from, to = %step.to, "Migrating data");
            data = (step.run)(data).map_err(|err| MigrationError::Step {
                from: step.from,
                to: step.to,
                reason: err.to_string(),
            })?;
            version = step.to;
        }

        Ok(PersistedState {
            version: Some(version),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    fn append(tag: &'static str) -> impl Fn(Value) -> Result<Value, StepError> {
        move |mut data| {
            data["log"].as_array_mut().ok_or("log missing")?.push(json!(tag));
            Ok(data)
        }
    }

    fn chain() -> Migrator {
        Migrator::new()
            .register(MigrationStep::new(v("1.0.0"), v("2.0.0"), append("a")))
            .unwrap()
            .register(MigrationStep::new(v("2.0.0"), v("3.0.0"), append("b")))
            .unwrap()
    }

    #[test]
    fn test_version_parse() {
        assert_eq!(v("2.1.0"), Version::new(2, 1, 0));
        assert_eq!(v("v0.0.1"), Version::new(0, 0, 1));
        assert!("2.1".parse::<Version>().is_err());
        assert!("a.b.c".parse::<Version>().is_err());
        assert!(v("2.10.0") > v("2.9.0"));
        assert_eq!(v("2.1.0").to_string(), "2.1.0");
    }

    #[test]
    fn test_version_serde() {
        let state: PersistedState = serde_json::from_value(json!({"version": "2.2.0", "data": {}})).unwrap();
        assert_eq!(state.version, Some(Version::new(2, 2, 0)));
        assert_eq!(serde_json::to_value(&state).unwrap()["version"], json!("2.2.0"));
        let unversioned: PersistedState = serde_json::from_value(json!({"data": []})).unwrap();
        assert_eq!(unversioned.version, None);
    }

    #[test]
    fn test_register_validation() {
        let backwards = Migrator::new().register(MigrationStep::new(v("2.0.0"), v("1.0.0"), Ok));
        assert!(matches!(backwards, Err(MigrationError::InvalidStep { .. })));

        let gap = Migrator::new()
            .register(MigrationStep::new(v("1.0.0"), v("2.0.0"), Ok))
            .unwrap()
            .register(MigrationStep::new(v("3.0.0"), v("4.0.0"), Ok));
        assert_eq!(
            gap.err(),
            Some(MigrationError::Gap {
                expected: v("2.0.0"),
                found: v("3.0.0"),
            })
        );
    }

    #[test]
    fn test_runs_steps_in_order() {
        let migrated = chain()
            .migrate(PersistedState::new(Some(v("1.0.0")), json!({"log": []})))
            .unwrap();
        assert_eq!(migrated.version, Some(v("3.0.0")));
        assert_eq!(migrated.data, json!({"log": ["a", "b"]}));
    }

    #[test]
    fn test_starts_from_marker() {
        let migrated = chain()
            .migrate(PersistedState::new(Some(v("2.0.0")), json!({"log": []})))
            .unwrap();
        assert_eq!(migrated.data, json!({"log": ["b"]}));

        let current = chain()
            .migrate(PersistedState::new(Some(v("3.0.0")), json!({"log": []})))
            .unwrap();
        assert_eq!(current.data, json!({"log": []}));
    }

    #[test]
    fn test_migrate_to_intermediate() {
        let migrated = chain()
            .migrate_to(PersistedState::new(Some(v("1.0.0")), json!({"log": []})), v("2.0.0"))
            .unwrap();
        assert_eq!(migrated.version, Some(v("2.0.0")));
        assert_eq!(migrated.data, json!({"log": ["a"]}));
    }

    #[test]
    fn test_runs_a_slice_of_the_chain() {
        let migrator = chain()
            .register(MigrationStep::new(v("3.0.0"), v("4.0.0"), append("c")))
            .unwrap()
            .register(MigrationStep::new(v("4.0.0"), v("5.0.0"), append("d")))
            .unwrap();
        let migrated = migrator
            .migrate_to(PersistedState::new(Some(v("2.0.0")), json!({"log": []})), v("4.0.0"))
            .unwrap();
        assert_eq!(migrated.version, Some(v("4.0.0")));
        assert_eq!(migrated.data, json!({"log": ["b", "c"]}));
    }

    #[test]
    fn test_composition_matches_manual_steps() {
        let migrator = chain();
        let input = json!({"log": ["start"]});
        let direct = migrator
            .migrate(PersistedState::new(Some(v("1.0.0")), input.clone()))
            .unwrap();
        let first = migrator
            .migrate_to(PersistedState::new(Some(v("1.0.0")), input), v("2.0.0"))
            .unwrap();
        let second = migrator.migrate(first).unwrap();
        assert_eq!(direct, second);
    }

    #[test]
    fn test_unknown_versions() {
        let err = chain()
            .migrate(PersistedState::new(Some(v("1.5.0")), json!({"log": []})))
            .unwrap_err();
        assert_eq!(err, MigrationError::UnknownVersion { version: v("1.5.0") });

        let err = chain()
            .migrate_to(PersistedState::new(Some(v("2.0.0")), json!({"log": []})), v("1.0.0"))
            .unwrap_err();
        assert_eq!(err, MigrationError::UnknownVersion { version: v("1.0.0") });
    }

    #[test]
    fn test_failing_step_aborts() {
        let err = chain()
            .migrate(PersistedState::new(Some(v("1.0.0")), json!({})))
            .unwrap_err();
        assert_eq!(
            err,
            MigrationError::Step {
                from: v("1.0.0"),
                to: v("2.0.0"),
                reason: "log missing".into(),
            }
        );
    }

    #[test]
    fn test_fingerprint_detection() {
        let migrator = chain()
            .with_fingerprint(Fingerprint {
                version: v("2.0.0"),
                name: "has log",
                matches: |data| data.get("log").is_some(),
            })
            .with_fingerprint(Fingerprint {
                version: v("1.0.0"),
                name: "has legacy",
                matches: |data| data.get("legacy").is_some(),
            });

        let both = PersistedState::unversioned(json!({"log": [], "legacy": true}));
        assert_eq!(migrator.detect_version(&both), v("1.0.0"));

        let newer = PersistedState::unversioned(json!({"log": []}));
        assert_eq!(migrator.detect_version(&newer), v("2.0.0"));

        let unknown = PersistedState::unversioned(json!({}));
        assert_eq!(migrator.detect_version(&unknown), v("1.0.0"));

        let marked = PersistedState::new(Some(v("3.0.0")), json!({"legacy": true}));
        assert_eq!(migrator.detect_version(&marked), v("3.0.0"));
    }
}
