//! Environment passed to spawned processes.
//!
//! A base policy decides what the child starts from; overrides and removals
//! from the run options are applied on top.

use crate::error::ConfigError;
use std::collections::BTreeMap;

/// Base environment for spawned processes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EnvPolicy {
    /// Inherit the parent's environment (default).
    #[default]
    Inherit,

    /// Start from an empty environment.
    Empty,

    /// Start from an empty environment with a UTF-8 C locale.
    ///
    /// Sets: `LANG=C.UTF-8`, `LC_ALL=C.UTF-8`
    LocaleOnly,
}

/// Resolved environment changes for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    policy: EnvPolicy,
    overrides: BTreeMap<String, String>,
    removals: Vec<String>,
}

impl Environment {
    pub(crate) fn new(
        policy: EnvPolicy,
        overrides: BTreeMap<String, String>,
        removals: Vec<String>,
    ) -> Result<Self, ConfigError> {
        for key in overrides.keys().chain(removals.iter()) {
            check_key(key)?;
        }
        for value in overrides.values() {
            if value.contains('\0') {
                return Err(ConfigError::NulByte {
                    what: "environment value",
                    value: value.clone(),
                });
            }
        }
        Ok(Self {
            policy,
            overrides,
            removals,
        })
    }

    pub fn policy(&self) -> &EnvPolicy {
        &self.policy
    }

    pub fn overrides(&self) -> &BTreeMap<String, String> {
        &self.overrides
    }

    pub fn removals(&self) -> &[String] {
        &self.removals
    }

    /// Apply this environment to a command about to be spawned.
    pub(crate) fn apply(&self, cmd: &mut tokio::process::Command) {
        match self.policy {
            EnvPolicy::Inherit => {}
            EnvPolicy::Empty => {
                cmd.env_clear();
            }
            EnvPolicy::LocaleOnly => {
                cmd.env_clear().env("LANG", "C.UTF-8").env("LC_ALL", "C.UTF-8");
            }
        }

        for key in &self.removals {
            cmd.env_remove(key);
        }
        cmd.envs(&self.overrides);
    }
}

/// Reject names the OS cannot represent in an environment block.
fn check_key(key: &str) -> Result<(), ConfigError> {
    let reason = if key.is_empty() {
        "empty name"
    } else if key.contains('=') {
        "contains '='"
    } else if key.contains('\0') {
        "contains a NUL byte"
    } else {
        return Ok(());
    };
    Err(ConfigError::InvalidEnvKey {
        key: key.to_string(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overrides(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_inherits() {
        let env = Environment::default();
        assert_eq!(env.policy(), &EnvPolicy::Inherit);
        assert!(env.overrides().is_empty());
    }

    #[test]
    fn test_valid_overrides_accepted() {
        let env = Environment::new(
            EnvPolicy::Empty,
            overrides(&[("HOME", "/home/user"), ("EMPTY", "")]),
            vec!["PATH".to_string()],
        )
        .unwrap();

        assert_eq!(env.overrides().get("HOME"), Some(&"/home/user".to_string()));
        assert_eq!(env.removals(), ["PATH"]);
    }

    #[test]
    fn test_bad_keys_rejected() {
        for key in ["", "A=B", "NUL\0"] {
            let result = Environment::new(EnvPolicy::Inherit, overrides(&[(key, "x")]), vec![]);
            assert!(
                matches!(result, Err(ConfigError::InvalidEnvKey { .. })),
                "key {:?} should be rejected",
                key
            );
        }

        let result = Environment::new(EnvPolicy::Inherit, BTreeMap::new(), vec!["X=1".to_string()]);
        assert!(matches!(result, Err(ConfigError::InvalidEnvKey { .. })));
    }

    #[test]
    fn test_nul_in_value_rejected() {
        let result = Environment::new(EnvPolicy::Inherit, overrides(&[("KEY", "a\0b")]), vec![]);
        assert!(matches!(
            result,
            Err(ConfigError::NulByte {
                what: "environment value",
                ..
            })
        ));
    }
}
