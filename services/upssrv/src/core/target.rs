//! Targets and target resolution
//!
//! Targets come from two places: the comma-separated `--targets` flag and the
//! `targets` list of the configuration file. Both are merged, inline entries
//! first. Empty entries are dropped, duplicates are kept and polled
//! separately.

use serde::{Deserialize, Serialize};

use crate::core::config::deserialize_optional_text;
use crate::core::family::{FamilyRegistry, FamilySelection};
use crate::error::Result;

/// A device to poll
#[derive(Debug, Clone)]
pub struct Target {
    pub address: String,
    pub community: String,
    pub family: FamilySelection,
}

/// A `targets` entry in the configuration file
///
/// Either a bare address or a table with per-target overrides:
///
/// ```yaml
/// targets:
///   - 10.0.0.1
///   - address: 10.0.0.2:1161
///     community: private
///     family: mge
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetConfig {
    Address(String),
    Detailed {
        address: String,
        #[serde(
            default,
            deserialize_with = "deserialize_optional_text",
            skip_serializing_if = "Option::is_none"
        )]
        community: Option<String>,
        #[serde(
            default,
            deserialize_with = "deserialize_optional_text",
            skip_serializing_if = "Option::is_none"
        )]
        family: Option<String>,
    },
}

impl TargetConfig {
    pub fn address(&self) -> &str {
        match self {
            TargetConfig::Address(address) | TargetConfig::Detailed { address, .. } => address,
        }
    }

    pub fn community(&self) -> Option<&str> {
        match self {
            TargetConfig::Address(_) => None,
            TargetConfig::Detailed { community, .. } => community.as_deref(),
        }
    }

    pub fn family(&self) -> Option<&str> {
        match self {
            TargetConfig::Address(_) => None,
            TargetConfig::Detailed { family, .. } => family.as_deref(),
        }
    }
}

/// Process-wide values inherited by targets without overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDefaults {
    pub community: String,
    pub family: String,
}

/// Merge the inline list and the configured list into one target set
///
/// Fails only when a family identifier is unknown.
pub fn resolve_targets(
    inline: &str,
    configured: &[TargetConfig],
    defaults: &TargetDefaults,
    registry: &FamilyRegistry,
) -> Result<Vec<Target>> {
    let default_family = registry.select(&defaults.family)?;
    let mut targets = Vec::new();

    for address in inline.split(',').map(str::trim).filter(|a| !a.is_empty()) {
        targets.push(Target {
            address: address.to_string(),
            community: defaults.community.clone(),
            family: default_family.clone(),
        });
    }

    for entry in configured {
        let address = entry.address().trim();
        if address.is_empty() {
            continue;
        }
        let community = entry
            .community()
            .filter(|c| !c.is_empty())
            .unwrap_or(&defaults.community);
        let family = match entry.family() {
            Some(id) => registry.select(id)?,
            None => default_family.clone(),
        };
        targets.push(Target {
            address: address.to_string(),
            community: community.to_string(),
            family,
        });
    }

    Ok(targets)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::error::UpsSrvError;

    fn defaults() -> TargetDefaults {
        TargetDefaults {
            community: "public".into(),
            family: "xups".into(),
        }
    }

    fn addresses(targets: &[Target]) -> Vec<&str> {
        targets.iter().map(|t| t.address.as_str()).collect()
    }

    #[test]
    fn test_inline_list_skips_empty_entries() {
        let registry = FamilyRegistry::builtin();
        let targets =
            resolve_targets(" 10.0.0.1, ,10.0.0.2,,", &[], &defaults(), &registry).unwrap();
        assert_eq!(addresses(&targets), vec!["10.0.0.1", "10.0.0.2"]);
        assert!(targets.iter().all(|t| t.community == "public"));
        assert!(targets.iter().all(|t| t.family.label() == "xups"));
    }

    #[test]
    fn test_merge_keeps_duplicates_inline_first() {
        let registry = FamilyRegistry::builtin();
        let configured = vec![
            TargetConfig::Address("10.0.0.1".into()),
            TargetConfig::Address("".into()),
            TargetConfig::Address("10.0.0.3".into()),
        ];
        let targets =
            resolve_targets("10.0.0.1,10.0.0.2", &configured, &defaults(), &registry).unwrap();
        assert_eq!(
            addresses(&targets),
            vec!["10.0.0.1", "10.0.0.2", "10.0.0.1", "10.0.0.3"]
        );
    }

    #[test]
    fn test_per_target_overrides() {
        let registry = FamilyRegistry::builtin();
        let configured = vec![
            TargetConfig::Detailed {
                address: "10.0.0.5".into(),
                community: Some("private".into()),
                family: Some("mge".into()),
            },
            TargetConfig::Detailed {
                address: "10.0.0.6".into(),
                community: Some("".into()),
                family: None,
            },
        ];
        let targets = resolve_targets("", &configured, &defaults(), &registry).unwrap();
        assert_eq!(targets[0].community, "private");
        assert_eq!(targets[0].family.label(), "mge");
        assert_eq!(targets[1].community, "public");
        assert_eq!(targets[1].family.label(), "xups");
    }

    #[test]
    fn test_unknown_family_fails_resolution() {
        let registry = FamilyRegistry::builtin();
        let configured = vec![TargetConfig::Detailed {
            address: "10.0.0.5".into(),
            community: None,
            family: Some("apc".into()),
        }];
        let err = resolve_targets("", &configured, &defaults(), &registry).unwrap_err();
        assert_eq!(err, UpsSrvError::UnknownFamily("apc".into()));

        let bad_default = TargetDefaults {
            family: "nope".into(),
            ..defaults()
        };
        assert!(resolve_targets("10.0.0.1", &[], &bad_default, &registry).is_err());
    }

    #[test]
    fn test_target_config_yaml_forms() {
        let yaml = "- 10.0.0.1\n- address: 10.0.0.2\n  family: auto\n";
        let parsed: Vec<TargetConfig> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(parsed[0], TargetConfig::Address("10.0.0.1".into()));
        assert_eq!(parsed[1].address(), "10.0.0.2");
        assert_eq!(parsed[1].family(), Some("auto"));
        assert_eq!(parsed[1].community(), None);
    }
}
