use std::{net::SocketAddr, path::Path, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    election::{
        NamePreference, Preference, PreferredSingletonElectionPolicy,
        SimpleSingletonElectionPolicy, SingletonElectionPolicy, SocketAddressPreference,
    },
    error::ConfigError,
    node::Node,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub group: String,
    /// This process.
    pub node: Node,
    /// Initial view, in election order. Should include `node`.
    pub members: Vec<Node>,
    #[serde(default)]
    pub singleton: Option<SingletonConfig>,
}

impl ClusterConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingletonConfig {
    pub name: String,
    #[serde(default = "default_quorum")]
    pub quorum: usize,
    #[serde(default)]
    pub policy: ElectionPolicyConfig,
}

fn default_quorum() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ElectionPolicyConfig {
    Simple {
        #[serde(default)]
        position: usize,
    },
    /// Preferences are tried in order; `position` drives the fallback.
    Preferred {
        preferences: Vec<PreferenceConfig>,
        #[serde(default)]
        position: usize,
    },
}

impl Default for ElectionPolicyConfig {
    fn default() -> Self {
        ElectionPolicyConfig::Simple { position: 0 }
    }
}

impl ElectionPolicyConfig {
    pub fn build(&self) -> Arc<dyn SingletonElectionPolicy> {
        match self {
            ElectionPolicyConfig::Simple { position } => {
                Arc::new(SimpleSingletonElectionPolicy::new(*position))
            }
            ElectionPolicyConfig::Preferred {
                preferences,
                position,
            } => Arc::new(PreferredSingletonElectionPolicy::new(
                Box::new(SimpleSingletonElectionPolicy::new(*position)),
                preferences.iter().map(PreferenceConfig::build).collect(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PreferenceConfig {
    Name(String),
    Address(SocketAddr),
}

impl PreferenceConfig {
    fn build(&self) -> Box<dyn Preference> {
        match self {
            PreferenceConfig::Name(name) => Box::new(NamePreference::new(name.clone())),
            PreferenceConfig::Address(address) => Box::new(SocketAddressPreference::new(*address)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_preferred_policy() {
        let config: ClusterConfig = serde_json::from_str(
            r#"{
                "group": "web",
                "node": { "name": "b", "address": "127.0.0.1:7601" },
                "members": [
                    { "name": "a", "address": "127.0.0.1:7600" },
                    { "name": "b", "address": "127.0.0.1:7601" },
                    { "name": "c", "address": "127.0.0.1:7602" }
                ],
                "singleton": {
                    "name": "scheduler",
                    "policy": {
                        "type": "preferred",
                        "preferences": [ { "address": "127.0.0.1:7602" }, { "name": "b" } ],
                        "position": 1
                    }
                }
            }"#,
        )
        .unwrap();

        let singleton = config.singleton.unwrap();
        assert_eq!(singleton.quorum, 1);
        assert_eq!(
            singleton.policy,
            ElectionPolicyConfig::Preferred {
                preferences: vec![
                    PreferenceConfig::Address("127.0.0.1:7602".parse().unwrap()),
                    PreferenceConfig::Name("b".to_string()),
                ],
                position: 1,
            }
        );

        let policy = singleton.policy.build();
        assert_eq!(policy.elect(&config.members), Some(&config.members[2]));
        assert_eq!(policy.elect(&config.members[..2]), Some(&config.members[1]));
        assert_eq!(policy.elect(&config.members[..1]), Some(&config.members[0]));
    }

    #[test]
    fn policy_defaults_to_first_member() {
        let singleton: SingletonConfig =
            serde_json::from_str(r#"{ "name": "scheduler", "quorum": 2 }"#).unwrap();

        assert_eq!(singleton.quorum, 2);
        assert_eq!(singleton.policy, ElectionPolicyConfig::default());
    }
}
