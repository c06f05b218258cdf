//! Ledger binding and upload endpoint configuration.
//!
//! A [Config] is usually loaded from a YAML file:
//!
//! ```yaml
//! contract: "0x5FbDB2315678afecb367f032d93F642f64180aa3"
//! interface: "abi.json"
//! upload: "http://localhost:3000/api/pinata"
//! ```
//!
//! `interface` is a path (relative to the YAML file) to the contract's interface descriptor:
//! either a bare ABI array or a build artifact with an `abi` field. Nothing is validated at
//! load time beyond reading the files; [Config::binding] performs validation so that a
//! misconfigured engine still starts and reports [ConfigError] on its first ledger call.

use crate::types::Address;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Errors caused by a missing or malformed configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("ledger address is not configured")]
    MissingContract,
    #[error("ledger address is malformed: {0}")]
    InvalidContract(String),
    #[error("ledger interface is not configured")]
    MissingInterface,
    #[error("ledger interface is malformed: {0}")]
    InvalidInterface(String),
    #[error("method not in ledger interface: {0}")]
    UnknownMethod(String),
    #[error("method {method} expects {expected} arguments, got {actual}")]
    Arity {
        method: String,
        expected: usize,
        actual: usize,
    },
    #[error("upload endpoint is not configured")]
    MissingUpload,
    #[error("upload endpoint is malformed: {0}")]
    InvalidUpload(String),
    #[error("unable to read {0}: {1}")]
    Read(PathBuf, String),
    #[error("unable to parse {0}: {1}")]
    Parse(PathBuf, String),
}

/// On-disk layout of the configuration file.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
struct File {
    contract: Option<String>,
    interface: Option<PathBuf>,
    upload: Option<String>,
}

/// Configuration for the engine.
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Address of the election contract.
    pub contract: Option<String>,

    /// Interface descriptor (JSON) of the election contract.
    pub interface: Option<String>,

    /// URL of the upload collaborator.
    pub upload: Option<String>,
}

impl Config {
    /// Read a YAML configuration file and the interface descriptor it points to.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Read(path.to_path_buf(), err.to_string()))?;
        let file: File = serde_yaml::from_str(&raw)
            .map_err(|err| ConfigError::Parse(path.to_path_buf(), err.to_string()))?;
        let interface = match file.interface {
            Some(relative) => {
                let resolved = match path.parent() {
                    Some(dir) if relative.is_relative() => dir.join(relative),
                    _ => relative,
                };
                let descriptor = std::fs::read_to_string(&resolved)
                    .map_err(|err| ConfigError::Read(resolved.clone(), err.to_string()))?;
                Some(descriptor)
            }
            None => None,
        };
        Ok(Self {
            contract: file.contract,
            interface,
            upload: file.upload,
        })
    }

    /// Validate the ledger address and interface.
    pub fn binding(&self) -> Result<Binding, ConfigError> {
        let contract = match self.contract.as_deref().map(str::trim) {
            None | Some("") => return Err(ConfigError::MissingContract),
            Some(raw) => Address::from(raw),
        };
        if !contract.is_well_formed() || contract.is_zero() {
            return Err(ConfigError::InvalidContract(contract.to_string()));
        }
        let interface = match self.interface.as_deref() {
            None => return Err(ConfigError::MissingInterface),
            Some(raw) if raw.trim().is_empty() => return Err(ConfigError::MissingInterface),
            Some(raw) => Interface::parse(raw)?,
        };
        Ok(Binding {
            contract,
            interface,
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Descriptor {
    Artifact { abi: Vec<Entry> },
    Bare(Vec<Entry>),
}

#[derive(Deserialize)]
struct Entry {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    inputs: Vec<serde_json::Value>,
}

/// The callable surface of the election contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Interface {
    /// Number of inputs, by function name.
    functions: BTreeMap<String, usize>,
}

impl Interface {
    /// Parse an ABI (bare array or artifact) into the set of callable functions.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let descriptor: Descriptor = serde_json::from_str(raw)
            .map_err(|err| ConfigError::InvalidInterface(err.to_string()))?;
        let entries = match descriptor {
            Descriptor::Artifact { abi } => abi,
            Descriptor::Bare(abi) => abi,
        };
        let functions: BTreeMap<_, _> = entries
            .into_iter()
            .filter(|entry| entry.kind == "function" && !entry.name.is_empty())
            .map(|entry| (entry.name, entry.inputs.len()))
            .collect();
        if functions.is_empty() {
            return Err(ConfigError::InvalidInterface(
                "no functions declared".to_string(),
            ));
        }
        Ok(Self { functions })
    }

    /// Ensure `method` exists and takes `arity` inputs.
    pub fn check(&self, method: &str, arity: usize) -> Result<(), ConfigError> {
        let Some(expected) = self.functions.get(method) else {
            return Err(ConfigError::UnknownMethod(method.to_string()));
        };
        if *expected != arity {
            return Err(ConfigError::Arity {
                method: method.to_string(),
                expected: *expected,
                actual: arity,
            });
        }
        Ok(())
    }

    pub fn contains(&self, method: &str) -> bool {
        self.functions.contains_key(method)
    }
}

/// A validated contract address and interface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    pub contract: Address,
    pub interface: Interface,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks;

    fn valid() -> Config {
        Config {
            contract: Some(mocks::CONTRACT.to_string()),
            interface: Some(mocks::interface()),
            upload: None,
        }
    }

    #[test]
    fn test_binding_valid() {
        let binding = valid().binding().unwrap();
        assert_eq!(binding.contract, Address::from(mocks::CONTRACT));
        assert!(binding.interface.contains("declareWinner"));
        binding.interface.check("getCandidateData", 1).unwrap();
    }

    #[test]
    fn test_binding_missing_pieces() {
        let mut config = valid();
        config.contract = None;
        assert_eq!(config.binding(), Err(ConfigError::MissingContract));

        let mut config = valid();
        config.contract = Some("  ".into());
        assert_eq!(config.binding(), Err(ConfigError::MissingContract));

        let mut config = valid();
        config.interface = None;
        assert_eq!(config.binding(), Err(ConfigError::MissingInterface));
    }

    #[test]
    fn test_binding_malformed_pieces() {
        let mut config = valid();
        config.contract = Some("0x1234".into());
        assert!(matches!(
            config.binding(),
            Err(ConfigError::InvalidContract(_))
        ));

        let mut config = valid();
        config.contract = Some("0x0000000000000000000000000000000000000000".into());
        assert!(matches!(
            config.binding(),
            Err(ConfigError::InvalidContract(_))
        ));

        let mut config = valid();
        config.interface = Some("{not json".into());
        assert!(matches!(
            config.binding(),
            Err(ConfigError::InvalidInterface(_))
        ));

        let mut config = valid();
        config.interface = Some(r#"[{"type": "event", "name": "Voted"}]"#.into());
        assert!(matches!(
            config.binding(),
            Err(ConfigError::InvalidInterface(_))
        ));
    }

    #[test]
    fn test_interface_artifact_and_arity() {
        let raw = r#"{"contractName": "Create", "abi": [
            {"type": "function", "name": "vote",
             "inputs": [{"type": "address"}, {"type": "uint256"}]}
        ]}"#;
        let interface = Interface::parse(raw).unwrap();
        interface.check("vote", 2).unwrap();
        assert_eq!(
            interface.check("vote", 1),
            Err(ConfigError::Arity {
                method: "vote".into(),
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(
            interface.check("declareWinner", 0),
            Err(ConfigError::UnknownMethod("declareWinner".into()))
        );
    }

    #[test]
    fn test_load_from_yaml() {
        let dir = std::env::temp_dir().join(format!("ballot-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("abi.json"), mocks::interface()).unwrap();
        std::fs::write(
            dir.join("ballot.yaml"),
            format!(
                "contract: \"{}\"\ninterface: abi.json\nupload: http://localhost:3000/api/pinata\n",
                mocks::CONTRACT
            ),
        )
        .unwrap();

        let config = Config::load(&dir.join("ballot.yaml")).unwrap();
        assert_eq!(
            config.upload.as_deref(),
            Some("http://localhost:3000/api/pinata")
        );
        config.binding().unwrap();

        let missing = Config::load(&dir.join("absent.yaml"));
        assert!(matches!(missing, Err(ConfigError::Read(_, _))));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
