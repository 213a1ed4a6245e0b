//! Declarative YAML scenario specification

use fenced_harness_common::{
    AddressSpace, PreflightKind, Protocol, ResponseKind, ServerDescriptor, ServerRegistry,
    SourceSpec, TargetBehavior, TargetSpec, Token,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{E2eError, E2eResult};
use crate::expectation::{FencedFrameTestResult, FetchExpectation};
use crate::orchestrator::{FetchOptions, FetchScenario, FrameScenario, Scenario};

/// A complete scenario parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSpec {
    /// Unique name for this scenario
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering scenarios
    #[serde(default)]
    pub tags: Vec<String>,

    /// Server the fenced frame is loaded from. Defaults to the base URL.
    #[serde(default)]
    pub source: Option<ServerRef>,

    pub target: TargetRef,

    pub test: TestKind,
}

/// Reference to a registry server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRef {
    pub protocol: Protocol,
    pub address_space: AddressSpace,
    /// Serve the document with `Content-Security-Policy: treat-as-public-address`
    #[serde(default)]
    pub treat_as_public: bool,
}

/// Target server plus how the preflight responder should behave
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetRef {
    pub protocol: Protocol,
    pub address_space: AddressSpace,
    #[serde(default)]
    pub preflight: Option<PreflightKind>,
    #[serde(default)]
    pub response: Option<ResponseKind>,
    #[serde(default)]
    pub redirect: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TestKind {
    /// Fetch the target from inside a fenced frame
    Fetch {
        #[serde(default = "default_mode")]
        mode: String,
        #[serde(default = "default_method")]
        method: String,
        expected: FetchExpectation,
    },

    /// Load the target as a frame nested in a fenced frame
    Frame { expected: FencedFrameTestResult },
}

fn default_mode() -> String {
    FetchOptions::default().mode
}

fn default_method() -> String {
    FetchOptions::default().method
}

fn lookup<'a>(
    registry: &'a ServerRegistry,
    protocol: Protocol,
    address_space: AddressSpace,
) -> E2eResult<&'a ServerDescriptor> {
    registry
        .get(protocol, address_space)
        .ok_or(E2eError::MissingServer {
            protocol,
            address_space,
        })
}

impl TargetRef {
    fn has_behavior(&self) -> bool {
        self.preflight.is_some()
            || self.response.is_some()
            || self.redirect.is_some()
            || self.file.is_some()
    }

    /// Resolve against `registry`, minting a fresh preflight uuid
    pub fn build(&self, registry: &ServerRegistry) -> E2eResult<TargetSpec> {
        let server = lookup(registry, self.protocol, self.address_space)?.clone();
        let behavior = self.has_behavior().then(|| TargetBehavior {
            preflight: self.preflight.unwrap_or_default().build(&Token::mint()),
            response: self.response.unwrap_or_default().build(),
            redirect: self.redirect.clone(),
            file: self.file.clone(),
        });
        Ok(TargetSpec { server, behavior })
    }
}

impl ServerRef {
    pub fn build(&self, registry: &ServerRegistry) -> E2eResult<SourceSpec> {
        Ok(SourceSpec {
            server: lookup(registry, self.protocol, self.address_space)?.clone(),
            treat_as_public: self.treat_as_public,
        })
    }
}

impl ScenarioSpec {
    /// Parse a scenario from a YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        serde_yaml::from_str(yaml).map_err(E2eError::from)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all scenarios from a directory, sorted by file path
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut specs = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            specs.push(Self::from_file(entry.path())?);
        }

        Ok(specs)
    }

    /// Filter scenarios by tag
    pub fn filter_by_tag<'a>(specs: &'a [Self], tag: &str) -> Vec<&'a Self> {
        specs.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }

    /// Build a runnable scenario. Every call mints new tokens.
    pub fn build(&self, registry: &ServerRegistry) -> E2eResult<Scenario> {
        let source = self
            .source
            .as_ref()
            .map(|source| source.build(registry))
            .transpose()?;
        let target = self.target.build(registry)?;

        Ok(match &self.test {
            TestKind::Fetch {
                mode,
                method,
                expected,
            } => Scenario::Fetch(FetchScenario {
                name: self.name.clone(),
                source,
                target,
                fetch_options: FetchOptions {
                    mode: mode.clone(),
                    method: method.clone(),
                },
                expected: expected.result(),
            }),
            TestKind::Frame { expected } => Scenario::Frame(FrameScenario {
                name: self.name.clone(),
                source,
                target,
                expected: *expected,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fenced_harness_common::{params, BehaviorValue, PortTable};

    fn registry() -> ServerRegistry {
        ServerRegistry::from_ports(&PortTable::default())
    }

    #[test]
    fn test_parse_fetch_spec() {
        let yaml = r#"
name: public-to-local-no-pna
description: PNA headers missing from the preflight
tags:
  - fetch
  - pna
source:
  protocol: https
  address_space: public
target:
  protocol: https
  address_space: local
  preflight: no_pna_header
  response: allow_cross_origin
test:
  kind: fetch
  expected: failure
"#;
        let spec = ScenarioSpec::from_yaml(yaml).unwrap();
        assert_eq!(spec.name, "public-to-local-no-pna");
        assert_eq!(spec.tags, vec!["fetch", "pna"]);

        let Scenario::Fetch(scenario) = spec.build(&registry()).unwrap() else {
            panic!("expected a fetch scenario");
        };
        assert_eq!(scenario.fetch_options, FetchOptions::default());
        assert_eq!(scenario.source.unwrap().server.port, 8446);
        assert_eq!(scenario.target.server.port, 8445);

        let behavior = scenario.target.behavior.unwrap();
        assert_eq!(
            behavior.preflight.get(params::PREFLIGHT_HEADERS),
            Some(&BehaviorValue::from(params::HEADERS_CORS))
        );
        assert!(behavior.preflight.get(params::PREFLIGHT_UUID).is_some());
        assert_eq!(
            behavior.response.get(params::FINAL_HEADERS),
            Some(&BehaviorValue::from(params::HEADERS_CORS))
        );
    }

    #[test]
    fn test_parse_frame_spec_without_behavior() {
        let yaml = r#"
name: frame-local
target:
  protocol: https
  address_space: local
test:
  kind: frame
  expected: success
"#;
        let spec = ScenarioSpec::from_yaml(yaml).unwrap();
        let Scenario::Frame(scenario) = spec.build(&registry()).unwrap() else {
            panic!("expected a frame scenario");
        };
        assert!(scenario.source.is_none());
        assert!(scenario.target.behavior.is_none());
        assert_eq!(scenario.expected, FencedFrameTestResult::Success);
    }

    #[test]
    fn test_each_build_mints_new_uuid() {
        let yaml = r#"
name: fresh
target:
  protocol: https
  address_space: local
  preflight: success
test:
  kind: frame
  expected: success
"#;
        let spec = ScenarioSpec::from_yaml(yaml).unwrap();
        let uuid = |scenario: Scenario| match scenario {
            Scenario::Frame(s) => s.target.behavior.unwrap().preflight.get(params::PREFLIGHT_UUID).cloned(),
            Scenario::Fetch(_) => None,
        };
        let first = uuid(spec.build(&registry()).unwrap());
        let second = uuid(spec.build(&registry()).unwrap());
        assert!(first.is_some());
        assert_ne!(first, second);
    }

    #[test]
    fn test_missing_server() {
        let yaml = r#"
name: no-ws-public
target:
  protocol: ws
  address_space: public
test:
  kind: frame
  expected: failure
"#;
        let spec = ScenarioSpec::from_yaml(yaml).unwrap();
        let err = spec.build(&registry()).unwrap_err();
        assert!(matches!(
            err,
            E2eError::MissingServer {
                protocol: Protocol::Ws,
                address_space: AddressSpace::Public
            }
        ));
    }

    #[test]
    fn test_load_all_and_filter() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("b.yaml"),
            "name: b\ntags: [frame]\ntarget: {protocol: https, address_space: local}\ntest: {kind: frame, expected: success}\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("a.yml"),
            "name: a\ntags: [fetch]\ntarget: {protocol: https, address_space: local}\ntest: {kind: fetch, method: PUT, expected: failure}\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let specs = ScenarioSpec::load_all(dir.path()).unwrap();
        let names: Vec<_> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        let frames = ScenarioSpec::filter_by_tag(&specs, "frame");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].name, "b");
    }

    #[test]
    fn test_bad_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "name: [").unwrap();

        let err = ScenarioSpec::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("broken.yaml"));
    }
}
