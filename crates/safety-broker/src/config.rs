//! Custom rule files.
//!
//! A rule file is JSON or YAML:
//!
//! ```yaml
//! version: 1
//! rules:
//!   - name: prod_deploy
//!     description: Deploys to production
//!     pattern: 'deploy\s+prod'
//!     risk_level: HIGH
//!     applies_to: [type, key]
//! ```

use std::fs::File;
use std::io::Read;
use std::path::Path;

use deskpilot_core_types::ActionKind;
use serde::{Deserialize, Serialize};

use crate::risk::RiskLevel;
use crate::rules::{RulePattern, RuleSet, SafetyRule};
use crate::SafetyError;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuleFile {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
    /// Names of built-in rules to switch off.
    #[serde(default)]
    pub disable: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuleSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub pattern: String,
    /// Treat `pattern` as a literal keyword instead of a regex.
    #[serde(default)]
    pub keyword: bool,
    pub risk_level: RiskLevel,
    pub applies_to: Vec<ActionKind>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_version() -> u32 {
    1
}

fn default_enabled() -> bool {
    true
}

impl RuleSpec {
    pub fn into_rule(self) -> SafetyRule {
        let pattern = if self.keyword {
            RulePattern::keyword(&self.pattern)
        } else {
            RulePattern::compile(&self.pattern)
        };
        let mut rule = SafetyRule::new(
            self.name,
            self.description,
            pattern,
            self.risk_level,
            self.applies_to,
        );
        rule.enabled = self.enabled;
        rule
    }
}

impl RuleFile {
    /// Registers every rule of the file into `set` and applies the disable list.
    pub fn apply_to(self, set: &mut RuleSet) -> Result<usize, SafetyError> {
        let mut added = 0;
        for spec in self.rules {
            set.add_custom_rule(spec.into_rule())?;
            added += 1;
        }
        for name in &self.disable {
            if !set.disable_rule(name) {
                return Err(SafetyError::InvalidRule(format!(
                    "cannot disable unknown rule {name}"
                )));
            }
        }
        Ok(added)
    }
}

pub fn load_rule_file(path: impl AsRef<Path>) -> Result<RuleFile, SafetyError> {
    let mut buf = String::new();
    File::open(path.as_ref())
        .and_then(|mut file| file.read_to_string(&mut buf))
        .map_err(|err| {
            SafetyError::InvalidRule(format!("{}: {}", path.as_ref().display(), err))
        })?;
    parse_rule_file(&buf)
}

pub fn parse_rule_file(raw: &str) -> Result<RuleFile, SafetyError> {
    match serde_json::from_str(raw) {
        Ok(file) => Ok(file),
        Err(json_err) => serde_yaml::from_str(raw).map_err(|yaml_err| {
            SafetyError::InvalidRule(format!(
                "json error: {}; yaml error: {}",
                json_err, yaml_err
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
version: 1
rules:
  - name: prod_deploy
    description: Deploys to production
    pattern: 'deploy\s+prod'
    risk_level: HIGH
    applies_to: [type, key]
  - name: literal_paren
    pattern: 'drop table ('
    keyword: true
    risk_level: CRITICAL
    applies_to: [type]
disable: [screen_edge_click]
"#;

    #[test]
    fn parses_yaml_and_registers_rules() {
        let file = parse_rule_file(YAML).unwrap();
        assert_eq!(file.rules.len(), 2);
        let mut set = RuleSet::new();
        assert_eq!(file.apply_to(&mut set).unwrap(), 2);
        assert_eq!(set.len(), 16);
        assert!(!set.get("screen_edge_click").unwrap().enabled);
        assert_eq!(
            set.matching(ActionKind::Type, "drop table (users)").len(),
            1
        );
    }

    #[test]
    fn parses_json() {
        let raw = r#"{"rules":[{"name":"x","pattern":"x","risk_level":"LOW","applies_to":["click"]}]}"#;
        let file = parse_rule_file(raw).unwrap();
        assert_eq!(file.version, 1);
        assert_eq!(file.rules[0].applies_to, vec![ActionKind::Click]);
    }

    #[test]
    fn unknown_disable_target_is_an_error() {
        let file = parse_rule_file("disable: [nope]").unwrap();
        assert!(file.apply_to(&mut RuleSet::new()).is_err());
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yaml");
        std::fs::write(&path, YAML).unwrap();
        assert_eq!(load_rule_file(&path).unwrap().rules.len(), 2);
        assert!(load_rule_file(dir.path().join("missing.yaml")).is_err());
    }
}
