use std::collections::BTreeSet;

use deskpilot_core_types::ActionKind;
use regex::{Regex, RegexBuilder};
use serde::{Serialize, Serializer};
use tracing::{debug, info};

use crate::risk::RiskLevel;
use crate::SafetyError;

/// How a rule recognises a risky action. Compiled once when the rule is built.
#[derive(Clone, Debug)]
pub enum RulePattern {
    /// Case-insensitive regular expression.
    Regex(Regex),
    /// Lower-cased literal substring, used when the source is not a valid regex.
    Keyword(String),
    /// Geometric check on the action's own coordinates; never matches text.
    ScreenEdge,
}

impl RulePattern {
    pub fn compile(source: &str) -> Self {
        match RegexBuilder::new(source).case_insensitive(true).build() {
            Ok(regex) => RulePattern::Regex(regex),
            Err(err) => {
                debug!(pattern = source, %err, "pattern is not a regex, using keyword match");
                RulePattern::Keyword(source.to_lowercase())
            }
        }
    }

    pub fn keyword(source: &str) -> Self {
        RulePattern::Keyword(source.to_lowercase())
    }

    pub fn matches(&self, text: &str) -> bool {
        match self {
            RulePattern::Regex(regex) => regex.is_match(text),
            RulePattern::Keyword(keyword) => text.to_lowercase().contains(keyword.as_str()),
            RulePattern::ScreenEdge => false,
        }
    }

    pub fn source(&self) -> &str {
        match self {
            RulePattern::Regex(regex) => regex.as_str(),
            RulePattern::Keyword(keyword) => keyword,
            RulePattern::ScreenEdge => "screen_edge_click",
        }
    }
}

impl Serialize for RulePattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.source())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOrigin {
    Builtin,
    Custom,
}

#[derive(Clone, Debug, Serialize)]
pub struct SafetyRule {
    pub name: String,
    pub description: String,
    pub pattern: RulePattern,
    pub risk_level: RiskLevel,
    pub applies_to: BTreeSet<ActionKind>,
    pub enabled: bool,
    pub origin: RuleOrigin,
}

impl SafetyRule {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        pattern: RulePattern,
        risk_level: RiskLevel,
        applies_to: impl IntoIterator<Item = ActionKind>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            pattern,
            risk_level,
            applies_to: applies_to.into_iter().collect(),
            enabled: true,
            origin: RuleOrigin::Custom,
        }
    }

    fn builtin(mut self) -> Self {
        self.origin = RuleOrigin::Builtin;
        self
    }

    pub fn applies(&self, kind: ActionKind) -> bool {
        self.enabled && self.applies_to.contains(&kind)
    }

    pub fn is_screen_edge(&self) -> bool {
        matches!(self.pattern, RulePattern::ScreenEdge)
    }
}

/// Registry of built-in and custom rules.
///
/// The engine clones the set into an `Arc` when a plan starts, so edits made
/// while a plan runs only affect the next plan.
#[derive(Clone, Debug)]
pub struct RuleSet {
    builtin: Vec<SafetyRule>,
    custom: Vec<SafetyRule>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleSet {
    pub fn new() -> Self {
        Self {
            builtin: builtin_rules(),
            custom: Vec::new(),
        }
    }

    pub fn empty() -> Self {
        Self {
            builtin: Vec::new(),
            custom: Vec::new(),
        }
    }

    pub fn add_custom_rule(&mut self, mut rule: SafetyRule) -> Result<(), SafetyError> {
        if self.all_rules().any(|existing| existing.name == rule.name) {
            return Err(SafetyError::DuplicateRule(rule.name));
        }
        if rule.applies_to.is_empty() {
            return Err(SafetyError::InvalidRule(format!(
                "rule {} applies to no action type",
                rule.name
            )));
        }
        rule.origin = RuleOrigin::Custom;
        info!(rule = %rule.name, risk = %rule.risk_level, "custom safety rule added");
        self.custom.push(rule);
        Ok(())
    }

    /// Removes a custom rule. Built-in rules can only be disabled.
    pub fn remove_custom_rule(&mut self, name: &str) -> bool {
        let before = self.custom.len();
        self.custom.retain(|rule| rule.name != name);
        let removed = self.custom.len() != before;
        if removed {
            info!(rule = name, "custom safety rule removed");
        }
        removed
    }

    pub fn enable_rule(&mut self, name: &str) -> bool {
        self.set_enabled(name, true)
    }

    pub fn disable_rule(&mut self, name: &str) -> bool {
        self.set_enabled(name, false)
    }

    fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self
            .builtin
            .iter_mut()
            .chain(self.custom.iter_mut())
            .find(|rule| rule.name == name)
        {
            Some(rule) => {
                rule.enabled = enabled;
                info!(rule = name, enabled, "safety rule toggled");
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&SafetyRule> {
        self.all_rules().find(|rule| rule.name == name)
    }

    pub fn all_rules(&self) -> impl Iterator<Item = &SafetyRule> {
        self.builtin.iter().chain(self.custom.iter())
    }

    pub fn len(&self) -> usize {
        self.builtin.len() + self.custom.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enabled text rules for `kind` that match `text`.
    pub fn matching(&self, kind: ActionKind, text: &str) -> Vec<&SafetyRule> {
        self.all_rules()
            .filter(|rule| rule.applies(kind) && rule.pattern.matches(text))
            .collect()
    }

    /// Enabled screen-edge rule for `kind`, if any.
    pub fn edge_rule(&self, kind: ActionKind) -> Option<&SafetyRule> {
        self.all_rules()
            .find(|rule| rule.is_screen_edge() && rule.applies(kind))
    }
}

pub fn builtin_rules() -> Vec<SafetyRule> {
    use ActionKind::*;
    use RiskLevel::*;

    let rule = |name: &str, description: &str, pattern: &str, risk, kinds: &[ActionKind]| {
        SafetyRule::new(
            name,
            description,
            RulePattern::compile(pattern),
            risk,
            kinds.iter().copied(),
        )
        .builtin()
    };

    vec![
        rule(
            "file_deletion",
            "Possible file deletion",
            r"(删除|delete|remove|rm|del).*文件|文件.*删除",
            High,
            &[Key, Type],
        ),
        rule(
            "disk_format",
            "Disk formatting or partitioning",
            r"(格式化|format|fdisk|mkfs)",
            Critical,
            &[Key, Type],
        ),
        rule(
            "system_shutdown",
            "System shutdown or restart",
            r"(关机|重启|shutdown|restart|reboot)",
            High,
            &[Key, Type],
        ),
        rule(
            "password_input",
            "Password entry",
            r"(密码|password|passwd|pwd)",
            Medium,
            &[Type],
        ),
        rule(
            "admin_privileges",
            "Privilege elevation",
            r"(sudo|admin|administrator|管理员)",
            High,
            &[Key, Type],
        ),
        rule(
            "network_config",
            "Network configuration change",
            r"(网络|network|wifi|ip.*config|防火墙|firewall)",
            Medium,
            &[Type, Key],
        ),
        rule(
            "browser_privacy",
            "Browser privacy or history settings",
            r"(清除.*历史|清除.*缓存|隐私|privacy|clear.*history)",
            Medium,
            &[Click, Key],
        ),
        rule(
            "software_install",
            "Software installation",
            r"(安装|install|setup\.exe|\.msi|\.pkg|\.deb|\.rpm)",
            Medium,
            &[Click, Type],
        ),
        rule(
            "payment",
            "Payment or money transfer",
            r"(支付|付款|转账|pay|payment|transfer|银行|bank)",
            Critical,
            &[Click, Type],
        ),
        rule(
            "credit_card",
            "Credit card data entry",
            r"(\d{4}[\s-]*\d{4}[\s-]*\d{4}[\s-]*\d{4}|信用卡|credit.*card|cvv|cvc)",
            Critical,
            &[Type],
        ),
        rule(
            "registry_edit",
            "Registry editing",
            r"(注册表|regedit|registry)",
            High,
            &[Type, Key],
        ),
        rule(
            "system_files",
            "System file locations",
            r"(system32|windows|boot|etc|usr|bin)",
            High,
            &[Type, Click],
        ),
        rule(
            "dangerous_hotkey",
            "Window-closing or session hotkey",
            r"(alt\+f4|ctrl\+alt\+del|cmd\+q)",
            Medium,
            &[Key, Hotkey],
        ),
        SafetyRule::new(
            "screen_edge_click",
            "Click close to the screen border",
            RulePattern::ScreenEdge,
            Low,
            [Click, DoubleClick, RightClick],
        )
        .builtin(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_complete() {
        let set = RuleSet::new();
        assert_eq!(set.len(), 14);
        assert!(set.all_rules().all(|rule| rule.origin == RuleOrigin::Builtin));
        assert_eq!(set.get("disk_format").unwrap().risk_level, RiskLevel::Critical);
        assert!(set.edge_rule(ActionKind::Click).is_some());
        assert!(set.edge_rule(ActionKind::Type).is_none());
    }

    #[test]
    fn invalid_regex_falls_back_to_keyword() {
        let pattern = RulePattern::compile("rm -rf (");
        assert!(matches!(pattern, RulePattern::Keyword(_)));
        assert!(pattern.matches("please RM -RF ( now"));
        assert!(!pattern.matches("rm -rf"));
    }

    #[test]
    fn regex_is_case_insensitive() {
        let set = RuleSet::new();
        let hits: Vec<_> = set
            .matching(ActionKind::Type, "Enter your PASSWORD")
            .into_iter()
            .map(|rule| rule.name.as_str())
            .collect();
        assert_eq!(hits, vec!["password_input"]);
    }

    #[test]
    fn rules_respect_applies_to() {
        let set = RuleSet::new();
        assert_eq!(set.matching(ActionKind::Click, "password").len(), 0);
    }

    #[test]
    fn custom_rules_can_be_added_and_removed() {
        let mut set = RuleSet::new();
        let rule = SafetyRule::new(
            "prod_deploy",
            "Deploys to production",
            RulePattern::compile(r"deploy\s+prod"),
            RiskLevel::High,
            [ActionKind::Type],
        );
        set.add_custom_rule(rule.clone()).unwrap();
        assert!(matches!(
            set.add_custom_rule(rule),
            Err(SafetyError::DuplicateRule(_))
        ));
        assert_eq!(set.matching(ActionKind::Type, "Deploy  PROD now").len(), 1);
        assert!(set.remove_custom_rule("prod_deploy"));
        assert!(!set.remove_custom_rule("prod_deploy"));
        assert!(!set.remove_custom_rule("password_input"));
        assert!(set.get("password_input").is_some());
    }

    #[test]
    fn disabled_rules_do_not_match() {
        let mut set = RuleSet::new();
        assert!(set.disable_rule("password_input"));
        assert_eq!(set.matching(ActionKind::Type, "password").len(), 0);
        assert!(set.enable_rule("password_input"));
        assert_eq!(set.matching(ActionKind::Type, "password").len(), 1);
        assert!(!set.disable_rule("no_such_rule"));
    }
}
