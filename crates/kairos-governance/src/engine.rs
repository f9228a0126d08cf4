use async_trait::async_trait;
use kairos_protocol::{Action, Decision, PolicyRule};
use parking_lot::RwLock;
use regex::Regex;

/// Evaluates an `Action` and returns a `Decision` (§4.3).
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    async fn evaluate(&self, action: &Action) -> Decision;
}

/// The default engine: an ordered rule set. The first rule whose type
/// matches (empty type is wildcard) and whose glob name matches the action
/// name yields the decision. Default on no match is `allow`.
pub struct OrderedRulePolicyEngine {
    rules: RwLock<Vec<PolicyRule>>,
}

impl OrderedRulePolicyEngine {
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self {
            rules: RwLock::new(rules),
        }
    }

    pub fn set_rules(&self, rules: Vec<PolicyRule>) {
        *self.rules.write() = rules;
    }

    /// Matches `pattern` against `name`. Patterns are anchored regexes, so
    /// `*` expands to "zero or more of anything" and a bare `.` matches any
    /// character rather than a literal dot — `delete.*` matches
    /// `delete_file` this way (§8 pending-approval scenario). Falls back to
    /// exact string equality if the pattern doesn't compile as a regex.
    fn glob_matches(pattern: &str, name: &str) -> bool {
        if pattern == name {
            return true;
        }
        match Regex::new(&format!("^{pattern}$")) {
            Ok(re) => re.is_match(name),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl PolicyEngine for OrderedRulePolicyEngine {
    async fn evaluate(&self, action: &Action) -> Decision {
        let rules = self.rules.read();
        for rule in rules.iter() {
            let type_matches = rule
                .action_type
                .map(|t| t == action.action_type)
                .unwrap_or(true);
            if !type_matches {
                continue;
            }
            if Self::glob_matches(&rule.name_pattern, &action.name) {
                return match rule.effect {
                    kairos_protocol::Effect::Allow => {
                        Decision::allow(rule.reason.clone(), Some(rule.id.clone()))
                    }
                    kairos_protocol::Effect::Deny => {
                        Decision::deny(rule.reason.clone(), Some(rule.id.clone()))
                    }
                    kairos_protocol::Effect::Pending => {
                        Decision::pending(rule.reason.clone(), Some(rule.id.clone()))
                    }
                };
            }
        }
        Decision::allow("no matching rule, default allow", None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_protocol::{ActionType, Effect};

    fn rule(id: &str, effect: Effect, action_type: Option<ActionType>, pattern: &str) -> PolicyRule {
        PolicyRule {
            id: id.to_owned(),
            effect,
            action_type,
            name_pattern: pattern.to_owned(),
            reason: "test".to_owned(),
        }
    }

    #[tokio::test]
    async fn first_matching_rule_wins() {
        let engine = OrderedRulePolicyEngine::new(vec![
            rule("r1", Effect::Pending, Some(ActionType::Tool), "delete.*"),
            rule("r2", Effect::Deny, Some(ActionType::Tool), "delete.*"),
        ]);
        let decision = engine.evaluate(&Action::tool("delete_file")).await;
        assert_eq!(decision.rule_id.unwrap(), "r1");
        assert_eq!(decision.status, Effect::Pending);
    }

    #[tokio::test]
    async fn no_match_defaults_to_allow() {
        let engine = OrderedRulePolicyEngine::new(vec![rule(
            "r1",
            Effect::Deny,
            Some(ActionType::Tool),
            "net.*",
        )]);
        let decision = engine.evaluate(&Action::tool("fs.read")).await;
        assert!(decision.allowed);
        assert!(decision.rule_id.is_none());
    }

    #[tokio::test]
    async fn wildcard_type_matches_any_action_type() {
        let engine = OrderedRulePolicyEngine::new(vec![rule(
            "r1",
            Effect::Deny,
            None,
            "shutdown",
        )]);
        let decision = engine.evaluate(&Action::agent("shutdown")).await;
        assert_eq!(decision.status, Effect::Deny);
    }
}
