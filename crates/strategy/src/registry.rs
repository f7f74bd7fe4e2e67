use std::collections::HashSet;

use tracing::info;

use common::{Error, Granularity, Result};

use crate::config::RuleFileConfig;
use crate::rule::SignalRule;

/// Immutable universe + rule set, loaded once at startup and passed to the
/// scan cycle explicitly.
#[derive(Debug, Clone)]
pub struct RuleBook {
    universe: Vec<String>,
    rules: Vec<SignalRule>,
}

impl RuleBook {
    /// Validate every rule and enforce unique names. Duplicate symbols are
    /// dropped, keeping first occurrence order.
    pub fn from_config(file_cfg: RuleFileConfig) -> Result<Self> {
        let mut names = HashSet::new();
        for rule in &file_cfg.rules {
            rule.validate()?;
            if !names.insert(rule.name.as_str()) {
                return Err(Error::Config(format!("duplicate rule name '{}'", rule.name)));
            }
            info!(
                name = %rule.name,
                granularity = %rule.granularity,
                history = rule.required_history(),
                "Registered rule"
            );
        }

        let mut seen = HashSet::new();
        let universe: Vec<String> = file_cfg
            .universe
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect();
        if universe.is_empty() {
            return Err(Error::Config("universe must list at least one symbol".to_string()));
        }
        info!(symbols = universe.len(), rules = file_cfg.rules.len(), "Rule book loaded");

        Ok(Self {
            universe,
            rules: file_cfg.rules,
        })
    }

    pub fn load(path: &str) -> Result<Self> {
        Self::from_config(RuleFileConfig::load(path)?)
    }

    pub fn universe(&self) -> &[String] {
        &self.universe
    }

    pub fn rules(&self) -> &[SignalRule] {
        &self.rules
    }

    pub fn rule(&self, name: &str) -> Option<&SignalRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// One fetch per granularity, sized for the most demanding rule on it.
    pub fn fetch_plan(&self) -> Vec<(Granularity, usize)> {
        let mut plan: Vec<(Granularity, usize)> = Vec::new();
        for rule in &self.rules {
            let lookback = rule.fetch_lookback();
            match plan.iter_mut().find(|(g, _)| *g == rule.granularity) {
                Some((_, n)) => *n = (*n).max(lookback),
                None => plan.push((rule.granularity, lookback)),
            }
        }
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(universe: &[&str], rules: &str) -> RuleFileConfig {
        let list = universe
            .iter()
            .map(|s| format!("\"{s}\""))
            .collect::<Vec<_>>()
            .join(", ");
        RuleFileConfig::from_toml_str(&format!("universe = [{list}]\n{rules}")).unwrap()
    }

    const TWO_RULES: &str = r#"
        [[rule]]
        name = "FAST"
        granularity = "15m"
        entry = { type = "ma_cross", fast = 5, slow = 20 }
        stop = { type = "percent", percent = 1.0 }
        target = { type = "percent", percent = 2.0 }

        [[rule]]
        name = "SLOW"
        granularity = "15m"
        entry = { type = "ma_cross", fast = 20, slow = 50 }
        stop = { type = "percent", percent = 1.0 }
        target = { type = "percent", percent = 2.0 }
    "#;

    #[test]
    fn universe_is_deduplicated_in_order() {
        let book = RuleBook::from_config(file(&["B.NS", "A.NS", "B.NS", " A.NS "], TWO_RULES)).unwrap();
        assert_eq!(book.universe(), ["B.NS".to_string(), "A.NS".to_string()]);
        assert!(book.rule("SLOW").is_some());
        assert!(book.rule("MISSING").is_none());
    }

    #[test]
    fn duplicate_rule_names_are_rejected() {
        let rules = TWO_RULES.replace("SLOW", "FAST");
        let err = RuleBook::from_config(file(&["A.NS"], &rules)).unwrap_err();
        assert!(err.to_string().contains("duplicate rule name"));
    }

    #[test]
    fn empty_universe_is_rejected() {
        assert!(RuleBook::from_config(file(&[], TWO_RULES)).is_err());
    }

    #[test]
    fn fetch_plan_takes_largest_lookback_per_granularity() {
        let book = RuleBook::from_config(file(&["A.NS"], TWO_RULES)).unwrap();
        // SLOW: 2 × 50 history, doubled for the fetch
        assert_eq!(book.fetch_plan(), vec![(Granularity::M15, 200)]);
    }
}
