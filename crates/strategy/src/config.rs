use serde::{Deserialize, Serialize};

use common::{Error, Result};

use crate::rule::SignalRule;

/// Top-level rule book file (TOML).
///
/// Example `config/rules.toml`:
/// ```toml
/// universe = ["RELIANCE.NS", "TCS.NS", "^NSEI"]
///
/// [[rule]]
/// name = "SWING"
/// granularity = "1h"
/// entry = { type = "ma_cross", fast = 50, slow = 200 }
/// stop = { type = "percent", percent = 3.0 }
/// target = { type = "percent", percent = 6.0 }
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleFileConfig {
    /// Symbols scanned every cycle, in data-provider notation.
    pub universe: Vec<String>,
    #[serde(rename = "rule")]
    pub rules: Vec<SignalRule>,
}

impl RuleFileConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read rule config at '{path}': {e}")))?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse rule config at '{path}': {e}")))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Distance, EntryCondition, Filter};

    const SAMPLE: &str = r#"
        universe = ["RELIANCE.NS", "TCS.NS"]

        [[rule]]
        name = "INTRADAY"
        granularity = "15m"
        entry = { type = "ma_cross", fast = 20, slow = 50 }
        stop = { type = "percent", percent = 1.5 }
        target = { type = "percent", percent = 3.0 }

        [[rule.filter]]
        type = "rsi"
        long_max = 40.0
        short_min = 60.0

        [[rule]]
        name = "RSI"
        granularity = "1d"
        entry = { type = "rsi_cross", oversold = 30.0, overbought = 70.0 }
        stop = { type = "atr", multiple = 1.2 }
        target = { type = "atr", multiple = 2.5 }
    "#;

    #[test]
    fn parses_universe_and_rules() {
        let cfg = RuleFileConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.universe, vec!["RELIANCE.NS", "TCS.NS"]);
        assert_eq!(cfg.rules.len(), 2);
        assert!(matches!(cfg.rules[0].filters[0], Filter::Rsi { period: 14, long_max: Some(m), .. } if m == 40.0));
        assert!(matches!(cfg.rules[1].entry, EntryCondition::RsiCross { period: 14, .. }));
        assert_eq!(cfg.rules[1].target, Distance::Atr { period: 14, multiple: 2.5 });
    }

    #[test]
    fn unknown_entry_type_is_a_config_error() {
        let broken = SAMPLE.replace("rsi_cross", "moon_phase");
        assert!(matches!(RuleFileConfig::from_toml_str(&broken), Err(Error::Config(_))));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = RuleFileConfig::load("/nonexistent/rules.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read rule config"));
    }
}
