//! Ordered phrase tables for the free-text fields the feed delivers.
//!
//! Every lookup is a case-insensitive substring match evaluated top to bottom, first match wins.
//! Several phrases overlap ("strong buy"/"buy", "underperform"/"outperform" neighbours), so the
//! order of each table is part of its meaning.

use serde::Serialize;

pub const NEUTRAL_RATING: f64 = 50.0;

/// Rating phrase → ordinal score.
pub const RATING_SCALE: &[(&str, f64)] = &[
    ("strong buy", 80.0),
    ("buy", 80.0),
    ("outperform", 70.0),
    ("overweight", 70.0),
    ("hold", 50.0),
    ("neutral", 50.0),
    ("underperform", 30.0),
    ("underweight", 30.0),
    ("sell", 10.0),
    ("strong sell", 10.0),
];

/// Action phrase → action score.
pub const ACTION_WEIGHTS: &[(&str, f64)] = &[
    ("initiated", 10.0),
    ("raised", 12.0),
    ("lowered", -8.0),
    ("maintained", 5.0),
];

fn first_match<T: Copy>(table: &[(&str, T)], text: &str) -> Option<T> {
    let lower = text.to_lowercase();
    table
        .iter()
        .find(|(pattern, _)| lower.contains(pattern))
        .map(|(_, value)| *value)
}

/// Ordinal score of a recognized rating phrase.
pub fn rating_ordinal(rating: &str) -> Option<f64> {
    first_match(RATING_SCALE, rating)
}

/// Ordinal score with unrecognized ratings treated as neutral.
pub fn rating_score(rating: &str) -> f64 {
    rating_ordinal(rating).unwrap_or(NEUTRAL_RATING)
}

pub fn action_weight(action: &str) -> f64 {
    first_match(ACTION_WEIGHTS, action).unwrap_or(0.0)
}

/// Normalized action categories offered as list filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Initiated,
    Raised,
    Lowered,
    Upgraded,
    Downgraded,
    Reiterated,
    TargetSet,
}

impl ActionKind {
    /// Classification order.
    pub const ALL: [ActionKind; 7] = [
        ActionKind::Initiated,
        ActionKind::Raised,
        ActionKind::Lowered,
        ActionKind::Upgraded,
        ActionKind::Downgraded,
        ActionKind::Reiterated,
        ActionKind::TargetSet,
    ];

    pub fn value(self) -> &'static str {
        match self {
            ActionKind::Initiated => "initiated",
            ActionKind::Raised => "raised",
            ActionKind::Lowered => "lowered",
            ActionKind::Upgraded => "upgraded",
            ActionKind::Downgraded => "downgraded",
            ActionKind::Reiterated => "reiterated",
            ActionKind::TargetSet => "target-set",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ActionKind::Initiated => "Initiated",
            ActionKind::Raised => "Target Raised",
            ActionKind::Lowered => "Target Lowered",
            ActionKind::Upgraded => "Upgraded",
            ActionKind::Downgraded => "Downgraded",
            ActionKind::Reiterated => "Reiterated",
            ActionKind::TargetSet => "Target Set",
        }
    }

    /// Lowercase substring searched for in the action text.
    pub fn pattern(self) -> &'static str {
        match self {
            ActionKind::TargetSet => "target set",
            other => other.value(),
        }
    }

    /// Parses a filter value. "all", empty and unknown values mean "no filter".
    pub fn from_filter(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.value().eq_ignore_ascii_case(value))
    }

    pub fn classify(action: &str) -> Option<Self> {
        let lower = action.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| lower.contains(kind.pattern()))
    }
}

/// Filter value for a raw action text: the taxonomy value, or the kebab-cased text itself.
pub fn normalize_action_value(action: &str) -> String {
    match ActionKind::classify(action) {
        Some(kind) => kind.value().to_string(),
        None => action.to_lowercase().replace(' ', "-"),
    }
}

/// Display label for a raw action text: the taxonomy label, or the text in title case.
pub fn format_action_label(action: &str) -> String {
    if let Some(kind) = ActionKind::classify(action) {
        return kind.label().to_string();
    }

    action
        .to_lowercase()
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_scale_is_case_insensitive_first_match() {
        assert_eq!(rating_ordinal("Strong-Buy"), Some(80.0));
        assert_eq!(rating_ordinal("BUY"), Some(80.0));
        assert_eq!(rating_ordinal("Sector Outperform"), Some(70.0));
        assert_eq!(rating_ordinal("Equal Weight"), None);
        assert_eq!(rating_ordinal("Market Perform"), None);
        assert_eq!(rating_ordinal("Underperform"), Some(30.0));
        assert_eq!(rating_ordinal("Strong Sell"), Some(10.0));
        assert_eq!(rating_ordinal(""), None);
    }

    #[test]
    fn unrecognized_rating_scores_neutral() {
        assert_eq!(rating_score("Peer Perform"), NEUTRAL_RATING);
        assert_eq!(rating_score("Overweight"), 70.0);
    }

    #[test]
    fn action_weights_follow_table_order() {
        assert_eq!(action_weight("initiated by"), 10.0);
        assert_eq!(action_weight("target raised by"), 12.0);
        assert_eq!(action_weight("target lowered by"), -8.0);
        assert_eq!(action_weight("Maintained"), 5.0);
        assert_eq!(action_weight("upgraded by"), 0.0);
    }

    #[test]
    fn filter_values_parse_and_reject_unknown() {
        assert_eq!(ActionKind::from_filter("lowered"), Some(ActionKind::Lowered));
        assert_eq!(ActionKind::from_filter("target-set"), Some(ActionKind::TargetSet));
        assert_eq!(ActionKind::from_filter("all"), None);
        assert_eq!(ActionKind::from_filter(""), None);
        assert_eq!(ActionKind::from_filter("bogus"), None);
    }

    #[test]
    fn classifies_by_first_matching_kind() {
        assert_eq!(ActionKind::classify("Price Target Lowered"), Some(ActionKind::Lowered));
        assert_eq!(ActionKind::classify("target set by"), Some(ActionKind::TargetSet));
        assert_eq!(ActionKind::classify("coverage dropped by"), None);
    }

    #[test]
    fn normalizes_labels_and_values() {
        assert_eq!(normalize_action_value("target set by"), "target-set");
        assert_eq!(format_action_label("target set by"), "Target Set");
        assert_eq!(normalize_action_value("Coverage Dropped"), "coverage-dropped");
        assert_eq!(format_action_label("coverage dropped by"), "Coverage Dropped By");
    }
}
