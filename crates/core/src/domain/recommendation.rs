use crate::domain::stock::StockView;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn for_total(total: f64) -> Self {
        if total >= 75.0 {
            Confidence::High
        } else if total >= 60.0 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::High => "High",
            Confidence::Medium => "Medium",
            Confidence::Low => "Low",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row of `recommendation_scores`: the persisted projection of a stock's current actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RecommendationScore {
    pub id: i64,
    pub stock_id: i64,
    pub total_score: f64,
    pub rating_score: f64,
    pub rating_change_score: f64,
    pub target_change_score: f64,
    pub action_score: f64,
    pub coverage_score: f64,
    pub confidence: String,
    pub reason: String,
    pub latest_action_id: Option<i64>,
    pub calculated_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationView {
    #[serde(flatten)]
    pub score: RecommendationScore,
    pub stock: StockView,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_buckets() {
        assert_eq!(Confidence::for_total(115.0), Confidence::High);
        assert_eq!(Confidence::for_total(75.0), Confidence::High);
        assert_eq!(Confidence::for_total(74.9), Confidence::Medium);
        assert_eq!(Confidence::for_total(60.0), Confidence::Medium);
        assert_eq!(Confidence::for_total(59.99), Confidence::Low);
        assert_eq!(Confidence::for_total(-20.0), Confidence::Low);
    }

    #[test]
    fn confidence_serializes_as_label() {
        assert_eq!(serde_json::to_value(Confidence::Medium).unwrap(), "Medium");
        assert_eq!(Confidence::High.to_string(), "High");
    }
}
