//! Deterministic recommendation scoring over a stock's retained analyst actions.

use crate::domain::recommendation::Confidence;
use crate::domain::stock::AnalystAction;
use crate::taxonomy::{action_weight, rating_ordinal, rating_score, NEUTRAL_RATING};

pub const BASE_SCORE: f64 = 50.0;

const UPGRADE_BONUS: f64 = 15.0;
const DOWNGRADE_PENALTY: f64 = -10.0;
const COVERAGE_MIN_ACTIONS: usize = 3;
const COVERAGE_BREADTH_BONUS: f64 = 5.0;
const POSITIVE_RATING_THRESHOLD: f64 = 60.0;
const POSITIVE_CONSENSUS_MIN: usize = 2;
const POSITIVE_CONSENSUS_BONUS: f64 = 8.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBreakdown {
    pub rating_score: f64,
    pub rating_change_score: f64,
    pub target_change_score: f64,
    pub action_score: f64,
    pub coverage_score: f64,
    pub total_score: f64,
    pub confidence: Confidence,
    pub reason: String,
    pub latest_action_id: Option<i64>,
}

/// Scores a stock from its retained actions, newest first. Only the first action feeds the
/// rating, change, target and action components; coverage looks at the whole list.
pub fn score_actions(actions: &[AnalystAction]) -> ScoreBreakdown {
    let Some(latest) = actions.first() else {
        return ScoreBreakdown {
            rating_score: 0.0,
            rating_change_score: 0.0,
            target_change_score: 0.0,
            action_score: 0.0,
            coverage_score: 0.0,
            total_score: BASE_SCORE,
            confidence: Confidence::for_total(BASE_SCORE),
            reason: "No recent analyst coverage".to_string(),
            latest_action_id: None,
        };
    };

    let rating = rating_score(&latest.rating_to) - NEUTRAL_RATING;
    let rating_change = rating_change_score(&latest.rating_from, &latest.rating_to);
    let target_change = target_change(&latest.target_from, &latest.target_to)
        .map(target_change_score)
        .unwrap_or(0.0);
    let action = action_weight(&latest.action);
    let coverage = coverage_score(actions);

    let total = BASE_SCORE + rating + rating_change + target_change + action + coverage;

    ScoreBreakdown {
        rating_score: rating,
        rating_change_score: rating_change,
        target_change_score: target_change,
        action_score: action,
        coverage_score: coverage,
        total_score: total,
        confidence: Confidence::for_total(total),
        reason: build_reason(latest, actions.len()),
        latest_action_id: Some(latest.id),
    }
}

fn rating_change_score(from: &str, to: &str) -> f64 {
    let (Some(from), Some(to)) = (rating_ordinal(from), rating_ordinal(to)) else {
        return 0.0;
    };
    if to > from {
        UPGRADE_BONUS
    } else if to < from {
        DOWNGRADE_PENALTY
    } else {
        0.0
    }
}

/// Parses a price such as "$1,234.50". Anything unparsable is 0, which callers treat as absent.
pub fn parse_price(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse::<f64>().unwrap_or(0.0)
}

/// Relative target move, when both targets are present.
pub fn target_change(from: &str, to: &str) -> Option<f64> {
    let from = parse_price(from);
    let to = parse_price(to);
    if from > 0.0 && to > 0.0 {
        Some((to - from) / from)
    } else {
        None
    }
}

fn target_change_score(change: f64) -> f64 {
    if change > 0.10 {
        20.0
    } else if change > 0.05 {
        10.0
    } else if change < -0.10 {
        -15.0
    } else if change < -0.05 {
        -8.0
    } else {
        0.0
    }
}

fn coverage_score(actions: &[AnalystAction]) -> f64 {
    let mut score = 0.0;
    if actions.len() >= COVERAGE_MIN_ACTIONS {
        score += COVERAGE_BREADTH_BONUS;
    }

    let positive = actions
        .iter()
        .filter(|a| rating_score(&a.rating_to) > POSITIVE_RATING_THRESHOLD)
        .count();
    if positive >= POSITIVE_CONSENSUS_MIN {
        score += POSITIVE_CONSENSUS_BONUS;
    }

    score
}

fn build_reason(latest: &AnalystAction, retained: usize) -> String {
    let mut clauses: Vec<String> = Vec::new();

    let rating = latest.rating_to.to_lowercase();
    if rating.contains("buy") {
        clauses.push(format!("Buy rating from {}", latest.brokerage));
    } else if rating.contains("outperform") {
        clauses.push(format!("Outperform rating from {}", latest.brokerage));
    }

    if let Some(change) = target_change(&latest.target_from, &latest.target_to) {
        if change > 0.10 {
            clauses.push(format!("Price target raised by {:.1}%", change * 100.0));
        }
    }

    if latest.action.to_lowercase().contains("initiated") {
        clauses.push("New analyst coverage".to_string());
    }

    if retained >= COVERAGE_MIN_ACTIONS {
        clauses.push("Multiple recent analyst updates".to_string());
    }

    if clauses.is_empty() {
        return format!("Analyst coverage available from {}", latest.brokerage);
    }
    clauses.join(", ")
}
