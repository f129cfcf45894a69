use super::filters::SortMode;
use crate::taxonomy::{format_action_label, normalize_action_value};
use anyhow::Context;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterOption {
    pub label: String,
    pub value: String,
}

impl FilterOption {
    fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    pub action_types: Vec<FilterOption>,
    pub brokerages: Vec<FilterOption>,
    pub sort_by: Vec<FilterOption>,
}

pub async fn filter_options(pool: &sqlx::PgPool) -> anyhow::Result<FilterOptions> {
    let actions: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT action FROM analyst_actions WHERE action <> '' ORDER BY action",
    )
    .fetch_all(pool)
    .await
    .context("select distinct actions failed")?;

    let brokerages: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT brokerage FROM analyst_actions WHERE brokerage <> '' ORDER BY brokerage",
    )
    .fetch_all(pool)
    .await
    .context("select distinct brokerages failed")?;

    Ok(build_options(&actions, &brokerages))
}

/// Action texts collapse onto their normalized value; the first text seen names the option.
pub fn build_options(actions: &[String], brokerages: &[String]) -> FilterOptions {
    let mut action_types = vec![FilterOption::new("All actions", "all")];
    for action in actions {
        let value = normalize_action_value(action);
        if action_types.iter().any(|o| o.value == value) {
            continue;
        }
        action_types.push(FilterOption::new(format_action_label(action), value));
    }

    let mut brokerage_options = vec![FilterOption::new("All brokerages", "all")];
    brokerage_options.extend(
        brokerages
            .iter()
            .map(|b| FilterOption::new(b.as_str(), b.as_str())),
    );

    FilterOptions {
        action_types,
        brokerages: brokerage_options,
        sort_by: SortMode::ALL
            .into_iter()
            .map(|mode| FilterOption::new(mode.label(), mode.value()))
            .collect(),
    }
}
