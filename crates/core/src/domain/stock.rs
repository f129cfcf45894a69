use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Stock {
    pub id: i64,
    pub symbol: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One brokerage's rating/target event for a stock, as retained in `analyst_actions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AnalystAction {
    pub id: i64,
    pub stock_id: i64,
    pub action: String,
    pub brokerage: String,
    pub rating_from: String,
    pub rating_to: String,
    pub target_from: String,
    pub target_to: String,
    pub analysis_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Field set written by ingestion. `(stock_id, analysis_date, brokerage)` is the natural key,
/// the remaining fields are compared to decide whether an existing row needs an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFields {
    pub action: String,
    pub brokerage: String,
    pub rating_from: String,
    pub rating_to: String,
    pub target_from: String,
    pub target_to: String,
    pub analysis_date: DateTime<Utc>,
}

impl ActionFields {
    /// True when any non-key field differs from the stored row.
    pub fn differs_from(&self, existing: &AnalystAction) -> bool {
        self.action != existing.action
            || self.rating_from != existing.rating_from
            || self.rating_to != existing.rating_to
            || self.target_from != existing.target_from
            || self.target_to != existing.target_to
    }
}

/// What a change-aware write did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockView {
    #[serde(flatten)]
    pub stock: Stock,
    pub latest_actions: Vec<AnalystAction>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stored(fields: &ActionFields) -> AnalystAction {
        AnalystAction {
            id: 1,
            stock_id: 7,
            action: fields.action.clone(),
            brokerage: fields.brokerage.clone(),
            rating_from: fields.rating_from.clone(),
            rating_to: fields.rating_to.clone(),
            target_from: fields.target_from.clone(),
            target_to: fields.target_to.clone(),
            analysis_date: fields.analysis_date,
            created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn fields() -> ActionFields {
        ActionFields {
            action: "target raised by".to_string(),
            brokerage: "The Goldman Sachs Group".to_string(),
            rating_from: "Neutral".to_string(),
            rating_to: "Buy".to_string(),
            target_from: "$10.00".to_string(),
            target_to: "$12.00".to_string(),
            analysis_date: Utc.with_ymd_and_hms(2025, 1, 2, 0, 30, 0).unwrap(),
        }
    }

    #[test]
    fn identical_fields_do_not_differ() {
        let f = fields();
        assert!(!f.differs_from(&stored(&f)));
    }

    #[test]
    fn any_changed_field_differs() {
        let f = fields();
        let existing = stored(&f);

        let mut changed = f.clone();
        changed.target_to = "$13.00".to_string();
        assert!(changed.differs_from(&existing));

        let mut changed = f.clone();
        changed.rating_from = "Hold".to_string();
        assert!(changed.differs_from(&existing));

        let mut changed = f;
        changed.action = "upgraded by".to_string();
        assert!(changed.differs_from(&existing));
    }

    #[test]
    fn stock_view_flattens_stock_fields() {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let view = StockView {
            stock: Stock {
                id: 3,
                symbol: "AAPL".to_string(),
                name: "Apple".to_string(),
                created_at: at,
                updated_at: at,
            },
            latest_actions: Vec::new(),
        };

        let v = serde_json::to_value(&view).unwrap();
        assert_eq!(v["symbol"], "AAPL");
        assert_eq!(v["latest_actions"], serde_json::json!([]));
    }
}
