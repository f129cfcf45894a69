//! Stock list filters and the phase-one (page selection) statements built from them.

use super::pagination::PageRequest;
use crate::taxonomy::ActionKind;
use serde::Serialize;
use sqlx::{Postgres, QueryBuilder};

const MAX_ACTION_DATE: &str =
    "(SELECT MAX(a.analysis_date) FROM analyst_actions a WHERE a.stock_id = s.id)";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortMode {
    Newest,
    Oldest,
    #[default]
    TickerAz,
    CompanyAz,
    AnalysisNewest,
    AnalysisOldest,
}

impl SortMode {
    pub const ALL: [SortMode; 6] = [
        SortMode::Newest,
        SortMode::Oldest,
        SortMode::TickerAz,
        SortMode::CompanyAz,
        SortMode::AnalysisNewest,
        SortMode::AnalysisOldest,
    ];

    pub fn value(self) -> &'static str {
        match self {
            SortMode::Newest => "newest",
            SortMode::Oldest => "oldest",
            SortMode::TickerAz => "ticker-a-z",
            SortMode::CompanyAz => "company-a-z",
            SortMode::AnalysisNewest => "analysis-newest",
            SortMode::AnalysisOldest => "analysis-oldest",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortMode::Newest => "Newest",
            SortMode::Oldest => "Oldest",
            SortMode::TickerAz => "Ticker A-Z",
            SortMode::CompanyAz => "Company A-Z",
            SortMode::AnalysisNewest => "Analysis Date (Newest)",
            SortMode::AnalysisOldest => "Analysis Date (Oldest)",
        }
    }

    /// Unknown values sort alphabetically by symbol.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|mode| mode.value().eq_ignore_ascii_case(value))
            .unwrap_or_default()
    }

    fn push_order_by(self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push(" ORDER BY ");
        match self {
            SortMode::Newest => qb.push("s.updated_at DESC, s.symbol ASC"),
            SortMode::Oldest => qb.push("s.updated_at ASC, s.symbol ASC"),
            SortMode::TickerAz => qb.push("s.symbol ASC"),
            SortMode::CompanyAz => qb.push("s.name ASC, s.symbol ASC"),
            SortMode::AnalysisNewest => qb
                .push(MAX_ACTION_DATE)
                .push(" DESC NULLS LAST, s.symbol ASC"),
            SortMode::AnalysisOldest => qb
                .push(MAX_ACTION_DATE)
                .push(" ASC NULLS LAST, s.symbol ASC"),
        };
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StockFilters {
    pub action_kind: Option<ActionKind>,
    /// Case-insensitive substring of a brokerage name.
    pub brokerage: Option<String>,
    pub sort: SortMode,
}

impl StockFilters {
    /// Raw query-string values. "all", empty and unknown values disable a filter.
    pub fn from_params(
        action_type: Option<&str>,
        brokerage: Option<&str>,
        sort_by: Option<&str>,
    ) -> Self {
        let brokerage = brokerage
            .map(str::trim)
            .filter(|b| !b.is_empty() && !b.eq_ignore_ascii_case("all"))
            .map(str::to_string);

        Self {
            action_kind: action_type.and_then(ActionKind::from_filter),
            brokerage,
            sort: sort_by.map(SortMode::parse).unwrap_or_default(),
        }
    }

    fn push_where(&self, qb: &mut QueryBuilder<'static, Postgres>) {
        let mut sep = " WHERE ";

        if let Some(kind) = self.action_kind {
            qb.push(sep)
                .push(
                    "EXISTS (SELECT 1 FROM analyst_actions a \
                     WHERE a.stock_id = s.id AND LOWER(a.action) LIKE ",
                )
                .push_bind(action_pattern(kind))
                .push(")");
            sep = " AND ";
        }

        if let Some(brokerage) = &self.brokerage {
            qb.push(sep)
                .push(
                    "EXISTS (SELECT 1 FROM analyst_actions a \
                     WHERE a.stock_id = s.id AND LOWER(a.brokerage) LIKE ",
                )
                .push_bind(contains_pattern(brokerage))
                .push(")");
        }
    }

    /// Number of stocks matching the filters.
    pub fn count_query(&self) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM stocks s");
        self.push_where(&mut qb);
        qb
    }

    /// The requested page of matching stocks, in final display order.
    pub fn page_query(&self, req: PageRequest) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new(
            "SELECT s.id, s.symbol, s.name, s.created_at, s.updated_at FROM stocks s",
        );
        self.push_where(&mut qb);
        self.sort.push_order_by(&mut qb);
        qb.push(" LIMIT ")
            .push_bind(req.limit())
            .push(" OFFSET ")
            .push_bind(req.offset());
        qb
    }
}

/// `LIKE` pattern selecting actions of `kind`, matched against the lowercased action text.
pub fn action_pattern(kind: ActionKind) -> String {
    contains_pattern(kind.pattern())
}

/// Lowercased `LIKE` pattern matching `needle` anywhere, with wildcards in `needle` escaped.
pub fn contains_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for c in needle.to_lowercase().chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}
