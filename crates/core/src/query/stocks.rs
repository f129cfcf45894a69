use super::filters::StockFilters;
use super::pagination::{PageRequest, Paged, PaginationMeta};
use crate::domain::recommendation::RecommendationView;
use crate::domain::stock::{AnalystAction, Stock, StockView};
use crate::storage::{recommendations, stocks};
use anyhow::Context;
use std::collections::HashMap;

/// Actions attached to each stock of a list page.
pub const LIST_ACTIONS: i64 = 3;
/// Actions attached to a single stock lookup.
pub const DETAIL_ACTIONS: i64 = 5;

/// Filtered, sorted page of stocks, each with its most recent actions.
///
/// Phase one selects the page and fixes its order; phase two loads the bounded action lists and
/// attaches them without reordering.
pub async fn list_stocks(
    pool: &sqlx::PgPool,
    req: PageRequest,
    filters: &StockFilters,
) -> anyhow::Result<Paged<StockView>> {
    let total: i64 = filters
        .count_query()
        .build_query_scalar::<i64>()
        .fetch_one(pool)
        .await
        .with_context(|| format!("count stocks failed (filters={filters:?})"))?;

    let page: Vec<Stock> = filters
        .page_query(req)
        .build_query_as::<Stock>()
        .fetch_all(pool)
        .await
        .with_context(|| {
            format!(
                "select stock page failed (page={}, page_size={}, sort={})",
                req.page,
                req.page_size,
                filters.sort.value()
            )
        })?;

    let ids: Vec<i64> = page.iter().map(|s| s.id).collect();
    let actions = stocks::recent_actions_for_stocks(pool, &ids, LIST_ACTIONS).await?;

    Ok(Paged {
        data: attach_actions(page, actions),
        meta: PaginationMeta::new(req, total),
    })
}

pub async fn get_stock(pool: &sqlx::PgPool, symbol: &str) -> anyhow::Result<Option<StockView>> {
    let Some(stock) = stocks::find_stock_by_symbol(pool, symbol).await? else {
        return Ok(None);
    };
    let latest_actions = stocks::recent_actions(pool, stock.id, DETAIL_ACTIONS).await?;
    Ok(Some(StockView {
        stock,
        latest_actions,
    }))
}

/// Scored stocks, best first.
pub async fn list_recommendations(
    pool: &sqlx::PgPool,
    req: PageRequest,
) -> anyhow::Result<Paged<RecommendationView>> {
    let (scores, total) = recommendations::top_scores(pool, req.limit(), req.offset()).await?;

    let ids: Vec<i64> = scores.iter().map(|s| s.stock_id).collect();
    let stock_rows = stocks::stocks_by_ids(pool, &ids).await?;
    let actions = stocks::recent_actions_for_stocks(pool, &ids, LIST_ACTIONS).await?;

    let mut views: HashMap<i64, StockView> = attach_actions(stock_rows, actions)
        .into_iter()
        .map(|v| (v.stock.id, v))
        .collect();

    let mut data = Vec::with_capacity(scores.len());
    for score in scores {
        // Score rows cascade with their stock, so a miss means a concurrent delete.
        let Some(stock) = views.remove(&score.stock_id) else {
            tracing::warn!(stock_id = score.stock_id, "score without stock; skipping");
            continue;
        };
        data.push(RecommendationView { score, stock });
    }

    Ok(Paged {
        data,
        meta: PaginationMeta::new(req, total),
    })
}

/// Pairs each stock with its actions, keeping the order of `page` and of each stock's actions.
pub fn attach_actions(page: Vec<Stock>, actions: Vec<AnalystAction>) -> Vec<StockView> {
    let mut by_stock: HashMap<i64, Vec<AnalystAction>> = HashMap::new();
    for action in actions {
        by_stock.entry(action.stock_id).or_default().push(action);
    }

    page.into_iter()
        .map(|stock| StockView {
            latest_actions: by_stock.remove(&stock.id).unwrap_or_default(),
            stock,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn stock(id: i64, symbol: &str) -> Stock {
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        Stock {
            id,
            symbol: symbol.to_string(),
            name: format!("{symbol} Corp"),
            created_at: t,
            updated_at: t,
        }
    }

    fn action(id: i64, stock_id: i64, day: u32) -> AnalystAction {
        let t = Utc.with_ymd_and_hms(2025, 1, day, 0, 0, 0).unwrap();
        AnalystAction {
            id,
            stock_id,
            action: "reiterated by".to_string(),
            brokerage: "Citigroup".to_string(),
            rating_from: "Buy".to_string(),
            rating_to: "Buy".to_string(),
            target_from: String::new(),
            target_to: String::new(),
            analysis_date: t,
            created_at: t,
        }
    }

    #[test]
    fn attach_keeps_phase_one_order() {
        // Stock 2 has the newest action but was ordered last by the page query.
        let page = vec![stock(3, "AAPL"), stock(1, "MSFT"), stock(2, "ZZZ")];
        let actions = vec![
            action(10, 1, 5),
            action(11, 2, 9),
            action(12, 2, 8),
            action(13, 1, 4),
        ];

        let views = attach_actions(page, actions);
        let symbols: Vec<_> = views.iter().map(|v| v.stock.symbol.as_str()).collect();
        assert_eq!(symbols, ["AAPL", "MSFT", "ZZZ"]);

        assert!(views[0].latest_actions.is_empty());
        let msft: Vec<_> = views[1].latest_actions.iter().map(|a| a.id).collect();
        assert_eq!(msft, [10, 13]);
        let zzz: Vec<_> = views[2].latest_actions.iter().map(|a| a.id).collect();
        assert_eq!(zzz, [11, 12]);
    }

    #[test]
    fn attach_drops_actions_of_unselected_stocks() {
        let views = attach_actions(vec![stock(1, "MSFT")], vec![action(10, 99, 1)]);
        assert_eq!(views.len(), 1);
        assert!(views[0].latest_actions.is_empty());
    }
}
