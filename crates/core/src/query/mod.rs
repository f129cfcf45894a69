//! Read side: paginated stock and recommendation listings, filter options and analytics.
//!
//! Queries run under the pool's default read-committed isolation with no extra locking.

pub mod filters;
pub mod options;
pub mod overview;
pub mod pagination;
pub mod stocks;

pub use filters::{SortMode, StockFilters};
pub use options::{filter_options, FilterOption, FilterOptions};
pub use overview::{overview, MarketOverview};
pub use pagination::{PageRequest, Paged, PaginationMeta};
pub use stocks::{get_stock, list_recommendations, list_stocks};
