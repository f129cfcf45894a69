//! In-memory store with the same write semantics as [`super::PgStore`], for orchestrator tests.

use super::{CatalogStore, ProcessGuard};
use crate::domain::process::{GuardError, ProcessControl};
use crate::domain::recommendation::RecommendationScore;
use crate::domain::stock::{ActionFields, AnalystAction, Stock, WriteOutcome};
use crate::scoring::ScoreBreakdown;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct MemoryState {
    next_id: i64,
    pub stocks: BTreeMap<String, Stock>,
    pub actions: Vec<AnalystAction>,
    pub scores: BTreeMap<i64, RecommendationScore>,
    pub processes: BTreeMap<String, ProcessControl>,
    /// Symbols whose stock upsert fails, to exercise per-item error handling.
    pub failing_symbols: HashSet<String>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn sorted_actions(&self, stock_id: i64) -> Vec<AnalystAction> {
        let mut out: Vec<AnalystAction> = self
            .actions
            .iter()
            .filter(|a| a.stock_id == stock_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.analysis_date
                .cmp(&a.analysis_date)
                .then_with(|| b.id.cmp(&a.id))
        });
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn with_process(process: &str, interval_minutes: i32) -> Self {
        let store = Self::default();
        let now = Utc::now();
        {
            let mut state = store.state.lock().unwrap();
            let id = state.next_id();
            state.processes.insert(
                process.to_string(),
                ProcessControl {
                    id,
                    process_name: process.to_string(),
                    is_running: false,
                    last_execution: None,
                    interval_minutes,
                    created_at: now,
                    updated_at: now,
                },
            );
        }
        store
    }

    pub fn fail_symbol(&self, symbol: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_symbols
            .insert(symbol.to_string());
    }

    pub fn actions_for(&self, symbol: &str) -> Vec<AnalystAction> {
        let state = self.state.lock().unwrap();
        match state.stocks.get(symbol) {
            Some(stock) => state.sorted_actions(stock.id),
            None => Vec::new(),
        }
    }

    pub fn score_for(&self, symbol: &str) -> Option<RecommendationScore> {
        let state = self.state.lock().unwrap();
        let stock = state.stocks.get(symbol)?;
        state.scores.get(&stock.id).cloned()
    }

    pub fn process(&self, process: &str) -> Option<ProcessControl> {
        self.state.lock().unwrap().processes.get(process).cloned()
    }
}

#[async_trait::async_trait]
impl CatalogStore for MemoryStore {
    async fn upsert_stock(&self, symbol: &str, name: &str) -> anyhow::Result<Stock> {
        let mut state = self.state.lock().unwrap();
        anyhow::ensure!(
            !state.failing_symbols.contains(symbol),
            "upsert stocks failed (symbol={symbol})"
        );

        let now = Utc::now();
        if let Some(stock) = state.stocks.get_mut(symbol) {
            stock.name = name.to_string();
            stock.updated_at = now;
            return Ok(stock.clone());
        }

        let id = state.next_id();
        let stock = Stock {
            id,
            symbol: symbol.to_string(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        state.stocks.insert(symbol.to_string(), stock.clone());
        Ok(stock)
    }

    async fn upsert_action(
        &self,
        stock_id: i64,
        fields: &ActionFields,
    ) -> anyhow::Result<(AnalystAction, WriteOutcome)> {
        let mut state = self.state.lock().unwrap();

        let existing = state.actions.iter_mut().find(|a| {
            a.stock_id == stock_id
                && a.analysis_date == fields.analysis_date
                && a.brokerage == fields.brokerage
        });
        if let Some(row) = existing {
            if !fields.differs_from(row) {
                return Ok((row.clone(), WriteOutcome::Unchanged));
            }
            row.action = fields.action.clone();
            row.rating_from = fields.rating_from.clone();
            row.rating_to = fields.rating_to.clone();
            row.target_from = fields.target_from.clone();
            row.target_to = fields.target_to.clone();
            return Ok((row.clone(), WriteOutcome::Updated));
        }

        let id = state.next_id();
        let row = AnalystAction {
            id,
            stock_id,
            action: fields.action.clone(),
            brokerage: fields.brokerage.clone(),
            rating_from: fields.rating_from.clone(),
            rating_to: fields.rating_to.clone(),
            target_from: fields.target_from.clone(),
            target_to: fields.target_to.clone(),
            analysis_date: fields.analysis_date,
            created_at: Utc::now(),
        };
        state.actions.push(row.clone());
        Ok((row, WriteOutcome::Inserted))
    }

    async fn prune_actions(&self, stock_id: i64, keep: i64) -> anyhow::Result<u64> {
        let mut state = self.state.lock().unwrap();
        let keep_ids: HashSet<i64> = state
            .sorted_actions(stock_id)
            .into_iter()
            .take(usize::try_from(keep).unwrap_or(0))
            .map(|a| a.id)
            .collect();

        let before = state.actions.len();
        state
            .actions
            .retain(|a| a.stock_id != stock_id || keep_ids.contains(&a.id));
        Ok((before - state.actions.len()) as u64)
    }

    async fn recent_actions(&self, stock_id: i64, limit: i64) -> anyhow::Result<Vec<AnalystAction>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .sorted_actions(stock_id)
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .collect())
    }

    async fn upsert_score(
        &self,
        stock_id: i64,
        score: &ScoreBreakdown,
    ) -> anyhow::Result<RecommendationScore> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();
        let (id, created_at) = match state.scores.get(&stock_id) {
            Some(existing) => (existing.id, existing.created_at),
            None => (state.next_id(), now),
        };

        let row = RecommendationScore {
            id,
            stock_id,
            total_score: score.total_score,
            rating_score: score.rating_score,
            rating_change_score: score.rating_change_score,
            target_change_score: score.target_change_score,
            action_score: score.action_score,
            coverage_score: score.coverage_score,
            confidence: score.confidence.as_str().to_string(),
            reason: score.reason.clone(),
            latest_action_id: score.latest_action_id,
            calculated_at: now,
            created_at,
            updated_at: now,
        };
        state.scores.insert(stock_id, row.clone());
        Ok(row)
    }
}

#[async_trait::async_trait]
impl ProcessGuard for MemoryStore {
    async fn status(&self, process: &str) -> anyhow::Result<Option<ProcessControl>> {
        Ok(self.process(process))
    }

    async fn start(&self, process: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.processes.get_mut(process) {
            Some(control) if !control.is_running => {
                control.is_running = true;
                control.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(GuardError::AlreadyRunning(process.to_string()).into()),
        }
    }

    async fn finish(&self, process: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(control) = state.processes.get_mut(process) {
            let now = Utc::now();
            control.is_running = false;
            control.last_execution = Some(now);
            control.updated_at = now;
        }
        Ok(())
    }

    async fn force_stop(&self, process: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(control) = state.processes.get_mut(process) {
            control.is_running = false;
            control.updated_at = Utc::now();
        }
        Ok(())
    }
}
