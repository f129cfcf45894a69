use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const STOCK_SYNC: &str = "stock_sync";

#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("process {0} not found in process_control")]
    MissingProcess(String),
    #[error("process {0} is already running or not found")]
    AlreadyRunning(String),
}

/// Persisted single-flight + cooldown state for one named long-running process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProcessControl {
    pub id: i64,
    pub process_name: String,
    pub is_running: bool,
    pub last_execution: Option<DateTime<Utc>>,
    pub interval_minutes: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessControl {
    pub fn next_allowed_execution(&self) -> Option<DateTime<Utc>> {
        self.last_execution
            .map(|last| last + Duration::minutes(i64::from(self.interval_minutes)))
    }

    /// A running process blocks; otherwise the cooldown must have fully elapsed.
    pub fn can_start_at(&self, now: DateTime<Utc>) -> bool {
        if self.is_running {
            return false;
        }
        match self.next_allowed_execution() {
            None => true,
            Some(next) => now > next,
        }
    }
}
