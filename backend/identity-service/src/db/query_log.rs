//! Optional per-query logging
//!
//! Enabled with `DATABASE_LOG=true`; bound parameters are included only when
//! `DATABASE_LOG_PARAMS=true` as well. Lines are emitted inside the current
//! request span, so they carry the request's method, path and user id.

use db_pool::env_utils::parse_env_flag;
use std::fmt::Display;
use std::future::Future;
use std::time::Instant;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryLog {
    pub enabled: bool,
    pub with_params: bool,
}

impl QueryLog {
    pub fn from_env() -> Self {
        Self {
            enabled: parse_env_flag("DATABASE_LOG"),
            with_params: parse_env_flag("DATABASE_LOG_PARAMS"),
        }
    }

    /// Parameters rendered for logging, or `None` when they must stay out of the logs.
    fn render(&self, params: &[&(dyn Display + Sync)]) -> Option<String> {
        (self.enabled && self.with_params).then(|| {
            params
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        })
    }

    /// Await `query`, logging its SQL and duration when enabled.
    pub async fn run<T, F>(
        &self,
        sql: &'static str,
        params: &[&(dyn Display + Sync)],
        query: F,
    ) -> Result<T, sqlx::Error>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        if !self.enabled {
            return query.await;
        }

        let rendered = self.render(params);
        let sql = compact(sql);
        let start = Instant::now();
        let result = query.await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match (&result, rendered) {
            (Ok(_), Some(params)) => {
                tracing::info!(target: "db", sql = %sql, params = %params, duration_ms, "Query executed")
            }
            (Ok(_), None) => tracing::info!(target: "db", sql = %sql, duration_ms, "Query executed"),
            (Err(e), Some(params)) => {
                tracing::error!(target: "db", sql = %sql, params = %params, error = %e, "Query failed")
            }
            (Err(e), None) => tracing::error!(target: "db", sql = %sql, error = %e, "Query failed"),
        }

        result
    }
}

/// Collapse the whitespace of a multi-line SQL literal onto one line.
fn compact(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}
