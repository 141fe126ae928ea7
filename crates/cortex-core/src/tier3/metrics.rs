//! Named, scalar, last-write-wins metrics, scoped per namespace so one
//! workspace's telemetry never leaks into another's context bundle.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::DevContext;
use crate::error::Result;

impl DevContext {
    pub fn set_metric(&self, namespace: &str, name: &str, value: f64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO metrics (namespace, metric_name, value, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(namespace, metric_name) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![namespace, name, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn increment_metric(&self, namespace: &str, name: &str, delta: f64) -> Result<f64> {
        let conn = self.lock();
        let current: f64 = conn
            .query_row(
                "SELECT value FROM metrics WHERE namespace = ?1 AND metric_name = ?2",
                params![namespace, name],
                |r| r.get(0),
            )
            .optional()?
            .unwrap_or(0.0);
        let updated = current + delta;
        conn.execute(
            "INSERT INTO metrics (namespace, metric_name, value, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(namespace, metric_name) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![namespace, name, updated, Utc::now().to_rfc3339()],
        )?;
        Ok(updated)
    }

    pub fn get_metric(&self, namespace: &str, name: &str) -> Result<Option<f64>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT value FROM metrics WHERE namespace = ?1 AND metric_name = ?2",
            params![namespace, name],
            |r| r.get(0),
        )
        .optional()
        .map_err(crate::error::CortexError::from)
    }

    /// Every metric currently recorded for `namespace` - the "latest
    /// workspace metrics snapshot" the intent router folds into a
    /// context bundle.
    pub fn metrics_snapshot(&self, namespace: &str) -> Result<Vec<(String, f64)>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT metric_name, value FROM metrics WHERE namespace = ?1 ORDER BY metric_name",
        )?;
        let rows = stmt.query_map(params![namespace], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(crate::error::CortexError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> DevContext {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tier3.db");
        std::mem::forget(dir);
        DevContext::open(&path).unwrap()
    }

    #[test]
    fn set_then_get_round_trips() {
        let ctx = open_temp();
        ctx.set_metric("ns-a", "requests_total", 42.0).unwrap();
        assert_eq!(ctx.get_metric("ns-a", "requests_total").unwrap(), Some(42.0));
    }

    #[test]
    fn increment_accumulates_from_zero() {
        let ctx = open_temp();
        ctx.increment_metric("ns-a", "turns_total", 1.0).unwrap();
        ctx.increment_metric("ns-a", "turns_total", 1.0).unwrap();
        assert_eq!(ctx.get_metric("ns-a", "turns_total").unwrap(), Some(2.0));
    }

    #[test]
    fn namespaces_do_not_share_values() {
        let ctx = open_temp();
        ctx.set_metric("ns-a", "requests_total", 1.0).unwrap();
        assert_eq!(ctx.get_metric("ns-b", "requests_total").unwrap(), None);
    }

    #[test]
    fn snapshot_returns_only_the_requested_namespace() {
        let ctx = open_temp();
        ctx.set_metric("ns-a", "requests_total", 1.0).unwrap();
        ctx.set_metric("ns-a", "turns_total", 2.0).unwrap();
        ctx.set_metric("ns-b", "requests_total", 99.0).unwrap();
        let snapshot = ctx.metrics_snapshot("ns-a").unwrap();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().any(|(name, value)| name == "requests_total" && *value == 1.0));
    }
}
