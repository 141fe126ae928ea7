//! Namespace-scoped cache with expiry, for agents to stash short-lived
//! derived data (e.g. a parsed file outline) without going through Tier 2's
//! confidence machinery.

use chrono::{Duration, Utc};
use rusqlite::{params, OptionalExtension};

use super::{DevContext, DEFAULT_CACHE_TTL_DAYS};
use crate::error::Result;

impl DevContext {
    /// Store `value` under `(namespace, key)`, expiring after `ttl_days`
    /// (defaulting to [`DEFAULT_CACHE_TTL_DAYS`] when `None`).
    pub fn cache_put(
        &self,
        namespace: &str,
        key: &str,
        value: &str,
        ttl_days: Option<i64>,
    ) -> Result<()> {
        let conn = self.lock();
        let expires_at =
            (Utc::now() + Duration::days(ttl_days.unwrap_or(DEFAULT_CACHE_TTL_DAYS))).to_rfc3339();
        conn.execute(
            "INSERT INTO dev_cache (namespace, cache_key, value, expires_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(namespace, cache_key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
            params![namespace, key, value, expires_at],
        )?;
        Ok(())
    }

    /// Fetch `(namespace, key)`, returning `None` if absent or expired.
    /// Expired entries encountered on read are opportunistically deleted.
    pub fn cache_get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        let conn = self.lock();
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT value, expires_at FROM dev_cache WHERE namespace = ?1 AND cache_key = ?2",
                params![namespace, key],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((value, expires_at)) => {
                let expired = chrono::DateTime::parse_from_rfc3339(&expires_at)
                    .map(|e| e.with_timezone(&Utc) < Utc::now())
                    .unwrap_or(false);
                if expired {
                    conn.execute(
                        "DELETE FROM dev_cache WHERE namespace = ?1 AND cache_key = ?2",
                        params![namespace, key],
                    )?;
                    Ok(None)
                } else {
                    Ok(Some(value))
                }
            }
        }
    }

    /// Delete every expired entry, returning the number removed. Intended
    /// to be called periodically rather than relying solely on the
    /// opportunistic cleanup in [`DevContext::cache_get`].
    pub fn cache_sweep_expired(&self) -> Result<usize> {
        let conn = self.lock();
        let removed = conn.execute(
            "DELETE FROM dev_cache WHERE expires_at < ?1",
            params![Utc::now().to_rfc3339()],
        )?;
        Ok(removed)
    }
}
