//! Generic schema migration runner
//!
//! Shared by all four tier databases. Each tier defines its own `&'static
//! [Migration]` constant; this module only knows how to walk a slice and
//! apply what's missing, keyed off `PRAGMA user_version`, so every tier
//! reuses the same runner instead of four copy-pasted ones.

use rusqlite::Connection;

/// A single forward-only schema migration.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

fn get_current_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

fn set_current_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.pragma_update(None, "user_version", version)
}

/// Apply every migration in `migrations` whose version exceeds the
/// database's current `user_version`, in ascending order. Idempotent:
/// running twice against an up-to-date database applies nothing.
pub fn apply_migrations(conn: &Connection, migrations: &[Migration]) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;
    let mut highest = current_version;

    for migration in migrations {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                description = migration.description,
                "applying migration"
            );
            conn.execute_batch(migration.up)?;
            highest = highest.max(migration.version);
            applied += 1;
        }
    }

    if applied > 0 {
        set_current_version(conn, highest)?;
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIGRATIONS: &[Migration] = &[
        Migration {
            version: 1,
            description: "create t",
            up: "CREATE TABLE t (id INTEGER PRIMARY KEY);",
        },
        Migration {
            version: 2,
            description: "add column",
            up: "ALTER TABLE t ADD COLUMN name TEXT;",
        },
    ];

    #[test]
    fn applies_all_pending_migrations() {
        let conn = Connection::open_in_memory().unwrap();
        let applied = apply_migrations(&conn, MIGRATIONS).unwrap();
        assert_eq!(applied, 2);
        let version = get_current_version(&conn).unwrap();
        assert_eq!(version, 2);
    }

    #[test]
    fn is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn, MIGRATIONS).unwrap();
        let applied_again = apply_migrations(&conn, MIGRATIONS).unwrap();
        assert_eq!(applied_again, 0);
    }
}
