use anyhow::Result;
use rusqlite::Connection;

use super::SqliteBackend;
use super::models::DocumentRow;

impl SqliteBackend {
    pub fn get_document(&self, key: &str) -> Result<Option<DocumentRow>> {
        self.with_conn(|conn| query_document(conn, key))
    }

    /// Upsert, bumping the revision. Returns the revision written.
    pub fn put_document(&self, key: &str, value: &str) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let revision = conn.query_row(
                "INSERT INTO documents (key, value, revision, updated_at)
                 VALUES (?1, ?2, 1, datetime('now'))
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     revision = documents.revision + 1,
                     updated_at = excluded.updated_at
                 RETURNING revision",
                (key, value),
                |row| row.get(0),
            )?;
            Ok(revision)
        })
    }

    /// Insert only if the key is absent. Returns whether the row was written.
    pub fn insert_document(&self, key: &str, value: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "INSERT INTO documents (key, value, revision, updated_at)
                 VALUES (?1, ?2, 1, datetime('now'))
                 ON CONFLICT(key) DO NOTHING",
                (key, value),
            )?;
            Ok(changed == 1)
        })
    }

    /// Overwrite only if the stored revision is still `expected`.
    pub fn update_document_at(&self, key: &str, value: &str, expected: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE documents
                 SET value = ?2, revision = revision + 1, updated_at = datetime('now')
                 WHERE key = ?1 AND revision = ?3",
                rusqlite::params![key, value, expected],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn delete_document(&self, key: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute("DELETE FROM documents WHERE key = ?1", [key])?;
            Ok(())
        })
    }

    pub fn list_documents(&self) -> Result<Vec<DocumentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT key, value, revision, updated_at FROM documents ORDER BY key")?;
            let rows = stmt
                .query_map([], map_document)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_document(conn: &Connection, key: &str) -> Result<Option<DocumentRow>> {
    let mut stmt =
        conn.prepare("SELECT key, value, revision, updated_at FROM documents WHERE key = ?1")?;

    let row = stmt.query_row([key], map_document).optional()?;

    Ok(row)
}

fn map_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok(DocumentRow {
        key: row.get(0)?,
        value: row.get(1)?,
        revision: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
