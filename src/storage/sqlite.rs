//! SQLite storage backend

use super::traits::{
    AssociationCount, OpenStore, SlugFilter, StorageError, StorageResult, TagStore,
};
use crate::tagging::{Association, ExistingTag, RecordRef, Tag};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// How long a connection waits on another writer before reporting BUSY
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed tag store
///
/// Uses a single SQLite database file with a `tags` table (the registry) and
/// an `associations` table (the join rows). Thread-safe via internal mutex on
/// the connection. Several stores may open the same file; counter updates are
/// single statements, so they stay atomic across connections.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            r#"
            -- Tag registry: one row per slug per department
            CREATE TABLE IF NOT EXISTS tags (
                slug TEXT NOT NULL,
                department TEXT NOT NULL,
                name TEXT NOT NULL,
                count INTEGER NOT NULL DEFAULT 0 CHECK (count >= 0),
                suggested INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (department, slug)
            );

            CREATE INDEX IF NOT EXISTS idx_tags_suggested
                ON tags(suggested);

            -- Join rows: at most one per (record, slug)
            CREATE TABLE IF NOT EXISTS associations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                record_type TEXT NOT NULL,
                record_id TEXT NOT NULL,
                tag_name TEXT NOT NULL,
                tag_slug TEXT NOT NULL,
                department TEXT NOT NULL,
                tagged_at TEXT NOT NULL,
                UNIQUE (record_type, record_id, tag_slug)
            );

            CREATE INDEX IF NOT EXISTS idx_associations_slug
                ON associations(record_type, tag_slug);
            CREATE INDEX IF NOT EXISTS idx_associations_department
                ON associations(tag_slug, department);

            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn row_to_tag(row: &rusqlite::Row<'_>) -> rusqlite::Result<Tag> {
        Ok(Tag {
            slug: row.get(0)?,
            department: row.get(1)?,
            name: row.get(2)?,
            count: to_count(row.get(3)?),
            suggested: row.get(4)?,
        })
    }

    #[allow(clippy::type_complexity)]
    fn row_to_association_parts(
        row: &rusqlite::Row<'_>,
    ) -> rusqlite::Result<(String, String, String, String, String, String)> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
        ))
    }

    fn parts_to_association(
        (record_type, record_id, tag_name, tag_slug, department, tagged_at): (
            String,
            String,
            String,
            String,
            String,
            String,
        ),
    ) -> StorageResult<Association> {
        use chrono::DateTime;

        Ok(Association {
            record: RecordRef::new(record_type, record_id),
            tag_name,
            tag_slug,
            department,
            tagged_at: DateTime::parse_from_rfc3339(&tagged_at)
                .map_err(|e| StorageError::DateParse(e.to_string()))?
                .with_timezone(&chrono::Utc),
        })
    }

    fn collect_tags(conn: &Connection, sql: &str, params: &[&dyn rusqlite::ToSql]) -> StorageResult<Vec<Tag>> {
        let mut stmt = conn.prepare(sql)?;
        let tags = stmt
            .query_map(params, Self::row_to_tag)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }
}

/// Counts are stored as INTEGER; the CHECK constraint keeps them non-negative.
fn to_count(value: i64) -> u64 {
    value.max(0) as u64
}

fn to_sql_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl TagStore for SqliteStore {
    // === Tag Operations ===

    fn insert_tag(&self, tag: &Tag) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO tags (slug, department, name, count, suggested) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                tag.slug,
                tag.department,
                tag.name,
                to_sql_count(tag.count),
                tag.suggested
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                StorageError::DuplicateTag {
                    slug: tag.slug.clone(),
                    department: tag.department.clone(),
                }
            } else {
                StorageError::Database(e)
            }
        })?;
        Ok(())
    }

    fn load_tag(&self, slug: &str, department: &str) -> StorageResult<Option<Tag>> {
        let conn = self.conn()?;
        let tag = conn
            .query_row(
                "SELECT slug, department, name, count, suggested FROM tags
                 WHERE department = ?1 AND slug = ?2",
                params![department, slug],
                Self::row_to_tag,
            )
            .optional()?;
        Ok(tag)
    }

    fn delete_tag(&self, slug: &str, department: &str) -> StorageResult<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "DELETE FROM tags WHERE department = ?1 AND slug = ?2",
            params![department, slug],
        )?;
        Ok(rows > 0)
    }

    fn list_tags(&self, department: Option<&str>) -> StorageResult<Vec<Tag>> {
        let conn = self.conn()?;
        match department {
            Some(department) => Self::collect_tags(
                &conn,
                "SELECT slug, department, name, count, suggested FROM tags
                 WHERE department = ?1 ORDER BY slug",
                &[&department],
            ),
            None => Self::collect_tags(
                &conn,
                "SELECT slug, department, name, count, suggested FROM tags
                 ORDER BY department, slug",
                &[],
            ),
        }
    }

    fn suggested_tags(&self) -> StorageResult<Vec<Tag>> {
        let conn = self.conn()?;
        Self::collect_tags(
            &conn,
            "SELECT slug, department, name, count, suggested FROM tags
             WHERE suggested = 1 ORDER BY department, slug",
            &[],
        )
    }

    fn set_suggested(&self, slug: &str, department: &str, suggested: bool) -> StorageResult<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE tags SET suggested = ?3 WHERE department = ?1 AND slug = ?2",
            params![department, slug, suggested],
        )?;
        Ok(rows > 0)
    }

    fn increment_count(&self, template: &Tag, delta: u64) -> StorageResult<u64> {
        let conn = self.conn()?;
        // Single upsert statement: atomic even with other connections writing.
        let count: i64 = conn.query_row(
            r#"
            INSERT INTO tags (slug, department, name, count, suggested)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(department, slug) DO UPDATE SET
                count = count + excluded.count
            RETURNING count
            "#,
            params![
                template.slug,
                template.department,
                template.name,
                to_sql_count(delta),
                template.suggested
            ],
            |row| row.get(0),
        )?;
        Ok(to_count(count))
    }

    fn decrement_count(&self, slug: &str, department: &str, delta: u64) -> StorageResult<Option<u64>> {
        let conn = self.conn()?;
        let count: Option<i64> = conn
            .query_row(
                "UPDATE tags SET count = MAX(count - ?3, 0)
                 WHERE department = ?1 AND slug = ?2
                 RETURNING count",
                params![department, slug, to_sql_count(delta)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.map(to_count))
    }

    fn set_count(&self, template: &Tag, count: u64) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO tags (slug, department, name, count, suggested)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(department, slug) DO UPDATE SET
                count = excluded.count
            "#,
            params![
                template.slug,
                template.department,
                template.name,
                to_sql_count(count),
                template.suggested
            ],
        )?;
        Ok(())
    }

    // === Association Operations ===

    fn insert_association(&self, association: &Association) -> StorageResult<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            r#"
            INSERT OR IGNORE INTO associations
                (record_type, record_id, tag_name, tag_slug, department, tagged_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                association.record.record_type,
                association.record.record_id,
                association.tag_name,
                association.tag_slug,
                association.department,
                association.tagged_at.to_rfc3339(),
            ],
        )?;
        Ok(rows > 0)
    }

    fn has_association(&self, record: &RecordRef, slug: &str) -> StorageResult<bool> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM associations
                            WHERE record_type = ?1 AND record_id = ?2 AND tag_slug = ?3)",
            params![record.record_type, record.record_id, slug],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn delete_associations(&self, record: &RecordRef, slug: &str) -> StorageResult<Vec<Association>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "DELETE FROM associations
             WHERE record_type = ?1 AND record_id = ?2 AND tag_slug = ?3
             RETURNING record_type, record_id, tag_name, tag_slug, department, tagged_at",
        )?;
        let parts = stmt
            .query_map(
                params![record.record_type, record.record_id, slug],
                Self::row_to_association_parts,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        parts.into_iter().map(Self::parts_to_association).collect()
    }

    fn load_associations(&self, record: &RecordRef) -> StorageResult<Vec<Association>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT record_type, record_id, tag_name, tag_slug, department, tagged_at
             FROM associations WHERE record_type = ?1 AND record_id = ?2
             ORDER BY id",
        )?;
        let parts = stmt
            .query_map(
                params![record.record_type, record.record_id],
                Self::row_to_association_parts,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        parts.into_iter().map(Self::parts_to_association).collect()
    }

    fn existing_tags(&self, record_type: &str) -> StorageResult<Vec<ExistingTag>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT t.slug,
                   (SELECT MIN(n.tag_name) FROM associations n
                    WHERE n.record_type = ?1 AND n.tag_slug = t.slug),
                   SUM(t.count)
            FROM tags t
            WHERE EXISTS (
                SELECT 1 FROM associations a
                WHERE a.record_type = ?1
                  AND a.tag_slug = t.slug
                  AND a.department = t.department
            )
            GROUP BY t.slug
            ORDER BY t.slug ASC
            "#,
        )?;
        let tags = stmt
            .query_map(params![record_type], |row| {
                Ok(ExistingTag {
                    slug: row.get(0)?,
                    name: row.get(1)?,
                    count: to_count(row.get(2)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    fn find_records(&self, record_type: &str, filters: &[SlugFilter]) -> StorageResult<Vec<RecordRef>> {
        if filters.iter().any(SlugFilter::is_unsatisfiable) {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;

        let mut sql = String::from(
            "SELECT DISTINCT r.record_type, r.record_id FROM associations r WHERE r.record_type = ?",
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(record_type.to_string())];

        const CORRELATED: &str = " AND EXISTS (SELECT 1 FROM associations a
             WHERE a.record_type = r.record_type AND a.record_id = r.record_id AND a.tag_slug";

        for filter in filters {
            match filter {
                // One correlated existence check per slug
                SlugFilter::All(slugs) => {
                    for slug in slugs {
                        sql.push_str(CORRELATED);
                        sql.push_str(" = ?)");
                        params_vec.push(Box::new(slug.clone()));
                    }
                }
                // One existence check over the slug set
                SlugFilter::Any(slugs) => {
                    let placeholders = vec!["?"; slugs.len()].join(", ");
                    sql.push_str(CORRELATED);
                    sql.push_str(&format!(" IN ({}))", placeholders));
                    for slug in slugs {
                        params_vec.push(Box::new(slug.clone()));
                    }
                }
            }
        }

        sql.push_str(" ORDER BY r.record_id");

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();

        let records = stmt
            .query_map(params_refs.as_slice(), |row| {
                Ok(RecordRef::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    fn association_counts(&self) -> StorageResult<Vec<AssociationCount>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT a.tag_slug, a.department, COUNT(*),
                   (SELECT b.tag_name FROM associations b
                    WHERE b.tag_slug = a.tag_slug AND b.department = a.department
                    ORDER BY b.id DESC LIMIT 1)
            FROM associations a
            GROUP BY a.tag_slug, a.department
            ORDER BY a.department, a.tag_slug
            "#,
        )?;
        let counts = stmt
            .query_map([], |row| {
                Ok(AssociationCount {
                    slug: row.get(0)?,
                    department: row.get(1)?,
                    count: to_count(row.get(2)?),
                    name: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts)
    }
}
