use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use rusqlite::types::ToSql;
use rusqlite::{Connection, OptionalExtension, Params, Row, params};
use serde::Serialize;

/// Table name -> DDL, in creation order.
pub const SCHEMA: &[(&str, &str)] = &[(
    "topics",
    r#"
CREATE TABLE IF NOT EXISTS topics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    href TEXT NOT NULL UNIQUE,
    author TEXT DEFAULT '',
    text TEXT DEFAULT ''
);
"#,
)];

/// A scraped topic that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicDraft {
    pub title: String,
    pub href: String,
    pub author: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Topic {
    pub id: i64,
    pub title: String,
    pub href: String,
    pub author: String,
    pub text: String,
}

/// The subset of a topic the importer publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportableTopic {
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    Plain,
    OrIgnore,
}

pub struct Database {
    connection: Connection,
}

impl Database {
    /// Open (creating if absent) the database file in autocommit mode.
    pub fn open(db_path: &Path) -> Result<Self> {
        ensure_parent(db_path)?;
        let connection = Connection::open(db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        connection
            .busy_timeout(Duration::from_secs(5))
            .context("failed to set sqlite busy timeout")?;
        Ok(Self { connection })
    }

    pub fn open_in_memory() -> Result<Self> {
        let connection =
            Connection::open_in_memory().context("failed to open in-memory database")?;
        Ok(Self { connection })
    }

    /// Create every table in [`SCHEMA`] that does not exist yet.
    pub fn init_schema(&self) -> Result<Vec<String>> {
        let mut ensured = Vec::with_capacity(SCHEMA.len());
        for (table, statement) in SCHEMA {
            self.connection
                .execute_batch(statement)
                .with_context(|| format!("failed to create table `{table}`"))?;
            ensured.push((*table).to_string());
        }
        Ok(ensured)
    }

    pub fn table_exists(&self, table_name: &str) -> Result<bool> {
        let exists: i64 = self
            .connection
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                [table_name],
                |row| row.get(0),
            )
            .with_context(|| format!("failed to check sqlite_master for table {table_name}"))?;
        Ok(exists == 1)
    }

    /// Insert one row. Returns the new row id, or `None` when the row was
    /// ignored on conflict under [`InsertMode::OrIgnore`].
    pub fn insert(
        &self,
        table: &str,
        fields: &[(&str, &dyn ToSql)],
        mode: InsertMode,
    ) -> Result<Option<i64>> {
        if fields.is_empty() {
            bail!("insert into `{table}` requires at least one field");
        }
        validate_identifier(table)?;
        for (column, _) in fields {
            validate_identifier(column)?;
        }

        let verb = match mode {
            InsertMode::Plain => "INSERT",
            InsertMode::OrIgnore => "INSERT OR IGNORE",
        };
        let columns = fields
            .iter()
            .map(|(column, _)| *column)
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=fields.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("{verb} INTO {table} ({columns}) VALUES ({placeholders})");
        let values = fields.iter().map(|(_, value)| *value).collect::<Vec<_>>();

        let affected = self
            .connection
            .execute(&sql, values.as_slice())
            .with_context(|| format!("failed to insert into `{table}`"))?;
        if affected == 0 {
            return Ok(None);
        }
        Ok(Some(self.connection.last_insert_rowid()))
    }

    pub fn insert_topic(&self, draft: &TopicDraft) -> Result<Option<i64>> {
        self.insert(
            "topics",
            &[
                ("title", &draft.title as &dyn ToSql),
                ("href", &draft.href),
                ("author", &draft.author),
                ("text", &draft.text),
            ],
            InsertMode::OrIgnore,
        )
        .with_context(|| format!("failed to store topic {}", draft.href))
    }

    /// Run a parameterized read and map every row.
    pub fn query<T, P, F>(&self, sql: &str, params: P, map: F) -> Result<Vec<T>>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut statement = self
            .connection
            .prepare(sql)
            .with_context(|| format!("failed to prepare query: {sql}"))?;
        let rows = statement
            .query_map(params, map)
            .with_context(|| format!("failed to run query: {sql}"))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.with_context(|| format!("failed to read row of query: {sql}"))?);
        }
        Ok(out)
    }

    pub fn list_topics(&self) -> Result<Vec<Topic>> {
        self.query(
            "SELECT id, title, href, COALESCE(author, ''), COALESCE(text, '')
             FROM topics
             ORDER BY id ASC",
            [],
            |row| {
                Ok(Topic {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    href: row.get(2)?,
                    author: row.get(3)?,
                    text: row.get(4)?,
                })
            },
        )
    }

    pub fn topics_for_import(&self, sentinel_title: &str) -> Result<Vec<ImportableTopic>> {
        self.query(
            "SELECT title, COALESCE(text, '')
             FROM topics
             WHERE title != ?1
             ORDER BY id ASC",
            params![sentinel_title],
            |row| {
                Ok(ImportableTopic {
                    title: row.get(0)?,
                    text: row.get(1)?,
                })
            },
        )
    }

    pub fn topic_exists(&self, href: &str) -> Result<bool> {
        let found = self
            .connection
            .query_row("SELECT 1 FROM topics WHERE href = ?1", [href], |row| {
                row.get::<_, i64>(0)
            })
            .optional()
            .with_context(|| format!("failed to look up topic {href}"))?;
        Ok(found.is_some())
    }

    pub fn count_topics(&self) -> Result<usize> {
        let count: i64 = self
            .connection
            .query_row("SELECT COUNT(*) FROM topics", [], |row| row.get(0))
            .context("failed to count topics")?;
        usize::try_from(count).context("count does not fit into usize")
    }
}

fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        }
        _ => false,
    };
    if !valid {
        bail!("invalid SQL identifier: `{name}`");
    }
    Ok(())
}

fn ensure_parent(db_path: &Path) -> Result<()> {
    let Some(parent) = db_path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() || parent.exists() {
        return Ok(());
    }
    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create database parent directory {}",
            parent.display()
        )
    })
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use rusqlite::types::ToSql;

    use super::{Database, InsertMode, TopicDraft};

    fn draft(title: &str, href: &str) -> TopicDraft {
        TopicDraft {
            title: title.to_string(),
            href: href.to_string(),
            author: "tester".to_string(),
            text: format!("<p>{title}</p>"),
        }
    }

    fn database() -> Database {
        let db = Database::open_in_memory().expect("open");
        db.init_schema().expect("schema");
        db
    }

    #[test]
    fn init_schema_is_idempotent() {
        let db = Database::open_in_memory().expect("open");
        assert_eq!(db.init_schema().expect("first"), vec!["topics".to_string()]);
        assert_eq!(db.init_schema().expect("second"), vec!["topics".to_string()]);
        assert!(db.table_exists("topics").expect("exists"));
    }

    #[test]
    fn open_creates_file_and_parent_directories() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("topics.db");
        let db = Database::open(&path).expect("open");
        db.init_schema().expect("schema");
        assert!(path.exists());
    }

    #[test]
    fn insert_topic_ignores_duplicate_href() {
        let db = database();
        let first = db
            .insert_topic(&draft("Crash on start", "./viewtopic.php?f=8&t=1"))
            .expect("insert");
        let second = db
            .insert_topic(&draft("Crash on start (edited)", "./viewtopic.php?f=8&t=1"))
            .expect("insert again");

        assert_eq!(first, Some(1));
        assert_eq!(second, None);
        assert_eq!(db.count_topics().expect("count"), 1);
        let topics = db.list_topics().expect("list");
        assert_eq!(topics[0].title, "Crash on start");
    }

    #[test]
    fn plain_insert_surfaces_constraint_violation() {
        let db = database();
        let href = "./viewtopic.php?f=8&t=2".to_string();
        let title = "Title".to_string();
        db.insert(
            "topics",
            &[("title", &title as &dyn ToSql), ("href", &href)],
            InsertMode::Plain,
        )
        .expect("first insert");
        let error = db
            .insert(
                "topics",
                &[("title", &title as &dyn ToSql), ("href", &href)],
                InsertMode::Plain,
            )
            .expect_err("duplicate must fail");
        assert!(error.to_string().contains("failed to insert into `topics`"));
    }

    #[test]
    fn insert_applies_column_defaults() {
        let db = database();
        let title = "No author".to_string();
        let href = "./viewtopic.php?f=8&t=3".to_string();
        let id = db
            .insert(
                "topics",
                &[("title", &title as &dyn ToSql), ("href", &href)],
                InsertMode::Plain,
            )
            .expect("insert");
        assert_eq!(id, Some(1));

        let topics = db.list_topics().expect("list");
        assert_eq!(topics[0].author, "");
        assert_eq!(topics[0].text, "");
    }

    #[test]
    fn insert_rejects_unsafe_identifiers() {
        let db = database();
        let value = "x".to_string();
        let error = db
            .insert("topics; DROP TABLE topics", &[("title", &value as &dyn ToSql)], InsertMode::Plain)
            .expect_err("must fail");
        assert!(error.to_string().contains("invalid SQL identifier"));
        let error = db
            .insert("topics", &[("title)", &value as &dyn ToSql)], InsertMode::Plain)
            .expect_err("must fail");
        assert!(error.to_string().contains("invalid SQL identifier"));
        assert!(
            db.insert("topics", &[], InsertMode::Plain)
                .expect_err("must fail")
                .to_string()
                .contains("at least one field")
        );
    }

    #[test]
    fn topics_for_import_skips_sentinel_and_keeps_order() {
        let db = database();
        db.insert_topic(&draft("First bug", "./viewtopic.php?t=10"))
            .expect("insert");
        db.insert_topic(&draft("Как писать об ошибках", "./viewtopic.php?t=11"))
            .expect("insert");
        db.insert_topic(&draft("Second bug", "./viewtopic.php?t=12"))
            .expect("insert");

        let topics = db
            .topics_for_import("Как писать об ошибках")
            .expect("query");
        let titles = topics
            .iter()
            .map(|topic| topic.title.as_str())
            .collect::<Vec<_>>();
        assert_eq!(titles, vec!["First bug", "Second bug"]);
        assert_eq!(topics[0].text, "<p>First bug</p>");
    }

    #[test]
    fn query_maps_parameterized_rows() {
        let db = database();
        db.insert_topic(&draft("Alpha", "./viewtopic.php?t=1"))
            .expect("insert");
        db.insert_topic(&draft("Beta", "./viewtopic.php?t=2"))
            .expect("insert");

        let hrefs = db
            .query(
                "SELECT href FROM topics WHERE title LIKE ?1 ORDER BY id",
                ["B%"],
                |row| row.get::<_, String>(0),
            )
            .expect("query");
        assert_eq!(hrefs, vec!["./viewtopic.php?t=2".to_string()]);
        assert!(db.topic_exists("./viewtopic.php?t=1").expect("exists"));
        assert!(!db.topic_exists("./viewtopic.php?t=3").expect("exists"));
    }
}
