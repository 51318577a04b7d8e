use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection};
use tracing::{debug, warn};
use url::Url;

use crate::app::ports::EventStore;
use crate::error::{ExtractorError, Result};
use crate::types::Event;

/// Event entities in a local SQLite file.
pub struct SqliteEventStore {
    conn: Mutex<Connection>,
}

impl SqliteEventStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS events (
                id                TEXT PRIMARY KEY,
                venue_id          TEXT NOT NULL,
                url               TEXT NOT NULL,
                title             TEXT,
                author            TEXT,
                description       TEXT NOT NULL,
                duration_minutes  INTEGER,
                schedule          TEXT NOT NULL,
                created_at        INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS events_url ON events (url);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ExtractorError::Store("event store lock poisoned".into()))
    }

    pub fn count_events(&self) -> Result<usize> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn existing_event_urls(&self) -> Result<HashSet<Url>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT DISTINCT url FROM events")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut urls = HashSet::new();
        for raw in rows {
            let raw = raw?;
            match Url::parse(&raw) {
                Ok(url) => {
                    urls.insert(url);
                }
                Err(e) => warn!(url = %raw, error = %e, "Skipping unparseable stored URL"),
            }
        }
        Ok(urls)
    }

    async fn persist(&self, events: &[Event]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let created_at = chrono::Utc::now().timestamp();
        for event in events {
            let schedule = serde_json::to_string(&event.schedule)?;
            tx.execute(
                "INSERT INTO events
                    (id, venue_id, url, title, author, description, duration_minutes, schedule, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    event.id.to_string(),
                    event.venue_id.to_string(),
                    event.url.as_str(),
                    event.title,
                    event.author,
                    event.description,
                    event.duration_minutes,
                    schedule,
                    created_at,
                ],
            )?;
        }
        tx.commit()?;
        debug!("Persisted {} events", events.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventRecord;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn event(url: &Url, id: Uuid) -> Event {
        let record = EventRecord {
            schedule: vec![NaiveDate::from_ymd_opt(2025, 5, 2)
                .unwrap()
                .and_hms_opt(19, 30, 0)
                .unwrap()],
            title: Some("Concierto".into()),
            author: None,
            description: "Piano solo".into(),
            duration_minutes: Some(75),
        };
        let mut event = Event::from_record(record, Uuid::new_v4(), url.clone());
        event.id = id;
        event
    }

    #[tokio::test]
    async fn persisted_urls_are_reported_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteEventStore::open(dir.path().join("events.db")).unwrap();
        let url = Url::parse("https://example.org/evento/1").unwrap();
        store
            .persist(&[event(&url, Uuid::new_v4()), event(&url, Uuid::new_v4())])
            .await
            .unwrap();

        let urls = store.existing_event_urls().await.unwrap();
        assert_eq!(urls.len(), 1);
        assert!(urls.contains(&url));
        assert_eq!(store.count_events().unwrap(), 2);
    }

    #[tokio::test]
    async fn a_failing_batch_leaves_nothing_behind() {
        let store = SqliteEventStore::in_memory().unwrap();
        let url = Url::parse("https://example.org/evento/2").unwrap();
        let id = Uuid::new_v4();
        // Duplicate primary key makes the second insert fail.
        let result = store.persist(&[event(&url, id), event(&url, id)]).await;
        assert!(result.is_err());
        assert_eq!(store.count_events().unwrap(), 0);
        assert!(store.existing_event_urls().await.unwrap().is_empty());
    }
}
