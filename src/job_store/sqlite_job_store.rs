//! SQLite-backed job persistence.

use super::schema::JOBS_VERSIONED_SCHEMAS;
use super::{JobStore, StoredJobSummary};
use crate::job_queue::jobs::{AttachmentUploadJob, JobBody, JobKind, MessageSendJob};
use crate::job_queue::{Job, JobData, JobFactoryRegistry, JobId};
use crate::sqlite_persistence::open_versioned_database;
use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
    registry: Arc<JobFactoryRegistry>,
}

struct JobRow {
    id: String,
    type_key: String,
    failure_count: u32,
    serialized_data: String,
}

impl SqliteJobStore {
    /// Opens an existing jobs database or creates a new one with the current schema.
    ///
    /// `registry` is used to turn stored rows back into jobs.
    pub fn new<P: AsRef<Path>>(db_path: P, registry: Arc<JobFactoryRegistry>) -> Result<Self> {
        let conn = open_versioned_database(db_path, JOBS_VERSIONED_SCHEMAS, "jobs")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            registry,
        })
    }

    /// Create an in-memory store for testing.
    #[cfg(test)]
    pub fn in_memory(registry: Arc<JobFactoryRegistry>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        JOBS_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            registry,
        })
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Mutex<Connection> {
        &self.conn
    }

    fn row_to_job_row(row: &rusqlite::Row) -> rusqlite::Result<JobRow> {
        Ok(JobRow {
            id: row.get("id")?,
            type_key: row.get("type_key")?,
            failure_count: row.get("failure_count")?,
            serialized_data: row.get("serialized_data")?,
        })
    }

    fn decode(&self, row: &JobRow) -> Option<Job> {
        let data = match JobData::from_json(&row.serialized_data) {
            Ok(data) => data,
            Err(e) => {
                warn!("Job {} ({}) has unreadable data: {}", row.id, row.type_key, e);
                return None;
            }
        };
        self.registry
            .instantiate(&row.type_key, &data)
            .map(|job| restore(row, job.kind().clone()))
    }

    fn query_rows(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<JobRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, Self::row_to_job_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn delete(&self, id: &JobId) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM jobs WHERE id = ?1", params![id.as_str()])?;
        Ok(())
    }
}

fn restore(row: &JobRow, kind: JobKind) -> Job {
    Job::restore(JobId::from_raw(row.id.as_str()), row.failure_count, kind)
}

fn upsert(conn: &Connection, job: &Job) -> Result<()> {
    let Some(id) = job.id() else {
        bail!("Cannot persist a {} job without an id", job.type_key());
    };
    let serialized_data = job
        .serialize()
        .to_json()
        .with_context(|| format!("Failed to encode job {}", id))?;
    conn.execute(
        "INSERT INTO jobs (id, type_key, failure_count, serialized_data, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            failure_count = excluded.failure_count,
            serialized_data = excluded.serialized_data",
        params![
            id.as_str(),
            job.type_key(),
            job.failure_count(),
            serialized_data,
            chrono::Utc::now().timestamp(),
        ],
    )?;
    Ok(())
}

impl JobStore for SqliteJobStore {
    fn persist_job(&self, job: &Job) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        upsert(&conn, job)
    }

    fn mark_job_as_succeeded(&self, id: &JobId) -> Result<()> {
        self.delete(id)
    }

    fn mark_job_as_failed_permanently(&self, id: &JobId) -> Result<()> {
        self.delete(id)
    }

    fn get_all_pending_jobs(&self, type_key: &str) -> Result<Vec<(JobId, Option<Job>)>> {
        let rows = self.query_rows(
            "SELECT id, type_key, failure_count, serialized_data FROM jobs
             WHERE type_key = ?1 AND canceled = 0 ORDER BY id",
            params![type_key],
        )?;
        Ok(rows
            .iter()
            .map(|row| (JobId::from_raw(row.id.as_str()), self.decode(row)))
            .collect())
    }

    fn is_job_canceled(&self, job: &Job) -> Result<bool> {
        let Some(id) = job.id() else {
            return Ok(false);
        };
        let conn = self.conn.lock().unwrap();
        let canceled = conn
            .query_row(
                "SELECT canceled FROM jobs WHERE id = ?1",
                params![id.as_str()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(canceled.map_or(true, |flag| flag != 0))
    }

    fn cancel_job(&self, id: &JobId) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE jobs SET canceled = 1 WHERE id = ?1",
            params![id.as_str()],
        )?;
        Ok(updated > 0)
    }

    fn delete_canceled_jobs(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM jobs WHERE canceled = 1", [])?;
        if deleted > 0 {
            info!("Deleted {} canceled jobs", deleted);
        }
        Ok(deleted)
    }

    fn replace_job(&self, retired_id: &JobId, replacement: &Job) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM jobs WHERE id = ?1", params![retired_id.as_str()])?;
        upsert(&tx, replacement)?;
        tx.commit()?;
        Ok(())
    }

    fn get_attachment_upload_job(&self, attachment_id: i64) -> Result<Option<Job>> {
        let rows = self.query_rows(
            "SELECT id, type_key, failure_count, serialized_data FROM jobs
             WHERE type_key = ?1 AND canceled = 0 ORDER BY id",
            params![AttachmentUploadJob::TYPE_KEY],
        )?;
        for row in &rows {
            let Ok(data) = JobData::from_json(&row.serialized_data) else {
                continue;
            };
            match AttachmentUploadJob::deserialize(&data) {
                Ok(upload) if upload.attachment_id == attachment_id => {
                    return Ok(Some(restore(row, upload.into())));
                }
                _ => {}
            }
        }
        Ok(None)
    }

    fn get_message_send_job(&self, id: &JobId) -> Result<Option<Job>> {
        let rows = self.query_rows(
            "SELECT id, type_key, failure_count, serialized_data FROM jobs
             WHERE id = ?1 AND type_key = ?2",
            params![id.as_str(), MessageSendJob::TYPE_KEY],
        )?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let data = JobData::from_json(&row.serialized_data)
            .with_context(|| format!("Send job {} has unreadable data", id))?;
        let send = MessageSendJob::deserialize(&data)
            .with_context(|| format!("Send job {} has an invalid payload", id))?;
        Ok(Some(restore(row, send.into())))
    }

    fn get_pending_type_keys(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT DISTINCT type_key FROM jobs ORDER BY type_key")?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(keys)
    }

    fn list_jobs(&self, type_key: Option<&str>) -> Result<Vec<StoredJobSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, type_key, failure_count, created_at, canceled FROM jobs
             WHERE ?1 IS NULL OR type_key = ?1 ORDER BY id",
        )?;
        let jobs = stmt
            .query_map(params![type_key], |row| {
                Ok(StoredJobSummary {
                    id: JobId::from_raw(row.get::<_, String>("id")?),
                    type_key: row.get("type_key")?,
                    failure_count: row.get("failure_count")?,
                    created_at: row.get("created_at")?,
                    canceled: row.get::<_, i64>("canceled")? != 0,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Destination;
    use crate::job_queue::jobs::TrimThreadJob;
    use crate::sqlite_persistence::BASE_DB_VERSION;
    use tempfile::tempdir;

    fn registry() -> Arc<JobFactoryRegistry> {
        Arc::new(JobFactoryRegistry::with_default_jobs())
    }

    fn stored(id: &str, kind: impl Into<JobKind>) -> Job {
        Job::restore(JobId::from_raw(id), 0, kind.into())
    }

    fn upload(attachment_id: i64, send_job_id: Option<&str>) -> AttachmentUploadJob {
        AttachmentUploadJob::new(
            attachment_id,
            1,
            Destination::Contact {
                public_key: "05".into(),
            },
            send_job_id.map(JobId::from_raw),
        )
    }

    #[test]
    fn test_create_new_database() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("jobs.db");

        let store = SqliteJobStore::new(&db_path, registry()).unwrap();
        assert!(db_path.exists());

        let conn = store.conn.lock().unwrap();
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(
            version as usize,
            BASE_DB_VERSION + JOBS_VERSIONED_SCHEMAS.len() - 1
        );
    }

    #[test]
    fn test_reopen_keeps_jobs() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("jobs.db");
        {
            let store = SqliteJobStore::new(&db_path, registry()).unwrap();
            store
                .persist_job(&stored("0001", TrimThreadJob::new(1, None)))
                .unwrap();
        }
        let store = SqliteJobStore::new(&db_path, registry()).unwrap();
        let pending = store.get_all_pending_jobs("TrimThreadJob").unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_opening_v0_database_migrates() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("jobs.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            JOBS_VERSIONED_SCHEMAS[0].create(&conn).unwrap();
        }
        let store = SqliteJobStore::new(&db_path, registry()).unwrap();
        let job = stored("0001", TrimThreadJob::new(1, None));
        store.persist_job(&job).unwrap();
        assert!(store.cancel_job(job.id().unwrap()).unwrap());
    }

    #[test]
    fn test_persist_requires_id() {
        let store = SqliteJobStore::in_memory(registry()).unwrap();
        let err = store
            .persist_job(&Job::new(TrimThreadJob::new(1, None)))
            .unwrap_err();
        assert!(err.to_string().contains("without an id"));
    }

    #[test]
    fn test_persist_updates_failure_count_in_place() {
        let store = SqliteJobStore::in_memory(registry()).unwrap();
        let job = stored("0001", TrimThreadJob::new(1, None));
        store.persist_job(&job).unwrap();
        store.persist_job(&job.clone().with_failure_count(3)).unwrap();

        let pending = store.get_all_pending_jobs("TrimThreadJob").unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].1.as_ref().unwrap().failure_count(), 3);
    }

    #[test]
    fn test_pending_jobs_sorted_and_broken_rows_flagged() {
        let store = SqliteJobStore::in_memory(registry()).unwrap();
        store
            .persist_job(&stored("0003", TrimThreadJob::new(3, None)))
            .unwrap();
        store
            .persist_job(&stored("0001", TrimThreadJob::new(1, None)))
            .unwrap();
        store
            .conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO jobs (id, type_key, failure_count, serialized_data, created_at)
                 VALUES ('0002', 'TrimThreadJob', 0, '{\"broken\": true', 0)",
                [],
            )
            .unwrap();

        let pending = store.get_all_pending_jobs("TrimThreadJob").unwrap();
        let ids: Vec<&str> = pending.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["0001", "0002", "0003"]);
        assert!(pending[0].1.is_some());
        assert!(pending[1].1.is_none());
        assert_eq!(pending[2].1.as_ref().unwrap().id().unwrap().as_str(), "0003");
    }

    #[test]
    fn test_success_and_permanent_failure_delete_the_row() {
        let store = SqliteJobStore::in_memory(registry()).unwrap();
        let a = stored("0001", TrimThreadJob::new(1, None));
        let b = stored("0002", TrimThreadJob::new(2, None));
        store.persist_job(&a).unwrap();
        store.persist_job(&b).unwrap();

        store.mark_job_as_succeeded(a.id().unwrap()).unwrap();
        store.mark_job_as_failed_permanently(b.id().unwrap()).unwrap();
        assert!(store.list_jobs(None).unwrap().is_empty());
    }

    #[test]
    fn test_cancellation() {
        let store = SqliteJobStore::in_memory(registry()).unwrap();
        let job = stored("0001", TrimThreadJob::new(1, None));
        store.persist_job(&job).unwrap();
        assert!(!store.is_job_canceled(&job).unwrap());

        assert!(store.cancel_job(job.id().unwrap()).unwrap());
        assert!(store.is_job_canceled(&job).unwrap());
        assert!(store.get_all_pending_jobs("TrimThreadJob").unwrap().is_empty());
        assert!(store.list_jobs(None).unwrap()[0].canceled);

        assert_eq!(store.delete_canceled_jobs().unwrap(), 1);
        assert!(!store.cancel_job(job.id().unwrap()).unwrap());
    }

    #[test]
    fn test_missing_row_counts_as_canceled() {
        let store = SqliteJobStore::in_memory(registry()).unwrap();
        let job = stored("0042", TrimThreadJob::new(1, None));
        assert!(store.is_job_canceled(&job).unwrap());
        // Never submitted, so nothing to cancel
        assert!(!store.is_job_canceled(&Job::new(TrimThreadJob::new(1, None))).unwrap());
    }

    #[test]
    fn test_replace_job() {
        let store = SqliteJobStore::in_memory(registry()).unwrap();
        let parent = stored("0001", TrimThreadJob::new(1, None));
        store.persist_job(&parent).unwrap();

        let replacement = stored("0002", TrimThreadJob::new(1, None)).with_failure_count(1);
        store.replace_job(parent.id().unwrap(), &replacement).unwrap();

        let jobs = store.list_jobs(None).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id.as_str(), "0002");
        assert_eq!(jobs[0].failure_count, 1);
    }

    #[test]
    fn test_replace_job_rolls_back_on_failure() {
        let store = SqliteJobStore::in_memory(registry()).unwrap();
        let parent = stored("0001", TrimThreadJob::new(1, None));
        store.persist_job(&parent).unwrap();

        // A replacement without an id cannot be written
        assert!(store
            .replace_job(parent.id().unwrap(), &Job::new(TrimThreadJob::new(1, None)))
            .is_err());
        assert_eq!(store.list_jobs(None).unwrap().len(), 1);
    }

    #[test]
    fn test_lookup_upload_and_send_jobs() {
        let store = SqliteJobStore::in_memory(registry()).unwrap();
        store
            .persist_job(&stored("0001", upload(10, Some("0003"))))
            .unwrap();
        store
            .persist_job(&stored("0002", upload(20, Some("0003"))))
            .unwrap();
        store
            .persist_job(&stored("0003", MessageSendJob::sample()))
            .unwrap();

        let found = store.get_attachment_upload_job(20).unwrap().unwrap();
        assert_eq!(found.id().unwrap().as_str(), "0002");
        assert!(store.get_attachment_upload_job(30).unwrap().is_none());

        let send = store
            .get_message_send_job(&JobId::from_raw("0003"))
            .unwrap()
            .unwrap();
        assert_eq!(send.kind(), &JobKind::MessageSend(MessageSendJob::sample()));
        // Ids of other job types are not send jobs
        assert!(store
            .get_message_send_job(&JobId::from_raw("0001"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_type_keys_and_listing() {
        let store = SqliteJobStore::in_memory(registry()).unwrap();
        store
            .persist_job(&stored("0001", TrimThreadJob::new(1, None)))
            .unwrap();
        store
            .persist_job(&stored("0002", MessageSendJob::sample()))
            .unwrap();

        assert_eq!(
            store.get_pending_type_keys().unwrap(),
            vec!["MessageSendJob".to_string(), "TrimThreadJob".to_string()]
        );
        let trims = store.list_jobs(Some("TrimThreadJob")).unwrap();
        assert_eq!(trims.len(), 1);
        assert_eq!(trims[0].id.as_str(), "0001");
    }
}
