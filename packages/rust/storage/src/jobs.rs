//! Durable job queue on the `jobs` table.
//!
//! [`Storage`] implements both sides of the queue contract so a CLI process
//! can enqueue work and any later process can report on or execute it.
//! Continuation chains are stored as JSON alongside each job and fire in
//! the same transaction that records the parent's outcome.

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, params};
use tracing::{debug, info};

use questionhub_queue::{
    JobBackend, JobHandle, JobQueueClient, JobRequest, QueuedJob, new_job_id,
};
use questionhub_shared::{JobRecord, JobState, QuestionHubError, Result};

use crate::{Storage, storage_err};

const JOB_COLUMNS: &str =
    "id, name, args_json, kwargs_json, state, link_json, link_error_json, parent_id";

async fn insert_job(conn: &Connection, job: &QueuedJob) -> Result<()> {
    conn.execute(
        "INSERT INTO jobs (id, name, args_json, kwargs_json, state, link_json, link_error_json, parent_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            job.id.as_str(),
            job.name.as_str(),
            serde_json::to_string(&job.args)?,
            serde_json::to_string(&job.kwargs)?,
            job.state.as_str(),
            serde_json::to_string(&job.link)?,
            serde_json::to_string(&job.link_error)?,
            job.parent_id.as_deref(),
            Utc::now().to_rfc3339(),
        ],
    )
    .await
    .map_err(storage_err)?;
    Ok(())
}

async fn load_job(conn: &Connection, id: &str) -> Result<Option<QueuedJob>> {
    let mut rows = conn
        .query(
            &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
            params![id],
        )
        .await
        .map_err(storage_err)?;

    match rows.next().await.map_err(storage_err)? {
        Some(row) => Ok(Some(row_to_job(&row)?)),
        None => Ok(None),
    }
}

async fn set_state(conn: &Connection, id: &str, state: JobState) -> Result<()> {
    conn.execute(
        "UPDATE jobs SET state = ?1 WHERE id = ?2",
        params![state.as_str(), id],
    )
    .await
    .map_err(storage_err)?;
    Ok(())
}

fn row_to_job(row: &libsql::Row) -> Result<QueuedJob> {
    let args_json: String = row.get(2).map_err(storage_err)?;
    let kwargs_json: String = row.get(3).map_err(storage_err)?;
    let state: String = row.get(4).map_err(storage_err)?;
    let link_json: String = row.get(5).map_err(storage_err)?;
    let link_error_json: String = row.get(6).map_err(storage_err)?;

    Ok(QueuedJob {
        id: row.get::<String>(0).map_err(storage_err)?,
        name: row.get::<String>(1).map_err(storage_err)?,
        args: serde_json::from_str(&args_json)?,
        kwargs: serde_json::from_str(&kwargs_json)?,
        state: state.parse()?,
        link: serde_json::from_str(&link_json)?,
        link_error: serde_json::from_str(&link_error_json)?,
        parent_id: row.get::<String>(7).ok(),
    })
}

impl Storage {
    /// Full snapshot of stored jobs, continuations included, in enqueue order.
    pub async fn list_jobs(&self) -> Result<Vec<QueuedJob>> {
        let mut rows = self
            .conn
            .query(&format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY seq"), params![])
            .await
            .map_err(storage_err)?;

        let mut jobs = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            jobs.push(row_to_job(&row)?);
        }
        Ok(jobs)
    }

    /// Look up one job by id.
    pub async fn get_job(&self, id: &str) -> Result<Option<QueuedJob>> {
        load_job(&self.conn, id).await
    }
}

#[async_trait]
impl JobQueueClient for Storage {
    async fn submit(&self, request: JobRequest) -> Result<JobHandle> {
        self.check_writable()
            .map_err(|e| QuestionHubError::Enqueue(e.to_string()))?;
        let job = QueuedJob::from_request(new_job_id(), request);
        insert_job(&self.conn, &job)
            .await
            .map_err(|e| QuestionHubError::Enqueue(e.to_string()))?;
        debug!(id = %job.id, name = %job.name, "job stored");
        Ok(job.handle())
    }

    async fn list_records(&self) -> Result<Vec<JobRecord>> {
        let jobs = self
            .list_jobs()
            .await
            .map_err(|e| QuestionHubError::QueueUnavailable(e.to_string()))?;
        Ok(jobs.iter().map(QueuedJob::record).collect())
    }
}

#[async_trait]
impl JobBackend for Storage {
    async fn claim_next(&self) -> Result<Option<QueuedJob>> {
        self.check_writable()?;
        loop {
            let mut rows = self
                .conn
                .query(
                    &format!(
                        "SELECT {JOB_COLUMNS} FROM jobs WHERE state = 'PENDING' ORDER BY seq LIMIT 1"
                    ),
                    params![],
                )
                .await
                .map_err(storage_err)?;
            let Some(row) = rows.next().await.map_err(storage_err)? else {
                return Ok(None);
            };
            let mut job = row_to_job(&row)?;

            // Another process may claim the same row between the read and the update.
            let claimed = self
                .conn
                .execute(
                    "UPDATE jobs SET state = 'STARTED' WHERE id = ?1 AND state = 'PENDING'",
                    params![job.id.as_str()],
                )
                .await
                .map_err(storage_err)?;
            if claimed == 1 {
                job.state = JobState::Started;
                return Ok(Some(job));
            }
        }
    }

    async fn complete(&self, id: &str, outcome: JobState) -> Result<Option<JobHandle>> {
        self.check_writable()?;
        let tx = self.conn.transaction().await.map_err(storage_err)?;

        let mut job = load_job(&tx, id)
            .await?
            .ok_or_else(|| QuestionHubError::not_found("job", id))?;
        job.finish(outcome)?;
        set_state(&tx, id, outcome).await?;

        let follow_up = job.follow_up(outcome, new_job_id());
        if let Some(next) = &follow_up {
            insert_job(&tx, next).await?;
        }
        tx.commit().await.map_err(storage_err)?;

        info!(id, %outcome, follows = follow_up.as_ref().map(|j| j.name.as_str()), "job completed");
        Ok(follow_up.map(|j| j.handle()))
    }

    async fn revoke(&self, id: &str) -> Result<()> {
        self.check_writable()?;
        let mut job = load_job(&self.conn, id)
            .await?
            .ok_or_else(|| QuestionHubError::not_found("job", id))?;
        job.revoke()?;
        set_state(&self.conn, id, JobState::Revoked).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::test_storage;
    use questionhub_queue::Signature;
    use questionhub_shared::Kwargs;

    fn answer(hash: &str) -> JobRequest {
        let kwargs = Kwargs::from([
            ("question_id".to_string(), "q1".to_string()),
            ("user_email".to_string(), "ann@example.com".to_string()),
        ]);
        JobRequest::new("tasks.answer_question", vec![hash.into()], kwargs)
    }

    #[tokio::test]
    async fn submit_persists_pending_job() {
        let storage = test_storage().await;
        let handle = storage.submit(answer("h1")).await.expect("submit");

        let records = storage.list_records().await.expect("list");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, handle.id);
        assert_eq!(records[0].name, "tasks.answer_question");
        assert_eq!(records[0].args, "('h1',)");
        assert_eq!(records[0].state, JobState::Pending);

        let job = storage.get_job(&handle.id).await.unwrap().expect("job");
        assert_eq!(job.kwargs.get("user_email").map(String::as_str), Some("ann@example.com"));
    }

    #[tokio::test]
    async fn failure_chain_survives_storage() {
        let storage = test_storage().await;
        let chain = vec![
            Signature::new("tasks.update_kg"),
            Signature::new("tasks.answer_question"),
        ];
        let handle = storage.submit(answer("h1").on_failure(chain)).await.unwrap();

        let claimed = storage.claim_next().await.unwrap().expect("claimed");
        assert_eq!(claimed.id, handle.id);
        assert!(storage.claim_next().await.unwrap().is_none());

        let refresh = storage
            .complete(&handle.id, JobState::Failure)
            .await
            .unwrap()
            .expect("refresh enqueued");
        assert_eq!(refresh.name, "tasks.update_kg");

        let claimed = storage.claim_next().await.unwrap().expect("refresh claimed");
        assert_eq!(claimed.parent_id.as_deref(), Some(handle.id.as_str()));
        assert_eq!(claimed.kwargs.get("question_id").map(String::as_str), Some("q1"));

        let retry = storage
            .complete(&refresh.id, JobState::Success)
            .await
            .unwrap()
            .expect("retry enqueued");
        assert_eq!(retry.name, "tasks.answer_question");

        let states: Vec<JobState> = storage
            .list_records()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.state)
            .collect();
        assert_eq!(states, [JobState::Failure, JobState::Success, JobState::Pending]);
    }

    #[tokio::test]
    async fn revoke_marks_job() {
        let storage = test_storage().await;
        let handle = storage.submit(answer("h1")).await.unwrap();
        storage.revoke(&handle.id).await.expect("revoke");
        let records = storage.list_records().await.unwrap();
        assert_eq!(records[0].state, JobState::Revoked);
        assert!(storage.complete(&handle.id, JobState::Success).await.is_err());
    }

    #[tokio::test]
    async fn completing_unknown_job_is_not_found() {
        let storage = test_storage().await;
        let err = storage.complete("missing", JobState::Success).await.unwrap_err();
        assert!(matches!(err, QuestionHubError::NotFound { .. }));
    }
}
