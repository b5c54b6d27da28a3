//! Job repository: reads and writes for the `jobs` table.
//!
//! Functions here move [`Job`] values in and out of SQL. Status rules stay
//! with the caller: `insert` stores the status it is given, and `update`
//! asks the caller to derive it once the stored row has been consulted.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use super::{Database, DatabaseError};
use crate::job::{
    ImageRequest, Job, JobId, JobStatus, SourceId, StageQuery, TextRequest, NEW_CONTENT_SENTINEL,
};

/// A raw job row from the database.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: i64,
    pub created_at: String,
    pub status: String,
    pub owner: String,
    pub source_id: String,
    pub origin_subject: Option<String>,
    pub text_request: Option<String>,
    pub text_attempts: i64,
    pub generated_text: Option<String>,
    pub image_request: Option<String>,
    pub image_attempts: i64,
    pub generated_image_ref: Option<String>,
    pub post_attempts: i64,
    pub posted_id: Option<String>,
    pub rejection: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            created_at: row.get("created_at")?,
            status: row.get("status")?,
            owner: row.get("owner")?,
            source_id: row.get("source_id")?,
            origin_subject: row.get("origin_subject")?,
            text_request: row.get("text_request")?,
            text_attempts: row.get("text_attempts")?,
            generated_text: row.get("generated_text")?,
            image_request: row.get("image_request")?,
            image_attempts: row.get("image_attempts")?,
            generated_image_ref: row.get("generated_image_ref")?,
            post_attempts: row.get("post_attempts")?,
            posted_id: row.get("posted_id")?,
            rejection: row.get("rejection")?,
        })
    }

    /// Encodes a job, serializing the request columns to JSON.
    pub fn from_job(job: &Job) -> Result<Self, DatabaseError> {
        let text_request = job
            .text_request
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|source| DatabaseError::Serialization {
                column: "text_request",
                source,
            })?;
        let image_request = job
            .image_request
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|source| DatabaseError::Serialization {
                column: "image_request",
                source,
            })?;

        Ok(Self {
            id: job.id.0,
            created_at: format_timestamp(&job.created_at),
            status: job.status().as_str().to_string(),
            owner: job.owner.clone(),
            source_id: job.source_id.as_str().to_string(),
            origin_subject: job.origin_subject.clone(),
            text_request,
            text_attempts: i64::from(job.text_attempts),
            generated_text: job.generated_text.clone(),
            image_request,
            image_attempts: i64::from(job.image_attempts),
            generated_image_ref: job.generated_image_ref.clone(),
            post_attempts: i64::from(job.post_attempts),
            posted_id: job.posted_id.clone(),
            rejection: job.rejection.clone(),
        })
    }

    /// Decodes the row back into a job.
    pub fn into_job(self) -> Result<Job, DatabaseError> {
        let id = self.id;
        let corrupt = |reason: String| DatabaseError::CorruptRow { id, reason };
        let counter = |column: &str, value: i64| {
            u32::try_from(value).map_err(|_| corrupt(format!("{} out of range: {}", column, value)))
        };

        let text_request = self
            .text_request
            .as_deref()
            .map(serde_json::from_str::<TextRequest>)
            .transpose()
            .map_err(|source| DatabaseError::Serialization {
                column: "text_request",
                source,
            })?;
        let image_request = self
            .image_request
            .as_deref()
            .map(serde_json::from_str::<ImageRequest>)
            .transpose()
            .map_err(|source| DatabaseError::Serialization {
                column: "image_request",
                source,
            })?;

        Ok(Job {
            id: JobId(id),
            created_at: parse_timestamp(&self.created_at).map_err(corrupt)?,
            status: self.status.parse::<JobStatus>().map_err(corrupt)?,
            owner: self.owner,
            source_id: SourceId::from(self.source_id),
            origin_subject: self.origin_subject,
            text_request,
            text_attempts: counter("text_attempts", self.text_attempts)?,
            generated_text: self.generated_text,
            image_request,
            image_attempts: counter("image_attempts", self.image_attempts)?,
            generated_image_ref: self.generated_image_ref,
            post_attempts: counter("post_attempts", self.post_attempts)?,
            posted_id: self.posted_id,
            rejection: self.rejection,
        })
    }
}

/// Fixed-width RFC 3339 so lexical order in SQLite matches time order.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| format!("invalid created_at '{}': {}", value, e))
}

/// Query filter parameters for job listing.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub owner: Option<String>,
    pub status: Option<JobStatus>,
    pub source_id: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Number of jobs in one status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: JobStatus,
    pub count: u64,
}

/// Inserts a new job row and returns the id SQLite assigned.
pub fn insert(db: &Database, job: &Job) -> Result<JobId, DatabaseError> {
    let row = JobRow::from_job(job)?;
    db.write(|conn| {
        conn.execute(
            "INSERT INTO jobs (created_at, status, owner, source_id, origin_subject,
             text_request, text_attempts, generated_text, image_request, image_attempts,
             generated_image_ref, post_attempts, posted_id, rejection)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                row.created_at,
                row.status,
                row.owner,
                row.source_id,
                row.origin_subject,
                row.text_request,
                row.text_attempts,
                row.generated_text,
                row.image_request,
                row.image_attempts,
                row.generated_image_ref,
                row.post_attempts,
                row.posted_id,
                row.rejection,
            ],
        )?;
        Ok(JobId(conn.last_insert_rowid()))
    })
}

/// The part of a stored row that a later write may not undo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled {
    pub status: JobStatus,
    pub posted_id: Option<String>,
}

impl Settled {
    /// Carries the stored facts onto a copy that is about to be written.
    ///
    /// A published id is never lost or replaced, and a terminal status
    /// stays terminal, however stale `job` is.
    pub fn carry_onto(&self, job: &mut Job) {
        if self.posted_id.is_some() {
            job.posted_id = self.posted_id.clone();
        }
        if self.status.is_terminal() {
            job.status = self.status;
        }
    }
}

/// Reads the settled facts of row `id`, if it exists.
pub fn settled(conn: &Connection, id: JobId) -> Result<Option<Settled>, DatabaseError> {
    let row: Option<(String, Option<String>)> = conn
        .query_row(
            "SELECT status, posted_id FROM jobs WHERE id = ?1",
            params![id.0],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;

    row.map(|(status, posted_id)| {
        let status = status
            .parse::<JobStatus>()
            .map_err(|reason| DatabaseError::CorruptRow { id: id.0, reason })?;
        Ok(Settled { status, posted_id })
    })
    .transpose()
}

/// Writes every mutable column of `job` as given.
///
/// `id`, `created_at`, `owner` and `source_id` are never rewritten. Returns
/// false when no row has the job's id.
pub fn write_fields(conn: &Connection, job: &Job) -> Result<bool, DatabaseError> {
    let row = JobRow::from_job(job)?;
    let changed = conn.execute(
        "UPDATE jobs SET status=?2, origin_subject=?3, text_request=?4, text_attempts=?5,
         generated_text=?6, image_request=?7, image_attempts=?8, generated_image_ref=?9,
         post_attempts=?10, posted_id=?11, rejection=?12
         WHERE id=?1",
        params![
            row.id,
            row.status,
            row.origin_subject,
            row.text_request,
            row.text_attempts,
            row.generated_text,
            row.image_request,
            row.image_attempts,
            row.generated_image_ref,
            row.post_attempts,
            row.posted_id,
            row.rejection,
        ],
    )?;
    Ok(changed > 0)
}

/// Writes `job` back in one transaction: the stored row's settled facts
/// are carried onto `job`, `derive` sets its status from the merged fields,
/// then every column is written.
///
/// Returns the status the row held before, or `None` when it is missing.
pub fn update<D>(
    db: &Database,
    job: &mut Job,
    derive: D,
) -> Result<Option<JobStatus>, DatabaseError>
where
    D: FnOnce(&Job) -> JobStatus,
{
    db.write(|conn| {
        let Some(stored) = settled(conn, job.id)? else {
            return Ok(None);
        };
        stored.carry_onto(job);
        job.status = derive(job);
        write_fields(conn, job)?;
        Ok(Some(stored.status))
    })
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: JobId) -> Result<Option<Job>, DatabaseError> {
    let row = db.read(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM jobs WHERE id = ?1",
                params![id.0],
                JobRow::from_row,
            )
            .optional()?;
        Ok(row)
    })?;
    row.map(JobRow::into_job).transpose()
}

/// Finds the ledger entry for a content item seen by `owner`.
pub fn find_by_source(
    db: &Database,
    owner: &str,
    source_id: &str,
) -> Result<Option<Job>, DatabaseError> {
    let row = db.read(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM jobs WHERE owner = ?1 AND source_id = ?2 ORDER BY id ASC LIMIT 1",
                params![owner, source_id],
                JobRow::from_row,
            )
            .optional()?;
        Ok(row)
    })?;
    row.map(JobRow::into_job).transpose()
}

/// Returns up to `limit` jobs matching a stage query, oldest first.
pub fn pending(db: &Database, query: &StageQuery, limit: u32) -> Result<Vec<Job>, DatabaseError> {
    let mut sql = String::from("SELECT * FROM jobs WHERE status = ?1 AND owner = ?2");
    let mut param_values: Vec<Box<dyn ToSql>> = vec![
        Box::new(query.status().as_str()),
        Box::new(query.owner().to_string()),
    ];

    match query {
        StageQuery::Text { .. } => {}
        StageQuery::Image { backend, .. } => {
            param_values.push(Box::new(backend.clone()));
            sql.push_str(&format!(
                " AND json_extract(image_request, '$.type') = ?{}",
                param_values.len()
            ));
        }
        StageQuery::PublishReplies { .. } => {
            param_values.push(Box::new(NEW_CONTENT_SENTINEL));
            sql.push_str(&format!(" AND source_id != ?{}", param_values.len()));
        }
        StageQuery::PublishNewContent { .. } => {
            param_values.push(Box::new(NEW_CONTENT_SENTINEL));
            sql.push_str(&format!(" AND source_id = ?{}", param_values.len()));
        }
    }

    param_values.push(Box::new(i64::from(limit)));
    sql.push_str(&format!(
        " ORDER BY created_at ASC, id ASC LIMIT ?{}",
        param_values.len()
    ));

    let rows = fetch_rows(db, &sql, &param_values)?;
    rows.into_iter().map(JobRow::into_job).collect()
}

/// Queries jobs with filters, newest first, returning (jobs, total_count).
pub fn query(db: &Database, filter: &JobFilter) -> Result<(Vec<Job>, u64), DatabaseError> {
    let mut conditions = Vec::new();
    let mut param_values: Vec<Box<dyn ToSql>> = Vec::new();

    if let Some(ref owner) = filter.owner {
        param_values.push(Box::new(owner.clone()));
        conditions.push(format!("owner = ?{}", param_values.len()));
    }
    if let Some(status) = filter.status {
        param_values.push(Box::new(status.as_str()));
        conditions.push(format!("status = ?{}", param_values.len()));
    }
    if let Some(ref source_id) = filter.source_id {
        param_values.push(Box::new(source_id.clone()));
        conditions.push(format!("source_id = ?{}", param_values.len()));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let total: u64 = db.read(|conn| {
        let count_sql = format!("SELECT COUNT(*) FROM jobs {}", where_clause);
        let params_ref: Vec<&dyn ToSql> = param_values.iter().map(|p| p.as_ref()).collect();
        Ok(conn.query_row(&count_sql, params_ref.as_slice(), |r| r.get(0))?)
    })?;

    let limit = filter.limit.unwrap_or(100) as i64;
    let offset = filter.offset.unwrap_or(0) as i64;
    param_values.push(Box::new(limit));
    param_values.push(Box::new(offset));
    let query_sql = format!(
        "SELECT * FROM jobs {} ORDER BY created_at DESC, id DESC LIMIT ?{} OFFSET ?{}",
        where_clause,
        param_values.len() - 1,
        param_values.len()
    );

    let rows = fetch_rows(db, &query_sql, &param_values)?;
    let jobs = rows
        .into_iter()
        .map(JobRow::into_job)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((jobs, total))
}

/// Counts jobs in `status`, optionally for one owner.
pub fn count_by_status(
    db: &Database,
    owner: Option<&str>,
    status: JobStatus,
) -> Result<u64, DatabaseError> {
    db.read(|conn| {
        let count = conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = ?1 AND (?2 IS NULL OR owner = ?2)",
            params![status.as_str(), owner],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Counts jobs per status, in lifecycle order, including empty statuses.
pub fn status_counts(db: &Database, owner: Option<&str>) -> Result<Vec<StatusCount>, DatabaseError> {
    let raw: Vec<(String, u64)> = db.read(|conn| {
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM jobs WHERE (?1 IS NULL OR owner = ?1) GROUP BY status",
        )?;
        let rows = stmt
            .query_map(params![owner], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;

    let mut counts: Vec<StatusCount> = JobStatus::ALL
        .into_iter()
        .map(|status| StatusCount { status, count: 0 })
        .collect();
    for (status, count) in raw {
        match status.parse::<JobStatus>() {
            Ok(status) => {
                if let Some(entry) = counts.iter_mut().find(|c| c.status == status) {
                    entry.count = count;
                }
            }
            Err(e) => log::warn!("Skipping {} jobs with {}", count, e),
        }
    }
    Ok(counts)
}

/// Most recent non-failed new-content job for `owner` on `subject` created
/// after `since`. Subjects compare case-insensitively.
pub fn recent_new_content(
    db: &Database,
    owner: &str,
    subject: &str,
    since: &DateTime<Utc>,
) -> Result<Option<Job>, DatabaseError> {
    let row = db.read(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM jobs
                 WHERE owner = ?1 AND source_id = ?2 AND status != ?3
                   AND LOWER(origin_subject) = LOWER(?4) AND created_at > ?5
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                params![
                    owner,
                    NEW_CONTENT_SENTINEL,
                    JobStatus::Failed.as_str(),
                    subject,
                    format_timestamp(since),
                ],
                JobRow::from_row,
            )
            .optional()?;
        Ok(row)
    })?;
    row.map(JobRow::into_job).transpose()
}

fn fetch_rows(
    db: &Database,
    sql: &str,
    param_values: &[Box<dyn ToSql>],
) -> Result<Vec<JobRow>, DatabaseError> {
    db.read(|conn| {
        let params_ref: Vec<&dyn ToSql> = param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params_ref.as_slice(), JobRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::test_support::with_status;
    use crate::job::{derive, NewJob, TextParams};
    use chrono::{Duration, TimeZone};

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn stored(db: &Database, new: NewJob, status: JobStatus) -> Job {
        let mut job = with_status(new.into_job(), status);
        job.id = insert(db, &job).unwrap();
        job
    }

    #[test]
    fn test_insert_and_find_round_trip() {
        let db = db();
        let new = NewJob::for_item("testbot", "t1_abc")
            .with_subject("test")
            .with_text_request(TextRequest::new("<|sor|>").with_params(TextParams {
                temperature: 0.5,
                ..TextParams::default()
            }))
            .with_image_request(ImageRequest::new("scraper").with_prompt("cats"))
            .created_at(base_time());
        let job = stored(&db, new, JobStatus::NeedsText);

        let found = find_by_id(&db, job.id).unwrap().unwrap();
        assert_eq!(found.id, job.id);
        assert_eq!(found.created_at, base_time());
        assert_eq!(found.status(), JobStatus::NeedsText);
        assert_eq!(found.source_id, SourceId::item("t1_abc"));
        assert_eq!(found.origin_subject.as_deref(), Some("test"));
        assert_eq!(found.image_request, job.image_request);

        let text = found.text_request.unwrap();
        assert_eq!(text.prompt, "<|sor|>");
        assert!((text.params.temperature - 0.5).abs() < 1e-9);
        assert_eq!(text.params.top_k, 40);
    }

    #[test]
    fn test_ids_are_monotonic() {
        let db = db();
        let a = stored(&db, NewJob::for_item("bot", "t1_a"), JobStatus::Complete);
        let b = stored(&db, NewJob::for_item("bot", "t1_b"), JobStatus::Complete);
        assert!(b.id > a.id);
    }

    #[test]
    fn test_find_missing_returns_none() {
        let db = db();
        assert!(find_by_id(&db, JobId(42)).unwrap().is_none());
        assert!(find_by_source(&db, "bot", "t1_x").unwrap().is_none());
    }

    #[test]
    fn test_find_by_source_is_per_owner() {
        let db = db();
        stored(&db, NewJob::for_item("bot", "t1_a"), JobStatus::Complete);

        assert!(find_by_source(&db, "bot", "t1_a").unwrap().is_some());
        assert!(find_by_source(&db, "other", "t1_a").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_source_is_unique_violation() {
        let db = db();
        stored(&db, NewJob::for_item("bot", "t1_a"), JobStatus::Complete);
        let again = with_status(NewJob::for_item("bot", "t1_a").into_job(), JobStatus::Complete);
        let err = insert(&db, &again).unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[test]
    fn test_trigger_abort_is_not_unique_violation() {
        let db = db();
        db.write(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER refuse BEFORE INSERT ON jobs
                 BEGIN SELECT RAISE(ABORT, 'refused'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        let job = with_status(NewJob::for_item("bot", "t1_a").into_job(), JobStatus::Complete);
        let err = insert(&db, &job).unwrap_err();
        assert!(!err.is_unique_violation());
    }

    fn ready_reply(db: &Database) -> Job {
        let mut job = stored(
            db,
            NewJob::for_item("bot", "t1_a").with_text_request(TextRequest::new("p")),
            JobStatus::NeedsText,
        );
        job.generated_text = Some("hi".into());
        assert_eq!(update(db, &mut job, derive).unwrap(), Some(JobStatus::NeedsText));
        assert_eq!(job.status(), JobStatus::ReadyToPublish);
        job
    }

    #[test]
    fn test_update_derives_against_stored_row() {
        let db = db();
        let mut job = ready_reply(&db);
        let stale = job.clone();

        job.posted_id = Some("t1_first".into());
        job.post_attempts = 1;
        assert_eq!(
            update(&db, &mut job, derive).unwrap(),
            Some(JobStatus::ReadyToPublish)
        );
        assert_eq!(job.status(), JobStatus::Complete);

        // A copy read before the post went out, with the post budget spent.
        let mut stale = stale;
        stale.post_attempts = 1;
        assert_eq!(update(&db, &mut stale, derive).unwrap(), Some(JobStatus::Complete));
        assert_eq!(stale.posted_id.as_deref(), Some("t1_first"));
        assert_eq!(stale.status(), JobStatus::Complete);

        let found = find_by_id(&db, job.id).unwrap().unwrap();
        assert_eq!(found.posted_id.as_deref(), Some("t1_first"));
        assert_eq!(found.status(), JobStatus::Complete);
    }

    #[test]
    fn test_update_never_replaces_posted_id() {
        let db = db();
        let mut job = ready_reply(&db);
        job.posted_id = Some("t1_first".into());
        update(&db, &mut job, derive).unwrap();

        job.posted_id = Some("t1_second".into());
        update(&db, &mut job, derive).unwrap();
        assert_eq!(job.posted_id.as_deref(), Some("t1_first"));

        let found = find_by_id(&db, job.id).unwrap().unwrap();
        assert_eq!(found.posted_id.as_deref(), Some("t1_first"));
    }

    #[test]
    fn test_update_missing_row_reports_none() {
        let db = db();
        let mut job = NewJob::for_item("bot", "t1_a").into_job();
        job.id = JobId(99);
        assert_eq!(update(&db, &mut job, derive).unwrap(), None);
    }

    #[test]
    fn test_pending_is_fifo_and_filtered() {
        let db = db();
        let t = base_time();
        let later = stored(
            &db,
            NewJob::for_item("bot", "t1_later").created_at(t + Duration::minutes(5)),
            JobStatus::NeedsText,
        );
        let earlier = stored(
            &db,
            NewJob::for_item("bot", "t1_earlier").created_at(t),
            JobStatus::NeedsText,
        );
        stored(
            &db,
            NewJob::for_item("other", "t1_other").created_at(t),
            JobStatus::NeedsText,
        );
        stored(
            &db,
            NewJob::for_item("bot", "t1_done").created_at(t),
            JobStatus::Failed,
        );

        let jobs = pending(&db, &StageQuery::text("bot"), 10).unwrap();
        let ids: Vec<JobId> = jobs.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![earlier.id, later.id]);

        let limited = pending(&db, &StageQuery::text("bot"), 1).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, earlier.id);
    }

    #[test]
    fn test_pending_breaks_ties_by_id() {
        let db = db();
        let t = base_time();
        let first = stored(
            &db,
            NewJob::for_item("bot", "t1_a").created_at(t),
            JobStatus::NeedsText,
        );
        let second = stored(
            &db,
            NewJob::for_item("bot", "t1_b").created_at(t),
            JobStatus::NeedsText,
        );
        let jobs = pending(&db, &StageQuery::text("bot"), 10).unwrap();
        assert_eq!(jobs[0].id, first.id);
        assert_eq!(jobs[1].id, second.id);
    }

    #[test]
    fn test_pending_image_partitioned_by_backend() {
        let db = db();
        let scraper = stored(
            &db,
            NewJob::new_content("bot", "test").with_image_request(ImageRequest::new("scraper")),
            JobStatus::NeedsImage,
        );
        stored(
            &db,
            NewJob::new_content("bot", "test").with_image_request(ImageRequest::new("text2image")),
            JobStatus::NeedsImage,
        );

        let jobs = pending(&db, &StageQuery::image("bot", "scraper"), 10).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, scraper.id);
    }

    #[test]
    fn test_pending_publish_split_by_sentinel() {
        let db = db();
        let reply = stored(&db, NewJob::for_item("bot", "t1_a"), JobStatus::ReadyToPublish);
        let fresh = stored(
            &db,
            NewJob::new_content("bot", "test"),
            JobStatus::ReadyToPublish,
        );

        let replies = pending(&db, &StageQuery::publish_replies("bot"), 10).unwrap();
        let new_content = pending(&db, &StageQuery::publish_new_content("bot"), 10).unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].id, reply.id);
        assert_eq!(new_content.len(), 1);
        assert_eq!(new_content[0].id, fresh.id);
    }

    #[test]
    fn test_query_filters_and_counts() {
        let db = db();
        for i in 0..5 {
            stored(
                &db,
                NewJob::for_item("bot", format!("t1_{}", i)),
                JobStatus::Complete,
            );
        }
        stored(&db, NewJob::for_item("bot", "t1_x"), JobStatus::Failed);
        stored(&db, NewJob::for_item("other", "t1_y"), JobStatus::Complete);

        let filter = JobFilter {
            owner: Some("bot".into()),
            status: Some(JobStatus::Complete),
            limit: Some(2),
            ..Default::default()
        };
        let (jobs, total) = query(&db, &filter).unwrap();
        assert_eq!(total, 5);
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| j.owner == "bot"));
    }

    #[test]
    fn test_status_counts_cover_all_statuses() {
        let db = db();
        stored(&db, NewJob::for_item("bot", "t1_a"), JobStatus::Complete);
        stored(&db, NewJob::for_item("bot", "t1_b"), JobStatus::Complete);
        stored(&db, NewJob::for_item("bot", "t1_c"), JobStatus::NeedsText);
        stored(&db, NewJob::for_item("other", "t1_d"), JobStatus::Failed);

        let counts = status_counts(&db, Some("bot")).unwrap();
        assert_eq!(counts.len(), JobStatus::ALL.len());
        let complete = counts.iter().find(|c| c.status == JobStatus::Complete).unwrap();
        assert_eq!(complete.count, 2);
        let failed = counts.iter().find(|c| c.status == JobStatus::Failed).unwrap();
        assert_eq!(failed.count, 0);

        assert_eq!(count_by_status(&db, None, JobStatus::Failed).unwrap(), 1);
        assert_eq!(
            count_by_status(&db, Some("bot"), JobStatus::NeedsText).unwrap(),
            1
        );
    }

    #[test]
    fn test_recent_new_content_window() {
        let db = db();
        let now = base_time();
        stored(
            &db,
            NewJob::new_content("bot", "Test").created_at(now - Duration::hours(1)),
            JobStatus::NeedsText,
        );

        let since = now - Duration::hours(4);
        assert!(recent_new_content(&db, "bot", "test", &since)
            .unwrap()
            .is_some());
        assert!(recent_new_content(&db, "bot", "other", &since)
            .unwrap()
            .is_none());

        let narrow = now - Duration::minutes(30);
        assert!(recent_new_content(&db, "bot", "test", &narrow)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_recent_new_content_ignores_failed() {
        let db = db();
        let now = base_time();
        stored(
            &db,
            NewJob::new_content("bot", "test").created_at(now),
            JobStatus::Failed,
        );
        let since = now - Duration::hours(4);
        assert!(recent_new_content(&db, "bot", "test", &since)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_corrupt_status_is_reported() {
        let db = db();
        db.write(|conn| {
            conn.execute(
                "INSERT INTO jobs (created_at, status, owner, source_id)
                 VALUES ('2026-03-01T12:00:00.000000Z', 'bogus', 'bot', 't1_a')",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        let err = find_by_source(&db, "bot", "t1_a").unwrap_err();
        assert!(matches!(err, DatabaseError::CorruptRow { .. }));
    }

    #[test]
    fn test_timestamp_format_is_fixed_width() {
        let at = base_time();
        let formatted = format_timestamp(&at);
        assert_eq!(formatted, "2026-03-01T12:00:00.000000Z");
        assert_eq!(parse_timestamp(&formatted).unwrap(), at);
    }
}
