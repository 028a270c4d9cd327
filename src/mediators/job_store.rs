//! The Store Adapter: every job/queue_registry read or write in the crate goes through one of
//! these functions. Kept thin and synchronous, the same way the teacher's `model.rs` helpers stay
//! thin -- domain logic belongs in the mediator that calls these, not here.

use errors::*;
use model::{insertable, Job, QueueRegistryEntry};
use schema::jobs;

use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde_json::Value;

pub fn insert_job(conn: &PgConnection, new_job: &insertable::Job) -> Result<Job> {
    diesel::insert_into(jobs::table)
        .values(new_job)
        .get_result(conn)
        .map_err(Error::from)
}

pub fn find_job_by_job_id(conn: &PgConnection, job_id: &str) -> Result<Option<Job>> {
    jobs::table
        .filter(jobs::job_id.eq(job_id))
        .first(conn)
        .optional()
        .map_err(Error::from)
}

/// Used by `/attstatus`. Returns whether a row was found and updated.
pub fn update_status(conn: &PgConnection, job_id: &str, status: &str) -> Result<bool> {
    let rows = diesel::update(jobs::table.filter(jobs::job_id.eq(job_id)))
        .set(jobs::status.eq(status))
        .execute(conn)?;
    Ok(rows > 0)
}

/// Used by `/retorno`. Returns whether a row was found and updated.
pub fn update_retorno(
    conn: &PgConnection,
    job_id: &str,
    status: &str,
    queue_response_time_sec: f64,
    total_response_time_sec: f64,
    response: &Value,
) -> Result<bool> {
    let rows = diesel::update(jobs::table.filter(jobs::job_id.eq(job_id)))
        .set((
            jobs::status.eq(status),
            jobs::queue_response_time_sec.eq(queue_response_time_sec),
            jobs::total_response_time_sec.eq(total_response_time_sec),
            jobs::response.eq(response),
        ))
        .execute(conn)?;
    Ok(rows > 0)
}

/// Used by `/feedback`. Returns whether a row was found and updated.
pub fn update_feedback(conn: &PgConnection, job_id: &str, feedback: &Value) -> Result<bool> {
    let rows = diesel::update(jobs::table.filter(jobs::job_id.eq(job_id)))
        .set((jobs::feedback.eq(feedback), jobs::has_feedback.eq(true)))
        .execute(conn)?;
    Ok(rows > 0)
}

/// Counts `predict` jobs that are `Done` with `has_feedback=true` in `[start, end)`, the same
/// query the `idx_jobs_feedback_hint` index is built for.
pub fn count_feedback_jobs(
    conn: &PgConnection,
    model_name: &str,
    start: f64,
    end: f64,
) -> Result<i64> {
    jobs::table
        .filter(jobs::model_name.eq(model_name))
        .filter(jobs::method.eq("predict"))
        .filter(jobs::status.eq("Done"))
        .filter(jobs::has_feedback.eq(true))
        .filter(jobs::datetime.ge(start))
        .filter(jobs::datetime.lt(end))
        .count()
        .get_result(conn)
        .map_err(Error::from)
}

/// Counts every `predict` job that is `Done`, regardless of date range or feedback -- used only
/// for the `total_jobs_predict_done` statistic in the feedback-aggregation response.
pub fn count_predict_done_jobs(conn: &PgConnection, model_name: &str) -> Result<i64> {
    jobs::table
        .filter(jobs::model_name.eq(model_name))
        .filter(jobs::method.eq("predict"))
        .filter(jobs::status.eq("Done"))
        .count()
        .get_result(conn)
        .map_err(Error::from)
}

/// Loads up to `limit` matching jobs ordered by `datetime` descending.
pub fn iter_feedback_jobs(
    conn: &PgConnection,
    model_name: &str,
    start: f64,
    end: f64,
    limit: i64,
) -> Result<Vec<Job>> {
    jobs::table
        .filter(jobs::model_name.eq(model_name))
        .filter(jobs::method.eq("predict"))
        .filter(jobs::status.eq("Done"))
        .filter(jobs::has_feedback.eq(true))
        .filter(jobs::datetime.ge(start))
        .filter(jobs::datetime.lt(end))
        .order(jobs::datetime.desc())
        .limit(limit)
        .get_results(conn)
        .map_err(Error::from)
}

/// Inserts a `get_feedback` job record; distinct from `insert_job` only in that the caller
/// already knows the extra `initial_date`/`end_date`/`request_source` fields are populated on the
/// `insertable::Job` passed in. Kept as a thin alias so call sites read the same as `/inference`.
pub fn insert_feedback_job(conn: &PgConnection, new_job: &insertable::Job) -> Result<Job> {
    insert_job(conn, new_job)
}

pub fn load_registry(conn: &PgConnection) -> Result<Vec<QueueRegistryEntry>> {
    use schema::queue_registry;
    queue_registry::table.load(conn).map_err(Error::from)
}

pub fn save_registry_entry(conn: &PgConnection, entry: &insertable::QueueRegistryEntry) -> Result<()> {
    use diesel::pg::upsert::excluded;
    use schema::queue_registry;

    diesel::insert_into(queue_registry::table)
        .values(entry)
        .on_conflict(queue_registry::model_name)
        .do_update()
        .set(queue_registry::worker_id.eq(excluded(queue_registry::worker_id)))
        .execute(conn)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use mediators::job_store::*;
    use model::insertable;
    use test_helpers;

    #[test]
    fn test_insert_and_find_job() {
        let conn = test_helpers::connection();

        let new_job = insertable::Job {
            job_id: "abc123".to_owned(),
            model_name: "sentiment".to_owned(),
            method: "predict".to_owned(),
            status: "Queued".to_owned(),
            datetime: 1.0,
            queue_response_time_sec: -1.0,
            total_response_time_sec: -1.0,
            response: None,
            feedback: None,
            has_feedback: false,
            initial_date: None,
            end_date: None,
            request_source: None,
        };

        let inserted = insert_job(&conn, &new_job).unwrap();
        assert_eq!("abc123", inserted.job_id);

        let found = find_job_by_job_id(&conn, "abc123").unwrap();
        assert!(found.is_some());
        assert_eq!("Queued", found.unwrap().status);

        assert!(find_job_by_job_id(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn test_update_status_and_retorno() {
        let conn = test_helpers::connection();

        let new_job = insertable::Job {
            job_id: "def456".to_owned(),
            model_name: "sentiment".to_owned(),
            method: "predict".to_owned(),
            status: "Queued".to_owned(),
            datetime: 1.0,
            queue_response_time_sec: -1.0,
            total_response_time_sec: -1.0,
            response: None,
            feedback: None,
            has_feedback: false,
            initial_date: None,
            end_date: None,
            request_source: None,
        };
        insert_job(&conn, &new_job).unwrap();

        assert!(update_status(&conn, "def456", "Running").unwrap());
        assert!(!update_status(&conn, "missing", "Running").unwrap());

        let response = ::serde_json::json!(["ok"]);
        assert!(update_retorno(&conn, "def456", "Done", 0.1, 0.2, &response).unwrap());

        let found = find_job_by_job_id(&conn, "def456").unwrap().unwrap();
        assert_eq!("Done", found.status);
        assert_eq!(Some(response), found.response);
    }
}
