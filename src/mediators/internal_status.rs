//! The worker-facing internal endpoints: `/attstatus` (set `Running`, or any status transition)
//! and `/retorno` (the final result delivery). Both are invoked only by Executors bearing the
//! worker token.

use errors::*;
use mediators::{job_store, validation};

use diesel::pg::PgConnection;
use serde_json::Value;
use time_helpers;

pub fn attstatus(conn: &PgConnection, job_id: &str, new_status: &str) -> Result<()> {
    validation::validate_job_id_len(job_id)?;
    let status = validation::validate_status_str(new_status)?;

    let found = job_store::update_status(conn, job_id, status.as_str())?;
    if !found {
        bail!(ErrorKind::JobNotFound(job_id.to_owned()));
    }
    Ok(())
}

pub fn retorno(
    conn: &PgConnection,
    job_id: &str,
    status: &str,
    queue_response_time_sec: f64,
    response: &Value,
) -> Result<()> {
    validation::validate_job_id_len(job_id)?;
    let parsed_status = validation::validate_status_str(status)?;

    let job = job_store::find_job_by_job_id(conn, job_id)?
        .ok_or_else(|| Error::from(ErrorKind::JobNotFound(job_id.to_owned())))?;

    let total_response_time_sec = time_helpers::epoch_now() - job.datetime;

    let found = job_store::update_retorno(
        conn,
        job_id,
        parsed_status.as_str(),
        queue_response_time_sec,
        total_response_time_sec,
        response,
    )?;
    if !found {
        bail!(ErrorKind::JobNotFound(job_id.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use mediators::internal_status;
    use mediators::job_store;
    use model::insertable;
    use serde_json::json;
    use test_helpers;

    #[test]
    fn test_attstatus_not_found() {
        let conn = test_helpers::connection();
        assert!(internal_status::attstatus(&conn, "missing", "Running").is_err());
    }

    #[test]
    fn test_attstatus_invalid_status() {
        let conn = test_helpers::connection();
        assert!(internal_status::attstatus(&conn, "job-x", "Bogus").is_err());
    }

    #[test]
    fn test_attstatus_and_retorno() {
        let conn = test_helpers::connection();
        job_store::insert_job(
            &conn,
            &insertable::Job {
                job_id: "job-4".to_owned(),
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
            },
        )
        .unwrap();

        assert!(internal_status::attstatus(&conn, "job-4", "Running").is_ok());
        let job = job_store::find_job_by_job_id(&conn, "job-4").unwrap().unwrap();
        assert_eq!("Running", job.status);

        let response = json!(["ok"]);
        assert!(internal_status::retorno(&conn, "job-4", "Done", 0.5, &response).is_ok());
        let job = job_store::find_job_by_job_id(&conn, "job-4").unwrap().unwrap();
        assert_eq!("Done", job.status);
        assert_eq!(0.5, job.queue_response_time_sec);
    }
}
