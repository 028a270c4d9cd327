//! The `/status` mediator: looks up a job by `job_id` and projects it into the response shape,
//! including the method-specific keys the source adds for `predict` and `get_feedback` jobs.

use errors::*;
use mediators::{job_store, validation};

use diesel::pg::PgConnection;
use serde_json::{json, Value};

pub fn run(conn: &PgConnection, job_id: &str) -> Result<Value> {
    validation::validate_job_id_len(job_id)?;

    let job = job_store::find_job_by_job_id(conn, job_id)?
        .ok_or_else(|| Error::from(ErrorKind::JobNotFound(job_id.to_owned())))?;

    let mut out = json!({
        "job_id": job.job_id,
        "model_name": job.model_name,
        "method": job.method,
        "status": job.status,
        "datetime": job.datetime,
        "queue_response_time_sec": job.queue_response_time_sec,
        "total_response_time_sec": job.total_response_time_sec,
        "response": job.response,
    });

    let obj = out.as_object_mut().unwrap();
    if job.method == "predict" {
        obj.insert("feedback".to_owned(), job.feedback.clone().unwrap_or(Value::Null));
        obj.insert("has_feedback".to_owned(), Value::Bool(job.has_feedback));
    }
    if job.method == "get_feedback" {
        obj.insert("initial_date".to_owned(), job.initial_date.clone().map(Value::String).unwrap_or(Value::Null));
        obj.insert("end_date".to_owned(), job.end_date.clone().map(Value::String).unwrap_or(Value::Null));
        obj.insert("request_source".to_owned(), job.request_source.clone().map(Value::String).unwrap_or(Value::Null));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use mediators::job_status;
    use mediators::job_store;
    use model::insertable;
    use test_helpers;

    #[test]
    fn test_status_not_found() {
        let conn = test_helpers::connection();
        assert!(job_status::run(&conn, "missing").is_err());
    }

    #[test]
    fn test_status_found_predict() {
        let conn = test_helpers::connection();
        job_store::insert_job(
            &conn,
            &insertable::Job {
                job_id: "job-1".to_owned(),
                model_name: "sentiment".to_owned(),
                method: "predict".to_owned(),
                status: "Done".to_owned(),
                datetime: 1.0,
                queue_response_time_sec: 0.1,
                total_response_time_sec: 0.2,
                response: Some(::serde_json::json!(["y"])),
                feedback: None,
                has_feedback: false,
                initial_date: None,
                end_date: None,
                request_source: None,
            },
        )
        .unwrap();

        let result = job_status::run(&conn, "job-1").unwrap();
        assert_eq!("Done", result["status"]);
        assert_eq!(false, result["has_feedback"]);
    }

    #[test]
    fn test_status_job_id_too_long() {
        let conn = test_helpers::connection();
        let id: String = std::iter::repeat('a').take(101).collect();
        assert!(job_status::run(&conn, &id).is_err());
    }
}
