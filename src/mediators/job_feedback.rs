//! The `/feedback` mediator: a job must be a `Done` `predict` job, and the feedback list must
//! match the job's `response` list in length and element types.

use errors::*;
use mediators::{job_store, validation};

use diesel::pg::PgConnection;
use serde_json::Value;

pub fn run(conn: &PgConnection, job_id: &str, payload: &Value) -> Result<()> {
    let feedback_value = payload
        .get("feedback")
        .ok_or_else(|| Error::from(ErrorKind::Validation("missing the 'feedback' parameter".to_owned())))?;
    let feedback = validation::validate_list_param(feedback_value, "feedback")?;

    let job = job_store::find_job_by_job_id(conn, job_id)?
        .ok_or_else(|| Error::from(ErrorKind::JobNotFound(job_id.to_owned())))?;

    if job.method != "predict" || job.status != "Done" {
        bail!(ErrorKind::Validation(format!(
            "feedback cannot be recorded: the job is not a 'predict' method and/or its status is \
             not 'Done'. Job {} -> method: {}; status: {}",
            job_id, job.method, job.status
        )));
    }

    let response = job
        .response_as_list()
        .ok_or_else(|| Error::from(ErrorKind::Validation("the job's response is not a list".to_owned())))?;

    validation::validate_feedback_matches_response(feedback, response)?;

    job_store::update_feedback(conn, job_id, feedback_value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use mediators::job_feedback;
    use mediators::job_store;
    use model::insertable;
    use serde_json::json;
    use test_helpers;

    #[test]
    fn test_feedback_on_unknown_job() {
        let conn = test_helpers::connection();
        let payload = json!({"feedback": ["y"]});
        assert!(job_feedback::run(&conn, "missing", &payload).is_err());
    }

    #[test]
    fn test_feedback_length_mismatch() {
        let conn = test_helpers::connection();
        job_store::insert_job(
            &conn,
            &insertable::Job {
                job_id: "job-2".to_owned(),
                model_name: "sentiment".to_owned(),
                method: "predict".to_owned(),
                status: "Done".to_owned(),
                datetime: 1.0,
                queue_response_time_sec: 0.1,
                total_response_time_sec: 0.2,
                response: Some(json!(["y"])),
                feedback: None,
                has_feedback: false,
                initial_date: None,
                end_date: None,
                request_source: None,
            },
        )
        .unwrap();

        let payload = json!({"feedback": ["y", "z"]});
        assert!(job_feedback::run(&conn, "job-2", &payload).is_err());
    }

    #[test]
    fn test_feedback_success() {
        let conn = test_helpers::connection();
        job_store::insert_job(
            &conn,
            &insertable::Job {
                job_id: "job-3".to_owned(),
                model_name: "sentiment".to_owned(),
                method: "predict".to_owned(),
                status: "Done".to_owned(),
                datetime: 1.0,
                queue_response_time_sec: 0.1,
                total_response_time_sec: 0.2,
                response: Some(json!(["y"])),
                feedback: None,
                has_feedback: false,
                initial_date: None,
                end_date: None,
                request_source: None,
            },
        )
        .unwrap();

        let payload = json!({"feedback": ["y"]});
        assert!(job_feedback::run(&conn, "job-3", &payload).is_ok());

        let job = job_store::find_job_by_job_id(&conn, "job-3").unwrap().unwrap();
        assert!(job.has_feedback);
    }
}
