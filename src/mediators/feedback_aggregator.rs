//! The `/get_feedback` mediator: validates the throttle and the date window, counts and loads
//! matching jobs, and assembles the `api_metrics` payload that rides along with the worker
//! dispatch. Mirrors `retrieve_docs_feedback` plus the surrounding aggregation block in the
//! source's `/get_feedback` endpoint.

use errors::*;
use mediators::{feedback_rate::FeedbackRateLimiter, job_store};

use chrono::NaiveDate;
use diesel::pg::PgConnection;
use serde_json::{json, Value};

const MAX_RANGE_DAYS: i64 = 90;
const MAX_LABELS: usize = 30_000;
const SECONDS_PER_DAY: f64 = 86_400.0;

pub struct Aggregation {
    pub y_pred: Vec<Value>,
    pub y_true: Vec<Value>,
    pub api_metrics: Value,
}

/// Parses `dd/mm/yyyy` and returns `(start_epoch, end_epoch_exclusive)` with the end extended by
/// one day so the final day is inclusive.
fn parse_date_range(initial_date: &str, end_date: &str) -> Result<(f64, f64)> {
    let initial = NaiveDate::parse_from_str(initial_date, "%d/%m/%Y")
        .chain_err(|| ErrorKind::Validation(format!("the initial date '{}' is invalid", initial_date)))?;
    let end = NaiveDate::parse_from_str(end_date, "%d/%m/%Y")
        .chain_err(|| ErrorKind::Validation(format!("the end date '{}' is invalid", end_date)))?;

    let start_epoch = initial.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp() as f64;
    let end_epoch = end.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp() as f64;
    let end_epoch_plus_1d = end_epoch + SECONDS_PER_DAY;

    if start_epoch > end_epoch {
        bail!(ErrorKind::Validation(format!(
            "the initial date {} is later than the end date {}",
            initial_date, end_date
        )));
    }

    let range_days = ((end_epoch_plus_1d - start_epoch) / SECONDS_PER_DAY) as i64;
    if range_days > MAX_RANGE_DAYS {
        bail!(ErrorKind::Validation(format!(
            "the range between {} and {} is {} days, but the maximum allowed for a feedback \
             query is {} days",
            initial_date,
            end_date,
            range_days - 1,
            MAX_RANGE_DAYS
        )));
    }

    Ok((start_epoch, end_epoch_plus_1d))
}

pub fn run(
    conn: &PgConnection,
    limiter: &FeedbackRateLimiter,
    model_name: &str,
    initial_date: &str,
    end_date: &str,
) -> Result<Aggregation> {
    limiter.check(model_name)?;

    let (start, end) = parse_date_range(initial_date, end_date)?;

    let total_jobs_has_feedback = job_store::count_feedback_jobs(conn, model_name, start, end)?;

    if total_jobs_has_feedback == 0 {
        limiter.commit(model_name);
        bail!(ErrorKind::Validation(format!(
            "no jobs with feedback were found between {} and {}. Choose another date range and \
             query again after 30 minutes",
            initial_date, end_date
        )));
    }

    let single_day = initial_date == end_date;
    if total_jobs_has_feedback > MAX_LABELS as i64 && !single_day {
        limiter.commit(model_name);
        bail!(ErrorKind::Validation(format!(
            "{} jobs with feedback were found between {} and {}, exceeding the maximum of {} \
             allowed for a feedback query. Choose a narrower date range and query again after 30 \
             minutes",
            total_jobs_has_feedback, initial_date, end_date, MAX_LABELS
        )));
    }

    let total_jobs_predict_done = job_store::count_predict_done_jobs(conn, model_name)?;
    let jobs = job_store::iter_feedback_jobs(conn, model_name, start, end, MAX_LABELS as i64)?;

    let mut y_pred = Vec::new();
    let mut y_true = Vec::new();
    let mut qty_computed_labels = 0usize;
    let mut total_jobs_computed_feedback = 0usize;

    for job in &jobs {
        let response = job.response_as_list().cloned().unwrap_or_default();
        if qty_computed_labels + response.len() > MAX_LABELS {
            break;
        }
        let feedback = job
            .feedback
            .as_ref()
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        qty_computed_labels += response.len();
        y_pred.extend(response);
        y_true.extend(feedback);
        total_jobs_computed_feedback += 1;
    }

    let mut labels_types: Vec<String> = y_true
        .iter()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();
    labels_types.sort();
    labels_types.dedup();

    let mut additional_info = String::new();
    if total_jobs_computed_feedback != total_jobs_has_feedback as usize {
        let skipped = total_jobs_has_feedback as usize - total_jobs_computed_feedback;
        let pct = (skipped as f64 / total_jobs_has_feedback as f64) * 100.0;
        additional_info.push_str(&format!(
            "Not all jobs with feedback were processed because the maximum of {} labels per \
             feedback query was reached. {} jobs ({:.2}% of jobs with feedback) were left out. ",
            MAX_LABELS, skipped, pct
        ));
    }
    let pct_feedback = (total_jobs_has_feedback as f64 / total_jobs_predict_done.max(1) as f64) * 100.0;
    additional_info.push_str(&format!(
        "Of the {} 'predict' jobs with status 'Done', {} received user feedback, {:.2}% of \
         completed 'predict' jobs",
        total_jobs_predict_done, total_jobs_has_feedback, pct_feedback
    ));

    let api_metrics = json!({
        "feedback_labels_types": labels_types,
        "qty_computed_labels": qty_computed_labels,
        "total_jobs_predict_done": total_jobs_predict_done,
        "total_jobs_has_feedback": total_jobs_has_feedback,
        "total_jobs_computed_feedback": total_jobs_computed_feedback,
        "additional_info": additional_info,
    });

    limiter.commit(model_name);

    Ok(Aggregation {
        y_pred,
        y_true,
        api_metrics,
    })
}

#[cfg(test)]
mod tests {
    use mediators::feedback_aggregator::*;
    use mediators::feedback_rate::FeedbackRateLimiter;
    use mediators::job_store;
    use model::insertable;
    use test_helpers;

    #[test]
    fn test_date_range_too_wide() {
        assert!(parse_date_range("01/01/2024", "02/04/2024").is_err());
    }

    #[test]
    fn test_date_range_inverted() {
        assert!(parse_date_range("02/01/2024", "01/01/2024").is_err());
    }

    #[test]
    fn test_date_range_ok() {
        assert!(parse_date_range("01/01/2024", "30/01/2024").is_ok());
    }

    #[test]
    fn test_no_feedback_jobs_commits_throttle() {
        let conn = test_helpers::connection();
        let limiter = FeedbackRateLimiter::new();
        let result = run(&conn, &limiter, "nonexistent-model", "01/01/2020", "02/01/2020");
        assert!(result.is_err());
        assert!(limiter.check("nonexistent-model").is_err());
    }

    #[test]
    fn test_aggregation_success() {
        let conn = test_helpers::connection();
        let limiter = FeedbackRateLimiter::new();

        job_store::insert_job(
            &conn,
            &insertable::Job {
                job_id: "fb-1".to_owned(),
                model_name: "sentiment".to_owned(),
                method: "predict".to_owned(),
                status: "Done".to_owned(),
                datetime: 1_700_000_000.0,
                queue_response_time_sec: 0.1,
                total_response_time_sec: 0.2,
                response: Some(::serde_json::json!(["pos"])),
                feedback: Some(::serde_json::json!(["pos"])),
                has_feedback: true,
                initial_date: None,
                end_date: None,
                request_source: None,
            },
        )
        .unwrap();

        let result = run(&conn, &limiter, "sentiment", "01/01/2020", "01/01/2030");
        assert!(result.is_ok());
        let agg = result.unwrap();
        assert_eq!(1, agg.y_pred.len());
        assert_eq!(1, agg.y_true.len());
    }
}
