//! The `/inference` admission mediator: validates the request, mints a `job_id`, publishes the
//! job to the broker, and records it as `Queued`. Mirrors the source's `inference` endpoint body
//! (registry lookup and auth happen in the caller; this module covers steps 4-9 of the admission
//! algorithm).

use errors::*;
use job_id;
use mediators::{broker, job_store, validation};
use model::insertable;
use time_helpers;

use actix_web::web;
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use serde_json::Value;
use slog::Logger;

pub struct Mediator {
    pub pool: Pool<ConnectionManager<PgConnection>>,
    pub worker_token: String,
}

pub struct AdmissionResult {
    pub job_id: String,
    pub model_name: String,
    pub method: String,
}

impl Mediator {
    /// Runs the full admission pipeline for a validated `model_name`/`worker_id` pair. Returns
    /// `ErrorKind::QueueAbsent` if the worker's queue doesn't exist and `ErrorKind::Validation`
    /// for bad parameters; the caller is responsible for translating those into the JSON
    /// envelope and for not calling this at all when the model is unknown to the registry.
    pub async fn run(
        &self,
        log: &Logger,
        publisher: &broker::Publisher,
        worker_id: &str,
        model_name: &str,
        method: &str,
        client_addr: &str,
        mut payload: Value,
    ) -> Result<AdmissionResult> {
        validation::validate_method_and_params(method, &payload)?;

        let job_id = job_id::generate(client_addr);
        let now = time_helpers::epoch_now();

        {
            let obj = payload
                .as_object_mut()
                .ok_or_else(|| Error::from(ErrorKind::Validation("request body must be a JSON object".to_owned())))?;
            obj.insert("job_id".to_owned(), Value::String(job_id.clone()));
            obj.insert("token".to_owned(), Value::String(format!("Bearer {}", self.worker_token)));
            obj.insert("datetime".to_owned(), ::serde_json::json!(now));
        }

        publisher.publish(worker_id, &payload).await?;

        let pool = self.pool.clone();
        let job_id_clone = job_id.clone();
        let model_name_owned = model_name.to_owned();
        let method_owned = method.to_owned();

        let block_result = web::block(move || -> Result<()> {
            let conn = pool.get()?;
            let new_job = insertable::Job {
                job_id: job_id_clone,
                model_name: model_name_owned,
                method: method_owned.clone(),
                status: "Queued".to_owned(),
                datetime: now,
                queue_response_time_sec: -1.0,
                total_response_time_sec: -1.0,
                response: None,
                feedback: if method_owned == "predict" { Some(Value::String(String::new())) } else { None },
                has_feedback: false,
                initial_date: None,
                end_date: None,
                request_source: None,
            };
            job_store::insert_job(&conn, &new_job)?;
            Ok(())
        })
        .await;

        match block_result {
            Ok(inner) => inner.map_err(|e| {
                error!(log, "Failed to record job after publish; message is now orphaned"; "error" => e.to_string());
                e
            })?,
            Err(e) => {
                error!(log, "Blocking task panicked while recording job"; "error" => e.to_string());
                bail!(format!("blocking task failed: {}", e));
            }
        }

        Ok(AdmissionResult {
            job_id,
            model_name: model_name.to_owned(),
            method: method.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use mediators::job_admission::*;
    use serde_json::json;

    #[test]
    fn test_admission_result_shape() {
        let result = AdmissionResult {
            job_id: "abc".to_owned(),
            model_name: "sentiment".to_owned(),
            method: "predict".to_owned(),
        };
        assert_eq!("abc", result.job_id);
        let _ = json!({"features": ["x"]});
    }
}
