//! The HTTP surface itself: one thin handler per endpoint, translating mediator results into the
//! JSON envelopes the source's `main.py` produces. Business logic lives in `mediators::`; these
//! handlers are responsible only for auth, parameter extraction, dispatch, and shaping the
//! response -- including the source's few deliberately asymmetric error shapes (a "model not
//! found" error carries `model_name`/`method`, a parameter-validation error does not) and its one
//! handler that must never log on failure.

use errors::*;
use gateway::auth;
use gateway::state::AppState;
use job_id;
use mediators::{feedback_aggregator, internal_status, job_admission, job_feedback, job_status, job_store};
use model::insertable;
use time_helpers;

use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::{json, Value};
use slog::Logger;

fn request_log(req: &HttpRequest, state: &AppState) -> Logger {
    req.extensions()
        .get::<Logger>()
        .cloned()
        .unwrap_or_else(|| state.log.clone())
}

fn client_addr(req: &HttpRequest) -> String {
    match req.peer_addr() {
        Some(addr) => format!("IP_{}:{}", addr.ip(), addr.port()),
        None => "IP_unknown:0".to_owned(),
    }
}

fn unauthorized_response() -> HttpResponse {
    HttpResponse::Unauthorized()
        .append_header(("WWW-Authenticate", "Bearer"))
        .json(json!({"status": "Error", "response": "missing or incorrect credentials"}))
}

fn error_json(message: impl Into<String>) -> Value {
    json!({"status": "Error", "response": message.into()})
}

fn string_param<'a>(payload: &'a Value, name: &str) -> Option<&'a str> {
    payload.get(name).and_then(Value::as_str)
}

/// Maps a mediator error into the text the response carries, logging it for anything that isn't
/// an expected validation-shaped failure. Never touches the sentinel file -- that's reserved for
/// the Gateway's own startup failures, not a single request hitting a transient dependency error.
fn dependent_service_failure(log: &Logger, context: &str, e: &Error) -> String {
    error!(log, "Dependent service failure"; "context" => context, "error" => e.to_string());
    "the request could not be completed because a dependent service is unreachable".to_owned()
}

fn admission_error_message(log: &Logger, e: &Error) -> String {
    match e.kind() {
        ErrorKind::Validation(msg) => msg.clone(),
        ErrorKind::QueueAbsent(_) => "no workers are currently listening for this model".to_owned(),
        _ => dependent_service_failure(log, "admission", e),
    }
}

fn store_error_message(log: &Logger, e: &Error) -> String {
    match e.kind() {
        ErrorKind::JobNotFound(job_id) => format!("could not find the job {}", job_id),
        ErrorKind::Validation(msg) => msg.clone(),
        _ => dependent_service_failure(log, "store", e),
    }
}

pub async fn root() -> HttpResponse {
    HttpResponse::Ok().json(json!({"response": "Hey!"}))
}

pub async fn version(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({"Stack Version": state.config.stack_version}))
}

pub async fn inference(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<Value>,
) -> HttpResponse {
    let log = request_log(&req, &state);
    if auth::require_bearer(&req, &state.config.api_token).is_err() {
        return unauthorized_response();
    }

    let payload = payload.into_inner();
    let model_name = match string_param(&payload, "model_name") {
        Some(s) => s.to_owned(),
        None => return HttpResponse::Ok().json(error_json("missing the 'model_name' parameter")),
    };
    let method = string_param(&payload, "method").unwrap_or("").to_owned();
    let addr = client_addr(&req);

    let lookup_state = state.clone();
    let lookup_model = model_name.clone();
    let worker_id = match web::block(move || -> Result<Option<String>> {
        let conn = lookup_state.pool.get()?;
        lookup_state.registry.refresh_if_needed(&lookup_state.log, &conn);
        Ok(lookup_state.registry.worker_for(&lookup_model))
    })
    .await
    {
        Ok(Ok(worker_id)) => worker_id,
        Ok(Err(e)) => {
            let message = dependent_service_failure(&log, "registry lookup", &e);
            return HttpResponse::Ok().json(json!({
                "job_id": "n/a", "model_name": model_name, "method": method,
                "status": "Error", "response": message
            }));
        }
        Err(e) => {
            return HttpResponse::Ok().json(json!({
                "job_id": "n/a", "model_name": model_name, "method": method,
                "status": "Error", "response": format!("blocking task failed: {}", e)
            }));
        }
    };

    let worker_id = match worker_id {
        Some(w) => w,
        None => {
            return HttpResponse::Ok().json(json!({
                "job_id": "n/a", "model_name": model_name, "method": method,
                "status": "Error", "response": "the model was not found"
            }));
        }
    };

    let mediator = job_admission::Mediator {
        pool: state.pool.clone(),
        worker_token: state.config.api_token_workers.clone(),
    };

    match mediator
        .run(&log, &state.publisher, &worker_id, &model_name, &method, &addr, payload)
        .await
    {
        Ok(result) => HttpResponse::Ok().json(json!({
            "job_id": result.job_id,
            "model_name": result.model_name,
            "method": result.method,
            "status": "Queued"
        })),
        Err(e) => {
            let message = admission_error_message(&log, &e);
            HttpResponse::Ok().json(json!({
                "job_id": "n/a", "model_name": model_name, "method": method,
                "status": "Error", "response": message
            }))
        }
    }
}

pub async fn status(req: HttpRequest, state: web::Data<AppState>, payload: web::Json<Value>) -> HttpResponse {
    let log = request_log(&req, &state);
    if auth::require_bearer(&req, &state.config.api_token).is_err() {
        return unauthorized_response();
    }

    let job_id = match string_param(&payload, "job_id") {
        Some(s) => s.to_owned(),
        None => return HttpResponse::Ok().json(error_json("missing the 'job_id' parameter")),
    };

    let block_state = state.clone();
    let block_job_id = job_id.clone();
    let result = web::block(move || {
        let conn = block_state.pool.get()?;
        job_status::run(&conn, &block_job_id)
    })
    .await;

    match result {
        Ok(Ok(value)) => HttpResponse::Ok().json(value),
        Ok(Err(e)) => HttpResponse::Ok().json(error_json(store_error_message(&log, &e))),
        Err(e) => HttpResponse::Ok().json(error_json(format!("blocking task failed: {}", e))),
    }
}

pub async fn feedback(req: HttpRequest, state: web::Data<AppState>, payload: web::Json<Value>) -> HttpResponse {
    let log = request_log(&req, &state);
    if auth::require_bearer(&req, &state.config.api_token).is_err() {
        return unauthorized_response();
    }

    let payload = payload.into_inner();
    let job_id = match string_param(&payload, "job_id") {
        Some(s) => s.to_owned(),
        None => return HttpResponse::Ok().json(json!({"job_id": "n/a", "status": "Error", "response": "missing the 'job_id' parameter"})),
    };

    let block_state = state.clone();
    let block_job_id = job_id.clone();
    let result = web::block(move || {
        let conn = block_state.pool.get()?;
        job_feedback::run(&conn, &block_job_id, &payload)
    })
    .await;

    match result {
        Ok(Ok(())) => HttpResponse::Ok().json(json!({"status": "Done", "response": "feedback recorded successfully"})),
        Ok(Err(e)) => HttpResponse::Ok().json(json!({"job_id": "n/a", "status": "Error", "response": store_error_message(&log, &e)})),
        Err(e) => HttpResponse::Ok().json(json!({"job_id": "n/a", "status": "Error", "response": format!("blocking task failed: {}", e)})),
    }
}

pub async fn get_feedback(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<Value>,
) -> HttpResponse {
    let log = request_log(&req, &state);
    if auth::require_bearer(&req, &state.config.api_token).is_err() {
        return unauthorized_response();
    }

    let payload = payload.into_inner();
    let model_name = match string_param(&payload, "model_name") {
        Some(s) => s.to_owned(),
        None => return HttpResponse::Ok().json(error_json("missing the 'model_name' parameter")),
    };
    let initial_date = match string_param(&payload, "initial_date") {
        Some(s) => s.to_owned(),
        None => return HttpResponse::Ok().json(error_json("missing the 'initial_date' parameter")),
    };
    let end_date = match string_param(&payload, "end_date") {
        Some(s) => s.to_owned(),
        None => return HttpResponse::Ok().json(error_json("missing the 'end_date' parameter")),
    };
    let addr = client_addr(&req);

    macro_rules! error_envelope {
        ($message:expr) => {
            HttpResponse::Ok().json(json!({
                "job_id": "n/a", "model_name": model_name, "method": "get_feedback",
                "status": "Error", "response": $message
            }))
        };
    }

    let lookup_state = state.clone();
    let lookup_model = model_name.clone();
    let worker_id = match web::block(move || -> Result<Option<String>> {
        let conn = lookup_state.pool.get()?;
        lookup_state.registry.refresh_if_needed(&lookup_state.log, &conn);
        Ok(lookup_state.registry.worker_for(&lookup_model))
    })
    .await
    {
        Ok(Ok(worker_id)) => worker_id,
        Ok(Err(e)) => return error_envelope!(dependent_service_failure(&log, "registry lookup", &e)),
        Err(e) => return error_envelope!(format!("blocking task failed: {}", e)),
    };

    let worker_id = match worker_id {
        Some(w) => w,
        None => return error_envelope!("the model was not found"),
    };

    let agg_state = state.clone();
    let agg_model = model_name.clone();
    let agg_initial = initial_date.clone();
    let agg_end = end_date.clone();
    let agg_result = web::block(move || {
        let conn = agg_state.pool.get()?;
        feedback_aggregator::run(&conn, &agg_state.limiter, &agg_model, &agg_initial, &agg_end)
    })
    .await;

    let aggregation = match agg_result {
        Ok(Ok(agg)) => agg,
        Ok(Err(e)) => {
            if let ErrorKind::RateLimited(next) = e.kind() {
                return HttpResponse::Ok().json(json!({
                    "job_id": "n/a", "model_name": model_name, "method": "get_feedback",
                    "status": "Error",
                    "response": format!(
                        "the feedback interval for this model was not respected; the next \
                         feedback may be requested at epoch timestamp {}",
                        next
                    ),
                    "next_feedback_timestamp": next,
                }));
            }
            let message = match e.kind() {
                ErrorKind::Validation(msg) => msg.clone(),
                _ => dependent_service_failure(&log, "feedback aggregation", &e),
            };
            return error_envelope!(message);
        }
        Err(e) => return error_envelope!(format!("blocking task failed: {}", e)),
    };

    let job_id = job_id::generate(&addr);
    let now = time_helpers::epoch_now();

    let mut worker_payload = payload.clone();
    match worker_payload.as_object_mut() {
        Some(obj) => {
            obj.insert("method".to_owned(), Value::String("get_feedback".to_owned()));
            obj.insert("y_pred".to_owned(), Value::Array(aggregation.y_pred));
            obj.insert("y_true".to_owned(), Value::Array(aggregation.y_true));
            obj.insert("api_metrics".to_owned(), aggregation.api_metrics);
            obj.insert("job_id".to_owned(), Value::String(job_id.clone()));
            obj.insert(
                "token".to_owned(),
                Value::String(format!("Bearer {}", state.config.api_token_workers)),
            );
            obj.insert("datetime_temp_queue".to_owned(), json!(now));
        }
        None => return error_envelope!("request body must be a JSON object"),
    }

    if let Err(e) = state.publisher.publish(&worker_id, &worker_payload).await {
        let message = match e.kind() {
            ErrorKind::QueueAbsent(_) => "no workers are currently listening for this model".to_owned(),
            _ => dependent_service_failure(&log, "get_feedback publish", &e),
        };
        return error_envelope!(message);
    }

    let insert_state = state.clone();
    let insert_job_id = job_id.clone();
    let insert_model = model_name.clone();
    let insert_initial = initial_date.clone();
    let insert_end = end_date.clone();
    let insert_addr = addr.clone();
    let insert_result = web::block(move || -> Result<()> {
        let conn = insert_state.pool.get()?;
        let new_job = insertable::Job {
            job_id: insert_job_id,
            model_name: insert_model,
            method: "get_feedback".to_owned(),
            status: "Queued".to_owned(),
            datetime: now,
            queue_response_time_sec: -1.0,
            total_response_time_sec: -1.0,
            response: None,
            feedback: None,
            has_feedback: false,
            initial_date: Some(insert_initial),
            end_date: Some(insert_end),
            request_source: Some(insert_addr),
        };
        job_store::insert_feedback_job(&conn, &new_job)?;
        Ok(())
    })
    .await;

    match insert_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!(log, "Failed to record get_feedback job after publish; message is now orphaned"; "error" => e.to_string());
        }
        Err(e) => {
            error!(log, "Blocking task panicked while recording get_feedback job"; "error" => e.to_string());
        }
    }

    HttpResponse::Ok().json(json!({
        "job_id": job_id,
        "model_name": model_name,
        "method": "get_feedback",
        "status": "Queued"
    }))
}

pub async fn attstatus(req: HttpRequest, state: web::Data<AppState>, payload: web::Json<Value>) -> HttpResponse {
    let log = request_log(&req, &state);
    if auth::require_bearer(&req, &state.config.api_token_workers).is_err() {
        return unauthorized_response();
    }

    let job_id = match string_param(&payload, "job_id") {
        Some(s) => s.to_owned(),
        None => return HttpResponse::Ok().json(error_json("missing the 'job_id' parameter")),
    };
    let new_status = match string_param(&payload, "newstatus") {
        Some(s) => s.to_owned(),
        None => return HttpResponse::Ok().json(error_json("missing the 'newstatus' parameter")),
    };

    let block_state = state.clone();
    let result = web::block(move || {
        let conn = block_state.pool.get()?;
        internal_status::attstatus(&conn, &job_id, &new_status)
    })
    .await;

    match result {
        Ok(Ok(())) => HttpResponse::Ok().json(json!({"status": "Done", "response": ""})),
        Ok(Err(e)) => HttpResponse::Ok().json(error_json(store_error_message(&log, &e))),
        Err(e) => HttpResponse::Ok().json(error_json(format!("blocking task failed: {}", e))),
    }
}

pub async fn retorno(req: HttpRequest, state: web::Data<AppState>, payload: web::Json<Value>) -> HttpResponse {
    let log = request_log(&req, &state);
    if auth::require_bearer(&req, &state.config.api_token_workers).is_err() {
        return unauthorized_response();
    }

    let payload = payload.into_inner();
    let job_id = match string_param(&payload, "job_id") {
        Some(s) => s.to_owned(),
        None => return HttpResponse::Ok().json(error_json("missing the 'job_id' parameter")),
    };
    let status = match string_param(&payload, "status") {
        Some(s) => s.to_owned(),
        None => return HttpResponse::Ok().json(error_json("missing the 'status' parameter")),
    };
    let queue_response_time_sec = match payload.get("queue_response_time_sec").and_then(Value::as_f64) {
        Some(v) => v,
        None => return HttpResponse::Ok().json(error_json("missing the 'queue_response_time_sec' parameter")),
    };
    let response = payload.get("response").cloned().unwrap_or(Value::Null);

    let block_state = state.clone();
    let result = web::block(move || {
        let conn = block_state.pool.get()?;
        internal_status::retorno(&conn, &job_id, &status, queue_response_time_sec, &response)
    })
    .await;

    match result {
        Ok(Ok(())) => HttpResponse::Ok().json(json!({"status": "Done", "response": ""})),
        Ok(Err(e)) => HttpResponse::Ok().json(error_json(store_error_message(&log, &e))),
        Err(e) => HttpResponse::Ok().json(error_json(format!("blocking task failed: {}", e))),
    }
}

pub async fn advworkid(req: HttpRequest, state: web::Data<AppState>, payload: web::Json<Value>) -> HttpResponse {
    let payload = payload.into_inner();

    // No logging on a credential mismatch here, deliberately: an attacker (or a misconfigured
    // worker) retrying this endpoint must not be able to flood the log file.
    let cred = string_param(&payload, "advworkid_cred").unwrap_or("");
    if cred != state.config.advworkid_credential {
        return HttpResponse::Ok().json(json!({
            "status": "Error",
            "response": "the credential to announce the worker_id and model names is incorrect"
        }));
    }

    let log = request_log(&req, &state);

    let worker_id = string_param(&payload, "worker_id").unwrap_or("").to_owned();
    if worker_id.is_empty() {
        return HttpResponse::Ok().json(json!({"status": "Error", "response": "the 'worker_id' is empty"}));
    }

    let models: Vec<String> = payload
        .get("models")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect())
        .unwrap_or_default();

    let block_state = state.clone();
    let block_worker_id = worker_id.clone();
    let block_models = models.clone();
    let result = web::block(move || {
        let conn = block_state.pool.get()?;
        block_state.registry.apply_announcement(&block_state.log, &conn, &block_worker_id, &block_models)
    })
    .await;

    match result {
        Ok(Ok(())) => HttpResponse::Ok().json(json!({
            "status": "Done",
            "response": format!(
                "the worker_id {} and model(s) {:?} were announced successfully",
                worker_id, models
            )
        })),
        Ok(Err(e)) => {
            let message = dependent_service_failure(&log, "advworkid", &e);
            HttpResponse::Ok().json(json!({"status": "Error", "response": message}))
        }
        Err(e) => HttpResponse::Ok().json(json!({"status": "Error", "response": format!("blocking task failed: {}", e)})),
    }
}
