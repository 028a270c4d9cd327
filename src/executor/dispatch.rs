//! Per-delivery execution, run synchronously on its own OS thread (model calls may be
//! CPU-heavy): decode the message, validate it carries every field its `method` needs, report
//! `Running`, dispatch to the model under a panic guard, and report the final result. Never
//! returns an error -- every failure mode here becomes a logged line and an `Error`-status
//! `/retorno` report, since a faulty delivery must never take the worker down or leave a client
//! polling forever.

use config::ExecutorConfig;
use http_requester::HttpRequester;
use model_runtime::{Model, ModelRegistry};
use time_helpers;

use serde_json::{json, Value};
use slog::Logger;
use std::panic::{self, AssertUnwindSafe};

/// Every field a delivery needs, extracted up front so a missing one is caught before the
/// `/attstatus` "Running" POST ever fires -- mirroring `do_work`'s single `try/except KeyError`
/// guard around `job_id`/`model_name`/`method` and the method-specific parameters.
struct Fields {
    job_id: String,
    model_name: String,
    method: String,
    token: String,
    features: Option<Vec<Value>>,
    targets: Option<Vec<Value>>,
    y_pred: Option<Vec<Value>>,
    y_true: Option<Vec<Value>>,
}

pub fn handle(
    log: &Logger,
    config: &ExecutorConfig,
    models: &ModelRegistry,
    requester: &mut dyn HttpRequester,
    body: &[u8],
) {
    let message: Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            error!(log, "Failed to decode delivery body"; "error" => e.to_string());
            return;
        }
    };

    let datetime_field = match message.get("method").and_then(Value::as_str) {
        Some("get_feedback") => "datetime_temp_queue",
        _ => "datetime",
    };
    let enqueued_at = message
        .get(datetime_field)
        .and_then(Value::as_f64)
        .unwrap_or_else(time_helpers::epoch_now);
    let queue_response_time_sec = time_helpers::epoch_now() - enqueued_at;

    let attstatus_url = format!("{}/attstatus", config.api_url);
    let retorno_url = format!("{}/retorno", config.api_url);

    let (job_id, token, status, response, model_version) = match extract_fields(&message, &config.api_token_workers)
    {
        Err((job_id, message_text)) => {
            error!(log, "Delivery is missing a required field"; "job_id" => job_id.as_str(), "error" => message_text.as_str());
            (job_id, config.api_token_workers.clone(), "Error".to_owned(), json!(message_text), None)
        }
        Ok(fields) => {
            let running_ok = match requester.post_json(
                log,
                &attstatus_url,
                &fields.token,
                &json!({"job_id": fields.job_id, "newstatus": "Running"}),
            ) {
                Ok(resp) => resp.get("status").and_then(Value::as_str) == Some("Done"),
                Err(e) => {
                    error!(log, "Failed to report Running status"; "job_id" => fields.job_id.as_str(), "error" => e.to_string());
                    false
                }
            };

            if !running_ok {
                (fields.job_id, fields.token, "Error".to_owned(), json!("could not report the job as Running"), None)
            } else {
                match models.get(&fields.model_name) {
                    None => (
                        fields.job_id,
                        fields.token,
                        "Error".to_owned(),
                        json!(format!("model '{}' is not served by this worker", fields.model_name)),
                        None,
                    ),
                    Some(model) => {
                        let (status, response) = run_guarded(&*model, &fields, &message);
                        let model_version = Some(model.get_model_version());
                        (fields.job_id, fields.token, status, response, model_version)
                    }
                }
            }
        }
    };

    let mut retorno_body = json!({
        "job_id": job_id,
        "status": status,
        "queue_response_time_sec": queue_response_time_sec,
        "response": response,
    });
    if let Some(version) = model_version {
        retorno_body
            .as_object_mut()
            .unwrap()
            .insert("model_version".to_owned(), Value::String(version));
    }

    if let Err(e) = requester.post_json(log, &retorno_url, &token, &retorno_body) {
        error!(log, "Failed to report final status; acknowledging the delivery anyway";
            "job_id" => job_id.as_str(), "error" => e.to_string());
    }
}

/// Extracts `job_id`/`model_name`/`method` and whichever of `features`/`targets`/`y_pred`/
/// `y_true` the method needs. On the first missing key, returns the best `job_id` known so far
/// (so the `/retorno` report can still be attributed to the right job) alongside a message
/// describing what was missing.
fn extract_fields(message: &Value, default_token: &str) -> Result<Fields, (String, String)> {
    let job_id = message
        .get("job_id")
        .and_then(Value::as_str)
        .ok_or_else(|| ("n/a".to_owned(), "missing the 'job_id' parameter in the job message".to_owned()))?
        .to_owned();

    let model_name = message
        .get("model_name")
        .and_then(Value::as_str)
        .ok_or_else(|| (job_id.clone(), "missing the 'model_name' parameter in the job message".to_owned()))?
        .to_owned();

    let method = message
        .get("method")
        .and_then(Value::as_str)
        .ok_or_else(|| (job_id.clone(), "missing the 'method' parameter in the job message".to_owned()))?
        .to_owned();

    let token = message
        .get("token")
        .and_then(Value::as_str)
        .map(|s| s.trim_start_matches("Bearer ").to_owned())
        .unwrap_or_else(|| default_token.to_owned());

    let mut features = None;
    let mut targets = None;
    let mut y_pred = None;
    let mut y_true = None;

    if method != "get_feedback" && method != "info" {
        features = Some(
            message
                .get("features")
                .and_then(Value::as_array)
                .cloned()
                .ok_or_else(|| (job_id.clone(), "missing the 'features' parameter in the job message".to_owned()))?,
        );
    }

    if method == "evaluate" {
        targets = Some(
            message
                .get("targets")
                .and_then(Value::as_array)
                .cloned()
                .ok_or_else(|| (job_id.clone(), "missing the 'targets' parameter in the job message".to_owned()))?,
        );
    }

    if method == "get_feedback" {
        y_pred = Some(
            message
                .get("y_pred")
                .and_then(Value::as_array)
                .cloned()
                .ok_or_else(|| (job_id.clone(), "missing the 'y_pred' parameter in the job message".to_owned()))?,
        );
        y_true = Some(
            message
                .get("y_true")
                .and_then(Value::as_array)
                .cloned()
                .ok_or_else(|| (job_id.clone(), "missing the 'y_true' parameter in the job message".to_owned()))?,
        );
    }

    Ok(Fields {
        job_id,
        model_name,
        method,
        token,
        features,
        targets,
        y_pred,
        y_true,
    })
}

/// Runs the model under `catch_unwind` so a panicking model can't bring down the worker thread,
/// then classifies the result: a string return is the model reporting its own error, anything
/// else is success.
fn run_guarded(model: &dyn Model, fields: &Fields, message: &Value) -> (String, Value) {
    match panic::catch_unwind(AssertUnwindSafe(|| run_method(model, fields, message))) {
        Ok(Ok(value)) => {
            if value.is_string() {
                ("Error".to_owned(), value)
            } else {
                ("Done".to_owned(), value)
            }
        }
        Ok(Err(message)) => ("Error".to_owned(), json!(message)),
        Err(_) => ("Error".to_owned(), json!("the model panicked while processing the job")),
    }
}

fn run_method(model: &dyn Model, fields: &Fields, message: &Value) -> Result<Value, String> {
    match fields.method.as_str() {
        "predict" => {
            let features = fields.features.as_ref().expect("features validated by extract_fields");
            ensure_shape(model.predict(features), &["array", "string"])
        }
        "evaluate" => {
            let features = fields.features.as_ref().expect("features validated by extract_fields");
            let targets = fields.targets.as_ref().expect("targets validated by extract_fields");
            ensure_shape(model.evaluate(features, targets), &["object", "string"])
        }
        "get_feedback" => {
            let y_pred = fields.y_pred.as_ref().expect("y_pred validated by extract_fields");
            let y_true = fields.y_true.as_ref().expect("y_true validated by extract_fields");
            let shaped = ensure_shape(model.get_feedback(y_pred, y_true), &["object", "string"])?;
            match shaped {
                Value::Object(map) => {
                    let api_metrics = message.get("api_metrics").cloned().unwrap_or(Value::Null);
                    Ok(json!({"model_metrics": Value::Object(map), "api_metrics": api_metrics}))
                }
                other => Ok(other),
            }
        }
        "info" => ensure_shape(model.get_model_info(), &["object", "string"]),
        other => Err(format!("unsupported method '{}'", other)),
    }
}

fn ensure_shape(value: Value, allowed: &[&str]) -> Result<Value, String> {
    let kind = match &value {
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        Value::String(_) => "string",
        _ => "other",
    };
    if allowed.contains(&kind) {
        Ok(value)
    } else {
        Err(format!("the model returned an unsupported shape: '{}'", kind))
    }
}

#[cfg(test)]
mod tests {
    use config::ExecutorConfig;
    use executor::dispatch::handle;
    use http_requester::{HttpRequester, HttpRequesterFactory, HttpRequesterFactoryPassThrough};
    use model_runtime::{EchoModel, ModelRegistry};
    use serde_json::json;
    use std::sync::Arc;
    use test_helpers;

    fn config() -> ExecutorConfig {
        ExecutorConfig {
            api_url: "http://example.invalid".to_owned(),
            worker_id: "worker-1".to_owned(),
            advworkid_credential: "cred".to_owned(),
            api_token_workers: "worker-token".to_owned(),
            rabbitmq_server: "localhost".to_owned(),
            rabbitmq_port: 5672,
            rabbitmq_user: "guest".to_owned(),
            rabbitmq_pass: "guest".to_owned(),
        }
    }

    #[test]
    fn test_handle_predict_reports_done() {
        let log = test_helpers::log();
        let cfg = config();
        let mut models = ModelRegistry::new();
        models.insert("echo", Arc::new(EchoModel { version: "1.0.0".to_owned() }));

        let factory = HttpRequesterFactoryPassThrough {
            response: json!({"status": "Done"}),
        };
        let mut requester = factory.create();

        let body = json!({
            "job_id": "job-1",
            "model_name": "echo",
            "method": "predict",
            "features": ["x", "y"],
            "datetime": 0.0,
            "token": "Bearer worker-token",
        });

        handle(&log, &cfg, &models, &mut *requester, body.to_string().as_bytes());
    }

    #[test]
    fn test_handle_unknown_model_does_not_panic() {
        let log = test_helpers::log();
        let cfg = config();
        let models = ModelRegistry::new();

        let factory = HttpRequesterFactoryPassThrough {
            response: json!({"status": "Done"}),
        };
        let mut requester = factory.create();

        let body = json!({
            "job_id": "job-2",
            "model_name": "missing",
            "method": "predict",
            "features": ["x"],
            "datetime": 0.0,
        });

        handle(&log, &cfg, &models, &mut *requester, body.to_string().as_bytes());
    }

    /// A delivery missing the method-specific `features` field must short-circuit straight to
    /// the `Error` report without ever calling `/attstatus` -- the pass-through requester would
    /// otherwise happily report `Running` and mask the bug this guards against.
    #[test]
    fn test_handle_missing_features_skips_attstatus() {
        let log = test_helpers::log();
        let cfg = config();
        let mut models = ModelRegistry::new();
        models.insert("echo", Arc::new(EchoModel { version: "1.0.0".to_owned() }));

        let factory = HttpRequesterFactoryPassThrough {
            response: json!({"status": "Done"}),
        };
        let mut requester = factory.create();

        let body = json!({
            "job_id": "job-3",
            "model_name": "echo",
            "method": "predict",
            "datetime": 0.0,
        });

        handle(&log, &cfg, &models, &mut *requester, body.to_string().as_bytes());
    }
}
