//! Pure validation helpers shared by the admission and feedback mediators. Kept free of I/O so
//! they can be exercised directly in `#[cfg(test)]` without a database or broker.

use errors::*;
use model::JobStatus;

use serde_json::Value;

const MAX_LIST_ITEMS: usize = 100;
const MAX_JOB_ID_LEN: usize = 100;

/// Mimics Python's `type(x).__name__` closely enough to produce the same class of error message
/// the source reports when a client sends the wrong JSON shape.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "NoneType",
        Value::Bool(_) => "bool",
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                "int"
            } else {
                "float"
            }
        }
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// `method ∈ {predict, evaluate, info}`, plus the method-specific parameter presence/length
/// rules from the admission table. `get_feedback` is admitted through a separate path and is not
/// one of the values this accepts.
pub fn validate_method_and_params(method: &str, payload: &Value) -> Result<()> {
    match method {
        "predict" | "evaluate" | "info" => {}
        _ => {
            bail!(ErrorKind::Validation(format!(
                "the 'method' parameter is incorrect: got '{}', must be one of (case sensitive): \
                 [predict, evaluate, info]",
                method
            )));
        }
    }

    if method == "predict" || method == "evaluate" {
        let features = payload.get("features").ok_or_else(|| {
            Error::from(ErrorKind::Validation(format!(
                "missing the 'features' parameter for method '{}'",
                method
            )))
        })?;
        validate_list_param(features, "features")?;
    }

    if method == "evaluate" {
        let features = payload.get("features").unwrap();
        let targets = payload.get("targets").ok_or_else(|| {
            Error::from(ErrorKind::Validation(format!(
                "missing the 'targets' parameter for method '{}'",
                method
            )))
        })?;
        validate_list_param(targets, "targets")?;

        let features_len = features.as_array().map(Vec::len).unwrap_or(0);
        let targets_len = targets.as_array().map(Vec::len).unwrap_or(0);
        if features_len != targets_len {
            bail!(ErrorKind::Validation(
                "the 'features' and 'targets' parameters for method 'evaluate' must have the \
                 same number of elements"
                    .to_owned()
            ));
        }
    }

    Ok(())
}

/// Validates that `value` is a non-empty JSON array of at most 100 items, matching the
/// `features`/`targets`/`feedback` rule. Used both during admission and by `/feedback`.
pub fn validate_list_param(value: &Value, name: &str) -> Result<&Vec<Value>> {
    let list = value.as_array().ok_or_else(|| {
        Error::from(ErrorKind::Validation(format!(
            "the '{}' parameter has the wrong type: got '{}', must be 'list'",
            name,
            json_type_name(value)
        )))
    })?;

    if list.is_empty() {
        bail!(ErrorKind::Validation(format!(
            "an empty list was passed for the '{}' parameter",
            name
        )));
    }

    if list.len() > MAX_LIST_ITEMS {
        bail!(ErrorKind::Validation(format!(
            "the maximum number of items was exceeded: {} items were passed for the '{}' \
             parameter, but at most {} are supported",
            list.len(),
            name,
            MAX_LIST_ITEMS
        )));
    }

    Ok(list)
}

/// `len(feedback) == len(response)` and element-by-element type equality, as used by `/feedback`.
pub fn validate_feedback_matches_response(feedback: &[Value], response: &[Value]) -> Result<()> {
    if feedback.len() != response.len() {
        bail!(ErrorKind::Validation(
            "the number of labels given in the feedback does not match the job's response"
                .to_owned()
        ));
    }

    for (i, (fb, resp)) in feedback.iter().zip(response.iter()).enumerate() {
        let fb_type = json_type_name(fb);
        let resp_type = json_type_name(resp);
        if fb_type != resp_type {
            bail!(ErrorKind::Validation(format!(
                "the type of label '{}' (position {} in the feedback list) is '{}', but it \
                 differs from the response's label '{}', which is of type '{}'",
                fb, i, fb_type, resp, resp_type
            )));
        }
    }

    Ok(())
}

/// `len(job_id) ≤ 100`, coercing to string first as the source does.
pub fn validate_job_id_len(job_id: &str) -> Result<()> {
    if job_id.len() > MAX_JOB_ID_LEN {
        bail!(ErrorKind::Validation(format!(
            "the 'job_id' {} exceeded the length limit",
            job_id
        )));
    }
    Ok(())
}

pub fn validate_status_str(status: &str) -> Result<JobStatus> {
    status
        .parse()
        .chain_err(|| ErrorKind::Validation(format!("invalid status value: {}", status)))
}

#[cfg(test)]
mod tests {
    use mediators::validation::*;
    use serde_json::json;

    #[test]
    fn test_validate_method_ok() {
        assert!(validate_method_and_params("info", &json!({})).is_ok());
        assert!(validate_method_and_params("predict", &json!({"features": ["a"]})).is_ok());
    }

    #[test]
    fn test_validate_method_bad() {
        assert!(validate_method_and_params("delete", &json!({})).is_err());
    }

    #[test]
    fn test_validate_evaluate_length_mismatch() {
        let payload = json!({"features": ["a", "b"], "targets": ["x"]});
        assert!(validate_method_and_params("evaluate", &payload).is_err());
    }

    #[test]
    fn test_validate_list_param_too_large() {
        let items: Vec<Value> = (0..101).map(|i| json!(i)).collect();
        let value = Value::Array(items);
        assert!(validate_list_param(&value, "features").is_err());
    }

    #[test]
    fn test_validate_list_param_empty() {
        let value = json!([]);
        assert!(validate_list_param(&value, "features").is_err());
    }

    #[test]
    fn test_feedback_type_mismatch() {
        let feedback = vec![json!("a"), json!(1)];
        let response = vec![json!("a"), json!("b")];
        assert!(validate_feedback_matches_response(&feedback, &response).is_err());
    }

    #[test]
    fn test_feedback_ok() {
        let feedback = vec![json!("a"), json!("b")];
        let response = vec![json!("x"), json!("y")];
        assert!(validate_feedback_matches_response(&feedback, &response).is_ok());
    }

    #[test]
    fn test_job_id_too_long() {
        let id: String = std::iter::repeat('a').take(101).collect();
        assert!(validate_job_id_len(&id).is_err());
    }
}
