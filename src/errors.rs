// Define an errors module and use a glob import as recommended by:
//
//     http://brson.github.io/2016/11/30/starting-with-error-chain
//

// Create the Error, ErrorKind, ResultExt, and Result types
error_chain!{
    // Automatic conversions between this error chain and other error types not defined by the
    // `error_chain!`. The description and cause will forward to the description and cause of the
    // original error.
    foreign_links {
        Database(::diesel::result::Error);
        DatabaseConnectionPool(::r2d2::Error);
        Io(::std::io::Error);
        Json(::serde_json::Error);
        Lapin(::lapin::Error);
        Reqwest(::reqwest::Error);
    }

    errors {
        /// The requested model isn't present in the queue registry.
        ModelNotFound(model_name: String) {
            description("model not found")
            display("model not found: {}", model_name)
        }

        /// The worker that owns a model has no queue bound (it never announced, or has
        /// since disappeared).
        QueueAbsent(worker_id: String) {
            description("no workers listening for model")
            display("no workers listening for model (worker {})", worker_id)
        }

        /// Bearer token didn't match any of the configured credentials for this endpoint.
        Unauthorized {
            description("unauthorized")
        }

        /// A `get_feedback` request arrived before its per-model or global cooldown expired.
        RateLimited(next_feedback_timestamp: f64) {
            description("rate limited")
            display("rate limited until {}", next_feedback_timestamp)
        }

        /// A request failed parameter validation. The string is a human-readable message
        /// suitable for returning directly in the response envelope.
        Validation(message: String) {
            description("validation error")
            display("{}", message)
        }

        /// The referenced job does not exist in the store.
        JobNotFound(job_id: String) {
            description("job not found")
            display("job not found: {}", job_id)
        }
    }
}

// Collect error strings together so that we can build a good error message to
// send up. It's worth nothing that the original error is actually at the end of
// the iterator, but since it's the most relevant, we reverse the list.
//
// The chain isn't a double-ended iterator (meaning we can't use `rev`), so we
// have to collect it to a Vec first before reversing it.
pub fn error_strings(error: &Error) -> Vec<String> {
    error
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .iter()
        .cloned()
        .rev()
        .collect()
}
