//! The application's data layer: the `Job` record and queue registry entry that get queried from
//! and inserted into the database.
//!
//! Simple helper functions are allowed, but they should be kept extremely simple, with
//! preference for any and all domain logic to be offloaded to a mediator.

use errors::*;

use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "Queued",
            JobStatus::Running => "Running",
            JobStatus::Done => "Done",
            JobStatus::Error => "Error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<JobStatus> {
        match s {
            "Queued" => Ok(JobStatus::Queued),
            "Running" => Ok(JobStatus::Running),
            "Done" => Ok(JobStatus::Done),
            "Error" => Ok(JobStatus::Error),
            _ => Err(ErrorKind::Validation(format!("invalid status: {}", s)).into()),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobMethod {
    Predict,
    Evaluate,
    Info,
    GetFeedback,
}

impl JobMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            JobMethod::Predict => "predict",
            JobMethod::Evaluate => "evaluate",
            JobMethod::Info => "info",
            JobMethod::GetFeedback => "get_feedback",
        }
    }
}

impl fmt::Display for JobMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<JobMethod> {
        match s {
            "predict" => Ok(JobMethod::Predict),
            "evaluate" => Ok(JobMethod::Evaluate),
            "info" => Ok(JobMethod::Info),
            "get_feedback" => Ok(JobMethod::GetFeedback),
            _ => Err(ErrorKind::Validation(format!("invalid method: {}", s)).into()),
        }
    }
}

#[derive(Clone, Debug, Queryable)]
pub struct Job {
    pub id: i64,
    pub job_id: String,
    pub model_name: String,
    pub method: String,
    pub status: String,
    pub datetime: f64,
    pub queue_response_time_sec: f64,
    pub total_response_time_sec: f64,
    pub response: Option<Value>,
    pub feedback: Option<Value>,
    pub has_feedback: bool,
    pub initial_date: Option<String>,
    pub end_date: Option<String>,
    pub request_source: Option<String>,
}

impl Job {
    pub fn status(&self) -> Result<JobStatus> {
        self.status.parse()
    }

    pub fn method(&self) -> Result<JobMethod> {
        self.method.parse()
    }

    /// A list-shaped `response`, as required for a `predict` job carrying feedback.
    pub fn response_as_list(&self) -> Option<&Vec<Value>> {
        self.response.as_ref().and_then(|v| v.as_array())
    }
}

#[derive(Clone, Debug, Queryable)]
pub struct QueueRegistryEntry {
    pub model_name: String,
    pub worker_id: String,
}

pub mod insertable {
    use schema::{jobs, queue_registry};
    use serde_json::Value;

    #[derive(Insertable)]
    #[table_name = "jobs"]
    pub struct Job {
        pub job_id: String,
        pub model_name: String,
        pub method: String,
        pub status: String,
        pub datetime: f64,
        pub queue_response_time_sec: f64,
        pub total_response_time_sec: f64,
        pub response: Option<Value>,
        pub feedback: Option<Value>,
        pub has_feedback: bool,
        pub initial_date: Option<String>,
        pub end_date: Option<String>,
        pub request_source: Option<String>,
    }

    #[derive(AsChangeset, Insertable)]
    #[table_name = "queue_registry"]
    pub struct QueueRegistryEntry {
        pub model_name: String,
        pub worker_id: String,
    }
}

#[cfg(test)]
mod tests {
    use model::*;

    #[test]
    fn test_job_status_round_trip() {
        for status in &[
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Done,
            JobStatus::Error,
        ] {
            let s = status.as_str();
            assert_eq!(*status, s.parse::<JobStatus>().unwrap());
        }
    }

    #[test]
    fn test_job_status_invalid() {
        assert!("Bogus".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_job_method_round_trip() {
        for method in &[
            JobMethod::Predict,
            JobMethod::Evaluate,
            JobMethod::Info,
            JobMethod::GetFeedback,
        ] {
            let s = method.as_str();
            assert_eq!(*method, s.parse::<JobMethod>().unwrap());
        }
    }
}
