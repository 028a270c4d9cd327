//! Centralizes the environment variables required by both binaries so that the full list (and
//! its validation) lives in exactly one place, in the spirit of the source's `utils.py` startup
//! checks.

use errors::*;

use std::env;

/// Variables that every process in the platform requires, whether or not this particular
/// process (Gateway or Executor) actually reads their value. Mirrors the exhaustive check the
/// source performs at import time so that a misconfigured deployment fails fast in the same
/// places.
const COMMON_REQUIRED_VARS: &[&str] = &[
    "RABBITMQ_SERVER",
    "RABBITMQ_PORT",
    "RABBITMQ_DEFAULT_USER",
    "RABBITMQ_DEFAULT_PASS",
    "DB_SERVER_NAME",
    "DB_AUTH_SOURCE",
    "MONGO_INITDB_ROOT_USERNAME",
    "MONGO_INITDB_ROOT_PASSWORD",
    "STACK_VERSION",
    "API_TOKEN",
    "API_TOKEN_WORKERS",
    "ADVWORKID_CREDENTIAL",
];

/// Checks that every variable in `COMMON_REQUIRED_VARS` is set, returning the name of the first
/// missing one. Does not validate Executor-only variables (`API_URL`, `WORKER_ID_001`); callers
/// that need those check them directly since their presence depends on which binary is running.
pub fn check_common_vars() -> Result<()> {
    for name in COMMON_REQUIRED_VARS {
        if env::var(name).is_err() {
            bail!(format!("required environment variable {} is not set", name));
        }
    }
    Ok(())
}

pub struct GatewayConfig {
    pub database_url: String,
    pub api_token: String,
    pub api_token_workers: String,
    pub advworkid_credential: String,
    pub stack_version: String,
    pub rabbitmq_server: String,
    pub rabbitmq_port: u16,
    pub rabbitmq_user: String,
    pub rabbitmq_pass: String,
    pub refresh_interval_seconds: i64,
}

impl GatewayConfig {
    pub fn from_env() -> Result<GatewayConfig> {
        check_common_vars()?;
        Ok(GatewayConfig {
            database_url: require_var("DATABASE_URL")?,
            api_token: require_var("API_TOKEN")?,
            api_token_workers: require_var("API_TOKEN_WORKERS")?,
            advworkid_credential: require_var("ADVWORKID_CREDENTIAL")?,
            stack_version: require_var("STACK_VERSION")?,
            rabbitmq_server: require_var("RABBITMQ_SERVER")?,
            rabbitmq_port: require_var("RABBITMQ_PORT")?
                .parse::<u16>()
                .chain_err(|| "RABBITMQ_PORT must be an integer")?,
            rabbitmq_user: require_var("RABBITMQ_DEFAULT_USER")?,
            rabbitmq_pass: require_var("RABBITMQ_DEFAULT_PASS")?,
            refresh_interval_seconds: env::var("REFRESH_INTERVAL_SECONDS")
                .ok()
                .and_then(|s| s.parse::<i64>().ok())
                .unwrap_or(300),
        })
    }

    pub fn amqp_addr(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/%2f",
            self.rabbitmq_user, self.rabbitmq_pass, self.rabbitmq_server, self.rabbitmq_port
        )
    }
}

#[derive(Clone)]
pub struct ExecutorConfig {
    pub api_url: String,
    pub worker_id: String,
    pub advworkid_credential: String,
    pub api_token_workers: String,
    pub rabbitmq_server: String,
    pub rabbitmq_port: u16,
    pub rabbitmq_user: String,
    pub rabbitmq_pass: String,
}

impl ExecutorConfig {
    pub fn from_env() -> Result<ExecutorConfig> {
        check_common_vars()?;
        Ok(ExecutorConfig {
            api_url: require_var("API_URL")?,
            worker_id: require_var("WORKER_ID_001")?,
            advworkid_credential: require_var("ADVWORKID_CREDENTIAL")?,
            api_token_workers: require_var("API_TOKEN_WORKERS")?,
            rabbitmq_server: require_var("RABBITMQ_SERVER")?,
            rabbitmq_port: require_var("RABBITMQ_PORT")?
                .parse::<u16>()
                .chain_err(|| "RABBITMQ_PORT must be an integer")?,
            rabbitmq_user: require_var("RABBITMQ_DEFAULT_USER")?,
            rabbitmq_pass: require_var("RABBITMQ_DEFAULT_PASS")?,
        })
    }

    pub fn amqp_addr(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/%2f",
            self.rabbitmq_user, self.rabbitmq_pass, self.rabbitmq_server, self.rabbitmq_port
        )
    }
}

fn require_var(name: &str) -> Result<String> {
    env::var(name).chain_err(|| format!("required environment variable {} is not set", name))
}
