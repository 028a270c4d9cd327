#![recursion_limit = "128"]

extern crate actix_rt;
extern crate actix_web;
extern crate chrono;
#[macro_use]
extern crate diesel;
extern crate diesel_migrations;
#[macro_use]
extern crate error_chain;
extern crate futures;
extern crate hex;
extern crate lapin;
extern crate rand;
extern crate reqwest;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;
#[macro_use]
extern crate slog;
extern crate slog_async;
extern crate slog_term;
extern crate sha2;
extern crate uuid;

pub mod config;
pub mod error_helpers;
pub mod errors;
pub mod executor;
pub mod gateway;
pub mod http_requester;
pub mod job_id;
pub mod mediators;
pub mod model;
pub mod model_runtime;
pub mod sentinel;
pub mod time_helpers;

// Generated file: skip rustfmt
#[cfg_attr(rustfmt, rustfmt_skip)]
pub mod schema;

#[cfg(test)]
pub mod test_helpers;
