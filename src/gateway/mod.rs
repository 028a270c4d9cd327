//! The Gateway: the public-facing actix-web surface. Terminates client and worker HTTP traffic,
//! consults the queue registry and feedback throttle, and hands admission off to the mediators in
//! `mediators::`. Grounded in the teacher's old `api`/`server`/`middleware` trio, rebuilt on
//! actix-web 4's `App`/`Service` model instead of the teacher's sync-actor bridge.

pub mod auth;
pub mod handlers;
pub mod middleware;
pub mod server;
pub mod state;
