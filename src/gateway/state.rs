//! The state every handler shares, assembled once at startup and handed to actix-web as
//! `web::Data<AppState>`. Plays the role the teacher's `server::StateImpl` played, minus the
//! sync-actor address -- blocking work goes through `web::block` directly instead.

use config::GatewayConfig;
use mediators::broker;
use mediators::feedback_rate::FeedbackRateLimiter;
use mediators::registry::RegistryCache;

use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use lapin::Connection as AmqpConnection;
use slog::Logger;

pub struct AppState {
    pub pool: Pool<ConnectionManager<PgConnection>>,
    pub registry: RegistryCache,
    pub limiter: FeedbackRateLimiter,
    pub publisher: broker::Publisher,
    pub config: GatewayConfig,
    pub log: Logger,

    /// Kept alive for as long as the Gateway runs -- `publisher`'s channel depends on this
    /// connection's background I/O task staying up.
    pub amqp_conn: AmqpConnection,
}
