//! Boots the Gateway: loads the registry from the store, connects to the broker, wires every
//! route behind the request logger, and serves. Plays the role the teacher's `api::Server` played,
//! rebuilt on actix-web 4's `HttpServer`/`App` instead of the teacher's `actix::System` and
//! custom `SyncExecutor` bridge.

use config::GatewayConfig;
use errors::*;
use gateway::state::AppState;
use gateway::{handlers, middleware};
use mediators::broker;
use mediators::feedback_rate::FeedbackRateLimiter;
use mediators::registry::RegistryCache;

use actix_web::{web, App, HttpServer};
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use slog::Logger;

pub struct Server {
    pub log: Logger,
    pub pool: Pool<ConnectionManager<PgConnection>>,
    pub config: GatewayConfig,
    pub port: String,
}

impl Server {
    pub async fn run(self) -> Result<()> {
        let refresh_interval_seconds = self.config.refresh_interval_seconds;
        let amqp_addr = self.config.amqp_addr();

        let registry = {
            let conn = self.pool.get()?;
            RegistryCache::load(&conn, refresh_interval_seconds)?
        };

        let amqp_conn = broker::connect(&amqp_addr).await?;
        let publisher = broker::Publisher::new(&amqp_conn).await?;

        let host = format!("0.0.0.0:{}", self.port);
        info!(self.log, "Gateway starting"; "host" => host.as_str());

        let state = web::Data::new(AppState {
            pool: self.pool.clone(),
            registry,
            limiter: FeedbackRateLimiter::new(),
            publisher,
            config: self.config,
            log: self.log.clone(),
            amqp_conn,
        });

        let log = self.log.clone();
        HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .wrap(middleware::RequestLogger::new(log.clone()))
                .route("/", web::get().to(handlers::root))
                .route("/version", web::get().to(handlers::version))
                .route("/inference", web::post().to(handlers::inference))
                .route("/status", web::post().to(handlers::status))
                .route("/feedback", web::post().to(handlers::feedback))
                .route("/get_feedback", web::post().to(handlers::get_feedback))
                .route("/attstatus", web::post().to(handlers::attstatus))
                .route("/retorno", web::post().to(handlers::retorno))
                .route("/advworkid", web::post().to(handlers::advworkid))
        })
        .bind(host)?
        .run()
        .await
        .map_err(Error::from)
    }
}
