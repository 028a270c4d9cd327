extern crate actix_rt;
extern crate clap;
extern crate diesel;
#[macro_use]
extern crate diesel_migrations;
#[macro_use]
extern crate error_chain;
extern crate isatty;
extern crate mlapi;
#[macro_use]
extern crate slog;
extern crate slog_async;
extern crate slog_term;

use mlapi::config::{ExecutorConfig, GatewayConfig};
use mlapi::error_helpers;
use mlapi::errors::*;
use mlapi::executor::worker::Executor;
use mlapi::gateway::server::Server;
use mlapi::http_requester::HttpRequesterFactoryLive;
use mlapi::model_runtime::{EchoModel, ModelRegistry};
use mlapi::sentinel;

use clap::{App, ArgMatches, SubCommand};
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use isatty::stdout_isatty;
use slog::{Drain, Logger};
use std::env;
use std::sync::Arc;
use std::time::Duration;

embed_migrations!("./migrations");

fn main() {
    let mut app = App::new("mlapi")
        .version("0.1")
        .about("ML inference platform: a request gateway and the workers that serve models behind it")
        .arg_from_usage("    --log-async 'Log asynchronously (good for logging on servers)'")
        .arg_from_usage("-c, --num-connections=[NUM] 'Number of Postgres connections'")
        .arg_from_usage("-q, --quiet 'Quiets all output'")
        .subcommand(
            SubCommand::with_name("gateway")
                .about("Starts the request gateway")
                .arg_from_usage("-p, --port=[PORT] 'Port to bind server to'"),
        )
        .subcommand(
            SubCommand::with_name("executor")
                .about("Starts a worker that announces itself and serves its configured models"),
        )
        .subcommand(SubCommand::with_name("migrate").about("Migrates the database"));

    let matches = app.clone().get_matches();
    let options = parse_global_options(&matches);
    let log = log(&options);

    let res = match matches.subcommand_name() {
        Some("gateway") => subcommand_gateway(&log, &matches, &options),
        Some("executor") => subcommand_executor(&log, &options),
        Some("migrate") => subcommand_migrate(&log, &options),
        None => {
            app.print_help().unwrap();
            Ok(())
        }
        _ => unreachable!(),
    };
    if let Err(ref e) = res {
        match matches.subcommand_name() {
            Some("gateway") => handle_error(&log, e),
            _ => handle_error_silent(&log, e),
        }
    }
}

//
// Subcommands
//

fn subcommand_gateway(log: &Logger, matches: &ArgMatches, options: &GlobalOptions) -> Result<()> {
    let matches = matches.subcommand_matches("gateway").unwrap();
    let config = GatewayConfig::from_env()?;
    let pool = pool(log, &config.database_url, options)?;

    let server = Server {
        log: log.clone(),
        pool,
        port: server_port(matches, &config),
        config,
    };

    actix_rt::System::new().block_on(server.run())
}

/// Starts an Executor serving the bundled `EchoModel`. A real deployment links `mlapi` as a
/// library from its own small binary, builds a `ModelRegistry` out of its own models, and calls
/// `Executor::run` directly instead of going through this subcommand.
fn subcommand_executor(log: &Logger, _options: &GlobalOptions) -> Result<()> {
    let config = ExecutorConfig::from_env()?;

    let mut models = ModelRegistry::new();
    models.insert(
        "echo",
        Arc::new(EchoModel {
            version: "1.0.0".to_owned(),
        }),
    );

    let executor = Executor {
        log: log.clone(),
        config,
        models,
        http_requester_factory: Box::new(HttpRequesterFactoryLive {}),
    };

    actix_rt::System::new().block_on(executor.run())
}

fn subcommand_migrate(log: &Logger, options: &GlobalOptions) -> Result<()> {
    let database_url = env::var("DATABASE_URL").chain_err(|| "DATABASE_URL must be set")?;
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool: Pool<ConnectionManager<PgConnection>> = Pool::builder()
        .max_size(1)
        .build(manager)
        .map_err(Error::from)?;
    let conn = pool.get()?;

    info!(log, "Running migrations");

    if options.quiet {
        embedded_migrations::run(&conn)
    } else {
        embedded_migrations::run_with_output(&conn, &mut std::io::stdout())
    }
    .chain_err(|| "Error running migrations")?;

    info!(log, "Finished migrations");
    Ok(())
}

//
// Private types/functions
//

const IDLE_TIMEOUT: u64 = 10;
const NUM_CONNECTIONS: u32 = 20;
const POOL_TIMEOUT: u64 = 10;

struct GlobalOptions {
    log_async: bool,
    num_connections: u32,
    pool_timeout: Duration,
    quiet: bool,
}

/// Handles a startup failure from the `gateway` subcommand: this is the one path allowed to
/// write the container health-check sentinel, since `server.run()` only returns an error before
/// it starts serving requests (pool/registry/broker setup), never for a single request.
fn handle_error(log: &Logger, e: &Error) {
    error_helpers::print_error(log, e);
    sentinel::write_sentinel(log, &e.to_string());
    ::std::process::exit(1);
}

/// Handles a failure from any other subcommand (`executor`, `migrate`): logs and exits without
/// writing the sentinel, since that file is reserved for the Gateway's own health check.
fn handle_error_silent(log: &Logger, e: &Error) {
    error_helpers::print_error(log, e);
    ::std::process::exit(1);
}

fn log(options: &GlobalOptions) -> Logger {
    if options.quiet {
        slog::Logger::root(slog::Discard, o!())
    } else if options.log_async {
        let decorator = slog_term::PlainSyncDecorator::new(std::io::stdout());
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        slog::Logger::root(drain, o!())
    } else {
        let decorator = slog_term::PlainSyncDecorator::new(std::io::stdout());
        let drain = slog_term::CompactFormat::new(decorator).build().fuse();
        let async_drain = slog_async::Async::new(drain).build().fuse();
        slog::Logger::root(async_drain, o!())
    }
}

fn parse_global_options(matches: &ArgMatches) -> GlobalOptions {
    GlobalOptions {
        log_async: if matches.is_present("log-async") {
            true
        } else {
            !stdout_isatty()
        },

        num_connections: matches
            .value_of("num-connections")
            .map(|s| s.parse::<u32>().unwrap())
            .unwrap_or_else(|| {
                env::var("NUM_CONNECTIONS")
                    .map(|s| s.parse::<u32>().unwrap())
                    .unwrap_or(NUM_CONNECTIONS)
            }),

        pool_timeout: Duration::from_secs(
            env::var("POOL_TIMEOUT")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(POOL_TIMEOUT),
        ),

        quiet: matches.is_present("quiet"),
    }
}

/// Initializes and returns a connection pool suitable for use across threads.
fn pool(
    log: &Logger,
    database_url: &str,
    options: &GlobalOptions,
) -> Result<Pool<ConnectionManager<PgConnection>>> {
    debug!(log, "Initializing connection pool";
        "num_connections" => options.num_connections,
        "pool_timeout" => format!("{:?}", options.pool_timeout));

    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder()
        .connection_timeout(options.pool_timeout)
        .idle_timeout(Some(Duration::from_secs(IDLE_TIMEOUT)))
        .max_size(options.num_connections)
        .min_idle(Some(0))
        .build(manager)
        .map_err(Error::from)
}

/// Gets a port from the command's argument, falling back to `PORT` then 8080.
fn server_port(matches: &ArgMatches, _config: &GatewayConfig) -> String {
    matches
        .value_of("port")
        .map(|p| p.to_owned())
        .unwrap_or_else(|| env::var("PORT").unwrap_or_else(|_| "8080".to_owned()))
}
