use std::{env, fs::OpenOptions, net::SocketAddr, path::Path, sync::Arc};

use axum::{
    Router,
    extract::{MatchedPath, Request},
    middleware,
};
use axum_server::{Handle, tls_rustls::RustlsConfig};
use clap::Parser;
use rusqlite::Connection;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

use financeasy::{AppState, build_router, graceful_shutdown, logging_middleware};

/// The FinancEasy REST API server.
///
/// The environment variable `SECRET` must hold the key used to sign bearer tokens.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The SQLite database file. It is created if it does not exist.
    #[arg(long)]
    db_path: String,

    /// A directory containing `cert.pem` and `key.pem`. Serves plain HTTP when omitted.
    #[arg(long)]
    cert_path: Option<String>,

    /// The port to listen on.
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// The IANA name of the timezone used to work out the current month.
    #[arg(long, default_value = "America/Sao_Paulo")]
    timezone: String,
}

#[tokio::main]
async fn main() {
    setup_logging();

    let args = Args::parse();

    if time_tz::timezones::get_by_name(&args.timezone).is_none() {
        tracing::error!("Unknown timezone \"{}\"", args.timezone);
        std::process::exit(1);
    }

    let Ok(secret) = env::var("SECRET") else {
        tracing::error!("The environment variable SECRET must be set");
        std::process::exit(1);
    };

    let state = Connection::open(&args.db_path)
        .map_err(financeasy::Error::from)
        .and_then(|conn| AppState::new(conn, &secret, &args.timezone))
        .unwrap_or_else(|error| {
            tracing::error!("Could not open the database {}: {error}", args.db_path);
            std::process::exit(1);
        });

    let router = build_router(state).layer(middleware::from_fn(logging_middleware));
    let router = add_tracing_layer(router);

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    let handle = Handle::new();
    tokio::spawn(graceful_shutdown(handle.clone()));

    serve(router, addr, handle, args.cert_path.as_deref()).await;
}

async fn serve(router: Router, addr: SocketAddr, handle: Handle<SocketAddr>, cert_path: Option<&str>) {
    let service = router.into_make_service();

    let result = match cert_path {
        Some(cert_path) => {
            let cert_dir = Path::new(cert_path);
            let tls_config = RustlsConfig::from_pem_file(
                cert_dir.join("cert.pem"),
                cert_dir.join("key.pem"),
            )
            .await
            .expect("Could not open TLS certificates.");

            tracing::info!("HTTPS server listening on {addr}");
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(service)
                .await
        }
        None => {
            tracing::info!("HTTP server listening on {addr}");
            axum_server::bind(addr).handle(handle).serve(service).await
        }
    };

    if let Err(error) = result {
        tracing::error!("The server stopped unexpectedly: {error}");
    }
}

/// Log to stdout at the level given by `RUST_LOG` (info by default) and
/// everything at debug level and above to `debug.log`.
fn setup_logging() {
    let stdout_log = tracing_subscriber::fmt::layer().pretty().with_filter(
        EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy(),
    );

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .expect("Could not create log file");

    let debug_log = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(Arc::new(log_file))
        .with_filter(LevelFilter::DEBUG);

    tracing_subscriber::registry()
        .with(stdout_log)
        .with(debug_log)
        .init();
}

fn add_tracing_layer(router: Router) -> Router {
    let tracing_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request| {
            let matched_path = req
                .extensions()
                .get::<MatchedPath>()
                .map(MatchedPath::as_str);

            tracing::debug_span!("request", method = %req.method(), uri = %req.uri(), matched_path)
        })
        // Handlers log their own errors.
        .on_failure(());

    router.layer(tracing_layer)
}
