use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use actix_web::{
    get, middleware, web::Data, web::JsonConfig, App, HttpRequest, HttpResponse, HttpServer,
    Responder,
};
use anyhow::Context as _;
use clap::Parser;
use prometheus::{Encoder, TextEncoder};
use tracing::info;

pub use shoot_admission::{self, catalog::Catalog, telemetry, webhooks, State};

/// AdmissionReviews carry the object twice on update.
const MAX_REVIEW_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug, clap::Parser)]
struct Arguments {
    #[arg(long = "bind-address", env = "BIND_ADDRESS", default_value = "0.0.0.0:8443")]
    bind_address: String,

    /// PEM encoded serving certificate. TLS is only enabled together with a private key.
    #[arg(long = "tls-cert-file", env = "TLS_CERT_FILE", value_name = "PATH")]
    tls_cert_file: Option<PathBuf>,

    #[arg(long = "tls-private-key-file", env = "TLS_PRIVATE_KEY_FILE", value_name = "PATH")]
    tls_private_key_file: Option<PathBuf>,
}

#[get("/metrics")]
async fn metrics(c: Data<State>, _req: HttpRequest) -> impl Responder {
    let metrics = c.metrics();
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    match encoder.encode(&metrics, &mut buffer) {
        Ok(()) => HttpResponse::Ok().body(buffer),
        Err(e) => HttpResponse::InternalServerError().body(e.to_string()),
    }
}

#[get("/health")]
async fn health(_: HttpRequest) -> impl Responder {
    HttpResponse::Ok().json("healthy")
}

#[get("/ready")]
async fn ready(c: Data<State>, _req: HttpRequest) -> impl Responder {
    if c.is_ready() {
        HttpResponse::Ok().json("ready")
    } else {
        HttpResponse::ServiceUnavailable().json("caches not synced")
    }
}

#[get("/")]
async fn index(c: Data<State>, _req: HttpRequest) -> impl Responder {
    let d = c.diagnostics().await;
    HttpResponse::Ok().json(&d)
}

fn load_tls_config(cert: &Path, key: &Path) -> anyhow::Result<rustls::ServerConfig> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(
        File::open(cert).with_context(|| format!("opening {}", cert.display()))?,
    ))
    .collect::<Result<Vec<_>, _>>()
    .with_context(|| format!("reading certificates from {}", cert.display()))?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(
        File::open(key).with_context(|| format!("opening {}", key.display()))?,
    ))?
    .with_context(|| format!("no private key found in {}", key.display()))?;

    let config =
        rustls::ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(certs, key)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init().await?;

    let args: Arguments = Arguments::parse();

    // Initialize the caches backing admission
    let client = kube::Client::try_default().await?;
    let state = State::new(Catalog::watch(client))?;

    // Start web server
    let server = HttpServer::new(move || {
        App::new()
            .app_data(Data::new(state.clone()))
            .app_data(JsonConfig::default().limit(MAX_REVIEW_SIZE))
            .wrap(middleware::Logger::default().exclude("/health").exclude("/ready"))
            .service(index)
            .service(health)
            .service(ready)
            .service(metrics)
            .service(webhooks::shoot::webhook::mutate)
            .service(webhooks::controllerregistration::webhook::validate)
    });

    let server = match (&args.tls_cert_file, &args.tls_private_key_file) {
        (Some(cert), Some(key)) => {
            info!("Serving admission webhooks with TLS on {}", args.bind_address);
            server.bind_rustls_0_23(&args.bind_address, load_tls_config(cert, key)?)?
        }
        _ => {
            info!("Serving admission webhooks without TLS on {}", args.bind_address);
            server.bind(&args.bind_address)?
        }
    };

    server.shutdown_timeout(5).run().await?;
    Ok(())
}
