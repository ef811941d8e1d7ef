//! HTTP transport (spec §4.7 "Serve"), adapted from the teacher's
//! actix-web wiring.

use std::sync::Arc;
use std::time::Duration;

use actix_web::middleware::{Compress, DefaultHeaders, Logger};
use actix_web::{web, App, HttpResponse, HttpServer};

use crate::server::protocol::{dispatch, McpRequest};
use crate::server::Orchestrator;

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "ok", "service": "orla-server" }))
}

async fn mcp_handler(
    orchestrator: web::Data<Arc<Orchestrator>>,
    request: web::Json<McpRequest>,
) -> HttpResponse {
    let response = dispatch(&orchestrator, request.into_inner()).await;
    HttpResponse::Ok().json(response)
}

/// Run the HTTP transport (spec §4.7 "`Serve(ctx, addr)`"). Worker count
/// follows the teacher's auto-detect-from-CPU-count policy.
pub async fn serve(orchestrator: Arc<Orchestrator>, host: &str, port: u16) -> std::io::Result<()> {
    let bind_addr = format!("{host}:{port}");
    let data = web::Data::new(orchestrator);

    let workers = std::env::var("WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or_else(|| num_cpus::get().clamp(1, 16));

    tracing::info!(bind_addr = %bind_addr, workers, "starting HTTP transport");

    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(Compress::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY")),
            )
            .wrap(Logger::new("%r %s %Dms"))
            .route("/health", web::get().to(health))
            .route("/mcp", web::post().to(mcp_handler))
            .route("/", web::post().to(mcp_handler))
            .route("/", web::get().to(health))
    })
    .workers(workers)
    .max_connections(10_000)
    .max_connection_rate(1_000)
    .keep_alive(Duration::from_secs(30))
    .client_request_timeout(Duration::from_secs(30))
    .client_disconnect_timeout(Duration::from_secs(2))
    .shutdown_timeout(10)
    .bind(&bind_addr)?
    .run()
    .await
}
