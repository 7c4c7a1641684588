use crate::config::ServerOptions;
use crate::tools::system::await_termination;
use crate::web::pipeline::Pipeline;
use crate::web::proxy::{ProxyHeadersMiddleware, ProxyTrust};
use anyhow::Context;
use hyper::Server;
use hyper::server::conn::AddrStream;
use hyper::service::make_service_fn;
use std::convert::Infallible;
use std::sync::Arc;

/// Serves `pipeline` on the configured address until a termination signal arrives.
///
/// Each accepted connection gets its own [`ProxyHeadersMiddleware`] in front
/// of a clone of the pipeline.
pub async fn run_webserver(options: &ServerOptions, pipeline: Pipeline) -> anyhow::Result<()> {
    let bind_address = options.socket_addr().with_context(|| {
        format!("Failed to resolve bind address {}:{}", options.host, options.port)
    })?;

    tracing::info!("Starting server at {}", bind_address);
    tracing::info!(
        "Trusted proxy: {} (headers: {})",
        options.trusted_proxy,
        options.trusted_proxy_headers.join(", ")
    );

    let trust = Arc::new(ProxyTrust {
        proxy: options.trusted_proxy,
        headers: options.trusted_proxy_headers.clone(),
    });

    let make_service = make_service_fn(move |conn: &AddrStream| {
        let service = ProxyHeadersMiddleware::new(
            pipeline.service(),
            trust.clone(),
            conn.remote_addr(),
            conn.local_addr(),
        );
        async move { Ok::<_, Infallible>(service) }
    });

    let server = Server::try_bind(&bind_address)
        .with_context(|| format!("Failed to bind HTTP server to {}", bind_address))?
        .serve(make_service);

    tracing::info!(
        "Running HTTP server at effective address {} with {} worker threads",
        server.local_addr(),
        options.threads
    );

    server
        .with_graceful_shutdown(await_termination("HTTP server"))
        .await
        .context("HTTP server failed")?;
    tracing::info!("HTTP Server has terminated...");

    Ok(())
}
