//! HTTP server loop.
//!
//! Accepts TCP connections and serves each one on its own task over
//! HTTP/1.1. Application startup runs to completion before the accept loop
//! begins, so the first admitted request always sees an initialized
//! instance. Ctrl-C breaks the loop and runs the application shutdown,
//! which cancels the background tasks and awaits them. When a client goes
//! away mid-request, hyper drops the in-flight service future, cancelling
//! the handler at its next suspension point.

use std::convert::Infallible;
use std::sync::Arc;

use hyper::{Request, server::conn::http1, service::service_fn};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::app::App;
use crate::body::ArborBody;
use crate::types::BoxError;

/// Starts the server with the given listener and application instance.
pub async fn serve(listener: TcpListener, app: App) {
    if let Err(err) = run(listener, app).await {
        error!(error = %err, "server terminated");
    }
}

async fn run(listener: TcpListener, app: App) -> Result<(), BoxError> {
    let app = Arc::new(app);
    app.startup().await?;

    info!(addr = %listener.local_addr()?, "arbor listening");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            accepted = listener.accept() => {
                let (stream, addr) = accepted?;
                let io = hyper_util::rt::TokioIo::new(stream);
                let app = app.clone();

                tokio::spawn(async move {
                    let svc = service_fn(move |req: Request<_>| {
                        let app = app.clone();
                        async move {
                            let mut req = req.map(ArborBody::new);
                            req.extensions_mut().insert(addr);
                            Ok::<_, Infallible>(app.dispatch(req).await)
                        }
                    });

                    let mut http = http1::Builder::new();
                    http.keep_alive(true);
                    let conn = http.serve_connection(io, svc).with_upgrades();

                    if let Err(err) = conn.await {
                        error!(error = %err, "error serving connection");
                    }
                });
            }
        }
    }

    info!("shutting down");
    app.shutdown().await;
    Ok(())
}
