//! In-process HTTP servers for driver tests

use axum::Router;
use tokio::net::TcpListener;

/// Serves `router` on an ephemeral localhost port and returns the base
/// URL. The server task lives until the test runtime shuts down.
pub(crate) async fn spawn_server(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve mock registry");
    });
    format!("http://{addr}")
}
