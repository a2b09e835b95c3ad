use std::net::SocketAddr;

use tokio::net::TcpListener;

const ROUTES: &[&str] = &[
    "/echo",
    "/cookies",
    "/delay/{ms}/{tag}",
    "/completions",
    "/status/{code}",
    "/redirect/{n}",
];

/// Serves the fanout test routes. `MOCK_ADDR` overrides the bind address;
/// port 0 picks a free one.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    let addr: SocketAddr = std::env::var("MOCK_ADDR")
        .ok()
        .and_then(|a| a.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 3000)));
    let listener = TcpListener::bind(addr).await?;

    let bound = listener.local_addr()?;
    println!("mock server listening on http://{bound}");
    for route in ROUTES {
        println!("  http://{bound}{route}");
    }
    mock_server::run(listener).await
}
