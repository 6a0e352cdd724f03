#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use std::sync::Arc;

use dotenv::dotenv;
use poem::{EndpointExt, Route, Server, listener::TcpListener, middleware::Tracing};
use poem_mcpserver::{McpServer, streamable_http};
use ssh_session_hub::hub::{Hub, HubConfig, HubTools};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse()?),
        )
        .init();

    let config = HubConfig::from_env();
    info!("Hub configuration: {:?}", config);

    let hub = Arc::new(Hub::with_defaults(config));
    let poller = hub.spawn_poller();

    let mcp_port: u16 = std::env::var("MCP_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8000);
    let mcp_addr = format!("0.0.0.0:{}", mcp_port);
    info!("Starting MCP server on {}", mcp_addr);

    let tools_hub = hub.clone();
    let app = Route::new()
        .at(
            "/",
            streamable_http::endpoint(move |_| {
                McpServer::new().tools(HubTools::new(tools_hub.clone()))
            }),
        )
        .with(Tracing);

    info!("SSH session hub is ready");
    info!("Use create_session to register a connection, then connect");

    let result = Server::new(TcpListener::bind(mcp_addr))
        .name("SSH Session Hub")
        .run(app)
        .await;

    poller.shutdown().await;
    hub.clear_all().await;

    result?;
    Ok(())
}
