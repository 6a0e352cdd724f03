#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use std::sync::Arc;

use poem_mcpserver::McpServer;
use ssh_session_hub::hub::{Hub, HubConfig, HubTools};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    let hub = Arc::new(Hub::with_defaults(HubConfig::from_env()));
    let poller = hub.spawn_poller();

    let result =
        poem_mcpserver::stdio::stdio(McpServer::new().tools(HubTools::new(hub.clone()))).await;

    poller.shutdown().await;
    hub.clear_all().await;

    result?;
    Ok(())
}
