//! # Remote Mesh Controller
//!
//! Controller binary: initializes the runtime and runs the watch loop until
//! SIGTERM/SIGINT.

use anyhow::Result;
use remote_mesh_controller::runtime::{initialization, watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialization::initialize().await?;
    watch_loop::run_watch_loop(init.client, init.reconciler, init.server_state).await
}
