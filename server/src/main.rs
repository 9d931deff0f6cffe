mod app;
mod core;
mod data;
mod domain;

use app::CommandEngineApp;

#[tokio::main]
async fn main() {
    if let Err(e) = CommandEngineApp::run().await {
        eprintln!("\nError: {e}\n");
        std::process::exit(1);
    }
}
