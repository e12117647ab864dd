use dotenvy::dotenv;

use eventhub_server::config::Config;
use eventhub_server::{init_logging, run};

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();

    if let Err(e) = run(Config::from_env()).await {
        tracing::error!(error = ?e, "Server stopped");
        std::process::exit(1);
    }
}
