pub mod config;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod providers;
pub mod repl;
pub mod server;

use anyhow::Result;
use std::env;
use tracing::info;

use config::Config;
use model::ModelClient;

pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init();

    let cfg = Config::from_env();
    info!(
        model = %cfg.model,
        base_url = %cfg.base_url,
        credential_present = cfg.api_key.is_some(),
        model_timeout_secs = ?cfg.model_timeout_secs,
        "loaded runtime configuration"
    );
    let client = ModelClient::from_config(&cfg);

    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None => repl::run_repl(&client).await,
        Some("serve") => server::serve(&cfg, client).await,
        Some(_) => repl::ask_once(&client, &args.join(" ")).await,
    }
}
