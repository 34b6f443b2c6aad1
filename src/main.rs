use std::path::PathBuf;

use bank_data_scraping::{config::Config, server};
use bank_data_scraping_utils::fs_json_util::read_toml;
use clap::Parser;

#[derive(Parser)]
struct Opts {
    #[arg(default_value = "ignore/bank-data-scraping.toml")]
    config_path: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let opts = Opts::parse();
    let config: Config = read_toml(&opts.config_path)?;
    server::serve(config).await
}
