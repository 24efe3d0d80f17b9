mod platform;

use clap::Parser;

use platform::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    platform::logging::initialize(cli.log.into(), cli.log_level());
    platform::app::run(cli).await
}
