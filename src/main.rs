use clap::Parser;
use jotter::cli::{Cli, Commands};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jotter=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init { path, name }) => {
            jotter::cli::init::run(path, name).await?;
        }
        Some(Commands::Serve { host, port }) => {
            jotter::cli::serve::run(&cli.config, host, port).await?;
        }
        Some(Commands::Migrate) => {
            jotter::cli::migrate::run(&cli.config).await?;
        }
        Some(Commands::User { command }) => {
            jotter::cli::user::run(&cli.config, command).await?;
        }
        Some(Commands::Seed { author }) => {
            jotter::cli::seed::run(&cli.config, &author).await?;
        }
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
        }
    }

    Ok(())
}
