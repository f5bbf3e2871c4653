mod args;
mod commands;
mod config;
mod dirs;
mod render;

use std::io;

use finsight_client::{ClientPaths, ClientState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = args::parse_args().map_err(|err| {
        eprintln!("{err}");
        args::print_help();
        io::Error::new(io::ErrorKind::InvalidInput, "invalid arguments")
    })?;
    if args.command == args::Command::Help {
        args::print_help();
        return Ok(());
    }

    let mut config = config::load_or_create().map_err(io::Error::other)?;
    if config.created {
        println!(
            "Created config at {} (backend {}).",
            config.paths.file.display(),
            config.config.api_url
        );
    }
    config.apply_overrides(args.api_url.as_deref());

    let data_dir = dirs::resolve_data_dir().map_err(io::Error::other)?;
    if data_dir.from_env {
        log::info!("using data dir from environment: {}", data_dir.dir.display());
    }
    let paths = ClientPaths::new(data_dir.dir);
    let state = ClientState::open(config.config, &paths).map_err(io::Error::other)?;

    let bootstrap = state.bootstrap().await;
    commands::run(&state, bootstrap, args.command)
        .await
        .map_err(io::Error::other)?;
    Ok(())
}
