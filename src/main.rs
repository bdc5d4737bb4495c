mod app;
mod cli;
mod data;
mod state;
mod tool;

use std::io;
use std::process;

use anyhow::{Result, bail};
use clap::Parser;

use app::PortesApp;
use cli::{Cli, Commands};
use data::error::DataError;
use data::loader::DatasetCache;
use data::query::consultar_portes;
use state::Session;

fn main() {
    // A missing `.env` is fine; real environment variables win over it.
    dotenvy::dotenv().ok();
    env_logger::init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Erro: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command.clone().unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let mut app = PortesApp::new(Session::new(open_dataset(&cli)?));
            let stdin = io::stdin();
            app.run(stdin.lock(), &mut io::stdout())?;
        }
        Commands::Consultar(args) => {
            let cache = open_dataset(&cli)?;
            println!("{}", consultar_portes(&cache, &args.into())?);
        }
        Commands::Colunas => {
            let session = Session::new(open_dataset(&cli)?);
            println!("{}", session.columns()?);
        }
        Commands::Esquema => {
            let declaration = tool::tool_declaration();
            println!("{}", serde_json::to_string_pretty(&declaration)?);
        }
    }

    Ok(())
}

/// Load the dataset up front so a missing file stops us before any prompt.
fn open_dataset(cli: &Cli) -> Result<DatasetCache> {
    let cache = DatasetCache::open(&cli.data, cli.csv_options()?);
    match cache.table() {
        Ok(_) => Ok(cache),
        Err(DataError::NotFound(path)) => bail!(
            "não encontrei o arquivo {}. Verifique o caminho informado (--data ou PORTES_DATA).",
            path.display()
        ),
        Err(e) => Err(e.into()),
    }
}
