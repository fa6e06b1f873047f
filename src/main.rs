mod app;
mod cli;
mod config;
mod core;
mod executors;
mod organizers;
mod plugins;
mod reporters;
mod ui;
mod utils;
mod wordlists;

use clap::Parser;

#[tokio::main]
async fn main() {
    human_panic::setup_panic!();

    let cli = cli::args::Cli::parse();
    let code = match app::run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("fatal: {:#}", err);
            1
        }
    };
    // the stdin reader thread would otherwise keep the runtime alive
    std::process::exit(code);
}
