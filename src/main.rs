mod backup;
mod catalog;
mod cli;
mod config;
mod error;
mod http;
mod install;
mod log;
mod minecraft;
mod modrinth;
mod scan;
mod update;

use anyhow::Result;

fn main() -> Result<()> {
    cli::run()
}
