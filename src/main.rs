use anyhow::Result;
use chat_digest::cli;
use clap::Parser;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    if let Err(err) = cli::dispatch(args) {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
    Ok(())
}
