use clap::error::ErrorKind;
use clap::Parser;
use conceptsim::analysis::{run, Cli};
use std::process;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            println!("Error, {e}");
            process::exit(2);
        }
    };

    println!("=== Concept vs. Document Feature Analysis ===\n");
    if let Err(e) = run(cli) {
        println!("Error, {e}");
        process::exit(1);
    }
}
