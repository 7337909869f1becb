use clap::Parser;
use tripwire::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
