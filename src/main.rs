use anyhow::Result;

use wmsfetch::cli::{Command, parse_args};
use wmsfetch::fetch::{run_fetch, run_plan};

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match parse_args(&args)? {
        Command::Fetch(config) => run_fetch(&config),
        Command::Plan(config) => run_plan(&config),
    }
}
