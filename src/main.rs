use std::{env, process};

use splitledger_lib::{process_balances, process_settlement, GroupId, Settings};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: splitledger_bin <facts.csv> <group-id> [balances]";

fn main() {
    let settings = match Settings::new() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("invalid settings: {}", e);
            process::exit(1);
        }
    };

    // stdout carries the csv, logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&settings.log_level))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<_> = env::args_os().skip(1).collect();
    let (csv_path, group) = match args.as_slice() {
        [path, group, ..] => match group.to_str().and_then(|g| g.parse::<u32>().ok()) {
            Some(group) => (path, GroupId::new(group)),
            None => {
                eprintln!("group id must be a number\n{}", USAGE);
                process::exit(1);
            }
        },
        _ => {
            eprintln!("Missing arguments\n{}", USAGE);
            process::exit(1);
        }
    };
    let balances_only = args.get(2).is_some_and(|mode| mode.to_str() == Some("balances"));

    let calculator = settings.calculator();
    let result = if balances_only {
        process_balances(csv_path, group, &calculator)
    } else {
        process_settlement(csv_path, group, &calculator)
    };

    match result {
        Ok(result) => {
            print!("{}", result);
            process::exit(0);
        }
        Err(e) => {
            tracing::error!("settlement failed: {e}");
            eprintln!("an error occurred: {}", e);
            process::exit(1);
        }
    }
}
