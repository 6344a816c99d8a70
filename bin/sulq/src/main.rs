use std::{
    io::{BufRead, Write},
    process::ExitCode,
};

use sul_core::show_duration;
use sul_oracle::{prelude::*, Config};

use tracing::{debug, error, info, trace};
use tracing_subscriber::{filter, prelude::*};

use clap::{Arg, ArgMatches, Command};

fn cli() -> clap::Command {
    Command::new("sulq")
    .about("Answers membership queries by running them against a system under learning")
    .subcommand_required(true)
    .arg(
        Arg::new("config")
        .short('c')
        .long("config")
        .required(true)
        .help("TOML file describing the alphabet, the process and how queries are executed")
    )
    .arg(
        Arg::new("verbosity")
        .short('v')
        .long("verbosity")
        .num_args(0..=1)
        .require_equals(true)
        .value_parser(["info", "debug", "trace"])
        .default_missing_value("info")
    )
    .subcommand(
        Command::new("query")
        .about("reads one query per line from stdin, either `prefix | suffix` or a plain word, and prints the response to the suffix")
    )
    .subcommand(
        Command::new("alphabet")
        .about("prints the configured input alphabet")
    )
}

fn setup_logging(matches: &ArgMatches) {
    let level = match matches
        .try_get_one::<String>("verbosity")
        .ok()
        .flatten()
        .map(|m| m.as_str())
    {
        Some("trace") => filter::LevelFilter::TRACE,
        Some("debug") => filter::LevelFilter::DEBUG,
        Some("info") => filter::LevelFilter::INFO,
        _ => filter::LevelFilter::WARN,
    };

    let stderr_log = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(stderr_log.with_filter(level))
        .init();

    trace!("setup {level} logging");
}

/// Splits a line of the form `a b | c d` into prefix and suffix, a line without `|` is a query
/// with empty prefix.
fn parse_query(line: &str) -> (Word, Word) {
    let symbols = |part: &str| part.split_whitespace().map(str::to_string).collect();
    match line.split_once('|') {
        Some((prefix, suffix)) => (symbols(prefix), symbols(suffix)),
        None => (Word::epsilon(), symbols(line)),
    }
}

fn answer_queries(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let mut oracle = config.start()?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let start = std::time::Instant::now();
    for line in std::io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let (prefix, suffix) = parse_query(&line);
        debug!("answering [{} | {}]", prefix.show(), suffix.show());
        let answer = oracle.answer_query(&prefix, &suffix)?;
        writeln!(out, "{answer}")?;
        out.flush()?;
    }

    info!(
        "executed {} queries ({} cached) in {}",
        oracle.executions(),
        oracle.cache_len(),
        show_duration(start.elapsed())
    );
    oracle.close()?;
    Ok(())
}

fn print_alphabet(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", config.alphabet()?);
    Ok(())
}

pub fn main() -> ExitCode {
    let matches = cli().get_matches();

    setup_logging(&matches);

    let Some(path) = matches.get_one::<String>("config") else {
        unreachable!("config is a required argument")
    };
    let config = match Config::load(path) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            eprintln!("sulq: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match matches.subcommand() {
        Some(("query", _sub_matches)) => answer_queries(&config),
        Some(("alphabet", _sub_matches)) => print_alphabet(&config),
        _ => unreachable!(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("sulq: {e}");
            ExitCode::FAILURE
        }
    }
}
