//! SPARQL Condition Compiler - CLI
//!
//! Compiles a JSON condition request into a SPARQL `WHERE` fragment.

use std::fs;
use std::path::Path;

use clap::{Arg, ArgAction, Command};
use log::{LevelFilter, info};

use sparql_condition::compile_request_json;

/// Warn by default, one level per `-v` / `-q`.
fn log_level(verbose: u8, quiet: u8) -> LevelFilter {
    let levels = [
        LevelFilter::Error,
        LevelFilter::Warn,
        LevelFilter::Info,
        LevelFilter::Debug,
        LevelFilter::Trace,
    ];
    let adjusted = (1 + i16::from(verbose) - i16::from(quiet)).clamp(0, levels.len() as i16 - 1);
    levels[adjusted as usize]
}

fn init_logging(verbose: u8, quiet: u8) {
    env_logger::Builder::from_default_env()
        .format_target(false)
        .filter_level(log_level(verbose, quiet))
        .init();
}

fn write_file(path: &str, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = Command::new("sparql-condition")
        .version("0.1")
        .about("Compiles entity field conditions into SPARQL WHERE fragments")
        .arg(
            Arg::new("request")
                .short('r')
                .long("request")
                .value_name("REQUEST")
                .help("JSON compile request or path to a .json file")
                .num_args(1)
                .required(true),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Write the result to FILE instead of stdout")
                .num_args(1),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print the fragment together with the resolved field mappings as JSON")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Increase logging verbosity")
                .action(ArgAction::Count),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Decrease logging verbosity")
                .action(ArgAction::Count),
        )
        .get_matches();

    init_logging(
        matches.get_count("verbose"),
        matches.get_count("quiet"),
    );

    let request_text = match matches.get_one::<String>("request") {
        Some(r) if Path::new(r).exists() => fs::read_to_string(r)?,
        Some(r) => r.clone(),
        None => return Err("No request specified. Use -r <json> or -r <path/to/request.json>".into()),
    };

    let output = compile_request_json(&request_text)?;
    info!(
        "Compiled conditions for entity type '{}' ({} fields mapped)",
        output.entity_type,
        output.field_mappings.len()
    );

    let rendered = if matches.get_flag("json") {
        serde_json::to_string_pretty(&output)?
    } else {
        output.fragment
    };

    match matches.get_one::<String>("output") {
        Some(path) => {
            write_file(path, &rendered)?;
            info!("Wrote {}", path);
        }
        None => println!("{}", rendered),
    }

    Ok(())
}
