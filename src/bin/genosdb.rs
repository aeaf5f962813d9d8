use std::{env, process};

use genosdb::{
    GraphDb, GraphDbError,
    client::{CommandLineConfig, run_command},
};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("{}", CommandLineConfig::help());
        return;
    }
    let arg_refs: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
    let config = match CommandLineConfig::from_args(&arg_refs) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("error: {err}");
            eprint!("{}", CommandLineConfig::help());
            process::exit(2);
        }
    };

    let db = match config.graph_config().and_then(GraphDb::open) {
        Ok(db) => db,
        Err(err) => {
            eprintln!("{err}");
            let code = match err {
                GraphDbError::InvalidInput(_) | GraphDbError::InvalidQuery(_) => 2,
                _ => 1,
            };
            process::exit(code);
        }
    };

    match run_command(&db, &config) {
        Ok(output) => println!("{output}"),
        Err(err) => {
            eprintln!("command failed: {err}");
            drop(db);
            process::exit(1);
        }
    }
}
