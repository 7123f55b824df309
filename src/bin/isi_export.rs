//! Snapshot export CLI.
//!
//! Reads per-axis score files from a directory and materializes the
//! immutable snapshot for one (methodology, year). Refuses to overwrite
//! an existing snapshot unless `--force` is given.

use std::path::PathBuf;
use std::sync::Arc;

use isidex::methodology::MethodologyRegistry;
use isidex::provider::JsonDirScores;
use isidex::snapshot::{cleanup_partial_snapshots, Materializer};

struct Config {
    methodology: Option<String>,
    year: Option<i32>,
    snapshot_root: PathBuf,
    registry: PathBuf,
    scores_dir: PathBuf,
    force: bool,
    cleanup: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            methodology: None,
            year: None,
            snapshot_root: PathBuf::from("./snapshots"),
            registry: PathBuf::from("./registry.json"),
            scores_dir: PathBuf::from("./scores"),
            force: false,
            cleanup: false,
        }
    }
}

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--methodology" | "-m" => {
                config.methodology = Some(take_value(&args, i, "--methodology"));
                i += 2;
            }
            "--year" | "-y" => {
                let raw = take_value(&args, i, "--year");
                let year: i32 = raw.parse().unwrap_or_else(|_| {
                    eprintln!("error: invalid year: {raw}");
                    std::process::exit(64);
                });
                config.year = Some(year);
                i += 2;
            }
            "--snapshot-root" => {
                config.snapshot_root = PathBuf::from(take_value(&args, i, "--snapshot-root"));
                i += 2;
            }
            "--registry" => {
                config.registry = PathBuf::from(take_value(&args, i, "--registry"));
                i += 2;
            }
            "--scores-dir" => {
                config.scores_dir = PathBuf::from(take_value(&args, i, "--scores-dir"));
                i += 2;
            }
            "--force" => {
                config.force = true;
                i += 1;
            }
            "--cleanup" => {
                config.cleanup = true;
                i += 1;
            }
            "--help" | "-h" => {
                println!("isi-export - ISI snapshot materialization");
                println!();
                println!("USAGE:");
                println!("    isi-export [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -m, --methodology <VER>    Methodology version [default: latest]");
                println!("    -y, --year <YEAR>          Snapshot year [default: latest]");
                println!("        --snapshot-root <DIR>  Snapshot root [default: ./snapshots]");
                println!("        --registry <FILE>      Registry file [default: ./registry.json]");
                println!("        --scores-dir <DIR>     Axis score files [default: ./scores]");
                println!("        --force                Replace an existing snapshot (development only)");
                println!("        --cleanup              Remove leftover staging directories and exit");
                println!("    -h, --help                 Print help information");
                std::process::exit(0);
            }
            arg => {
                eprintln!("error: unknown argument: {arg}");
                std::process::exit(64);
            }
        }
    }

    config
}

fn take_value(args: &[String], i: usize, flag: &str) -> String {
    args.get(i + 1).cloned().unwrap_or_else(|| {
        eprintln!("error: {flag} requires a value");
        std::process::exit(64);
    })
}

fn main() {
    let config = parse_args();

    if config.cleanup {
        match cleanup_partial_snapshots(&config.snapshot_root) {
            Ok(removed) => {
                println!("removed {removed} staging director(ies)");
                return;
            }
            Err(e) => {
                eprintln!("error: cleanup failed: {e}");
                std::process::exit(1);
            }
        }
    }

    let registry = Arc::new(MethodologyRegistry::load(&config.registry).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        std::process::exit(64);
    }));

    let methodology = config
        .methodology
        .unwrap_or_else(|| registry.latest_version().to_string());
    let year = config.year.unwrap_or_else(|| {
        registry
            .get(&methodology)
            .map(|m| m.latest_year)
            .unwrap_or_else(|e| {
                eprintln!("error: {e}");
                std::process::exit(64);
            })
    });

    let provider = Arc::new(JsonDirScores::new(&config.scores_dir));
    let materializer = Materializer::new(&config.snapshot_root, registry, provider);

    match materializer.materialize(year, &methodology, config.force) {
        Ok(path) => {
            println!("snapshot {methodology}/{year} published at {}", path.display());
        }
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}
