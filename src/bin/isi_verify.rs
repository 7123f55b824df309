//! Snapshot integrity verification CLI.
//!
//! Exit codes: 0 valid, 1 missing files, 2 manifest mismatch, 3 hash
//! mismatch, 4 structural violation, 5 methodology mismatch.

use std::path::PathBuf;

use isidex::methodology::MethodologyRegistry;
use isidex::snapshot::validate_snapshot;

struct Config {
    methodology: Option<String>,
    year: Option<i32>,
    snapshot_root: PathBuf,
    registry: PathBuf,
    json: bool,
    quiet: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            methodology: None,
            year: None,
            snapshot_root: PathBuf::from("./snapshots"),
            registry: PathBuf::from("./registry.json"),
            json: false,
            quiet: false,
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
            "--json" => {
                config.json = true;
                i += 1;
            }
            "--quiet" | "-q" => {
                config.quiet = true;
                i += 1;
            }
            "--help" | "-h" => {
                println!("isi-verify - ISI snapshot integrity verification");
                println!();
                println!("USAGE:");
                println!("    isi-verify [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -m, --methodology <VER>    Methodology version [default: latest]");
                println!("    -y, --year <YEAR>          Snapshot year [default: latest]");
                println!("        --snapshot-root <DIR>  Snapshot root [default: ./snapshots]");
                println!("        --registry <FILE>      Registry file [default: ./registry.json]");
                println!("        --json                 Emit the full report as JSON");
                println!("    -q, --quiet                Suppress per-check output");
                println!("    -h, --help                 Print help information");
                println!();
                println!("EXIT CODES:");
                println!("    0  snapshot is valid");
                println!("    1  missing files");
                println!("    2  manifest mismatch");
                println!("    3  computation hash mismatch");
                println!("    4  structural invariant violation");
                println!("    5  methodology mismatch");
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

    let registry = MethodologyRegistry::load(&config.registry).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        std::process::exit(64);
    });

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

    let snapshot_dir = config
        .snapshot_root
        .join(&methodology)
        .join(year.to_string());
    let report = validate_snapshot(&snapshot_dir, &registry, &methodology, year);

    if config.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("error: failed to serialize report: {e}");
                std::process::exit(64);
            }
        }
    } else if !config.quiet {
        println!("Verifying snapshot {methodology}/{year} at {}", snapshot_dir.display());
        for check in &report.checks {
            let mark = if check.passed { "PASS" } else { "FAIL" };
            println!("  [{mark}] {}: {}", check.check, check.detail);
        }
        if report.valid {
            println!("Snapshot {methodology}/{year} is VALID");
        } else {
            println!(
                "Snapshot {methodology}/{year} is INVALID ({} error(s))",
                report.errors.len()
            );
        }
    }

    std::process::exit(report.exit_code);
}
