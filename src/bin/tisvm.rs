//! Node program runner.
//!
//! Compiles one or more program files, places them left to right on a
//! one-row grid and runs the grid for a number of ticks.
//!
//! # Usage
//! ```text
//! tisvm <program>... [OPTIONS]
//! ```
//!
//! # Arguments
//! - `program`: Node source file. The first file runs on the leftmost node.
//!
//! # Options
//! - `-t, --ticks <n>`: Number of ticks to run (defaults to 100)
//! - `-c, --check`: Only compile, reporting the first diagnostic per file
//! - `-u, --unbounded`: Lift the 40 line by 18 column program limits
//! - `-q, --quiet`: Only log warnings and errors
//!
//! # Examples
//! ```text
//! tisvm producer.tis consumer.tis
//! tisvm producer.tis consumer.tis --ticks 10
//! tisvm program.tis --check
//! ```

use std::env;
use std::fs;
use std::process;
use tisvm::utils::log::{self, Level};
use tisvm::virtual_machine::assembler::{Compiler, CompilerConfig};
use tisvm::virtual_machine::errors::GridError;
use tisvm::virtual_machine::grid::{Grid, GridConfig};
use tisvm::{error, info};

const DEFAULT_TICKS: u64 = 100;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage(&args[0]);
        process::exit(1);
    }

    let mut files: Vec<String> = Vec::new();
    let mut ticks = DEFAULT_TICKS;
    let mut check = false;
    let mut limits = CompilerConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            k @ ("--ticks" | "-t") => {
                i += 1;
                if i >= args.len() {
                    error!("{k} requires an argument");
                    process::exit(1);
                }
                ticks = args[i].parse::<u64>().unwrap_or_else(|_| {
                    error!("Invalid tick count: '{}' is not a valid number", args[i]);
                    process::exit(1);
                });
                i += 1;
            }
            "--check" | "-c" => {
                check = true;
                i += 1;
            }
            "--unbounded" | "-u" => {
                limits = CompilerConfig::unbounded();
                i += 1;
            }
            "--quiet" | "-q" => {
                log::set_max_level(Level::Warn);
                i += 1;
            }
            other if other.starts_with('-') => {
                error!("Unexpected argument: {}\n", other);
                print_usage(&args[0]);
                process::exit(1);
            }
            file => {
                files.push(file.to_string());
                i += 1;
            }
        }
    }

    if files.is_empty() {
        error!("No program files given\n");
        print_usage(&args[0]);
        process::exit(1);
    }

    let sources: Vec<String> = files
        .iter()
        .map(|path| {
            read_source(path).unwrap_or_else(|e| {
                error!("{e}");
                process::exit(1)
            })
        })
        .collect();

    if check {
        let compiler = Compiler::with_config(limits);
        let mut failed = false;
        for (path, source) in files.iter().zip(&sources) {
            match compiler.compile(source) {
                Ok(program) => info!("{path}: {} instruction(s)", program.len()),
                Err(diagnostic) => {
                    eprint!("{}", diagnostic.render(path, source));
                    failed = true;
                }
            }
        }
        process::exit(if failed { 1 } else { 0 });
    }

    let mut grid = Grid::new(GridConfig {
        width: files.len(),
        height: 1,
        compiler: limits,
    });

    for (x, (path, source)) in files.iter().zip(&sources).enumerate() {
        match grid.load(x, 0, source) {
            Ok(()) => {}
            Err(GridError::Compile { source: diagnostic, .. }) => {
                eprint!("{}", diagnostic.render(path, source));
                process::exit(1);
            }
            Err(e) => {
                error!("{e}");
                process::exit(1);
            }
        }
    }

    grid.run(ticks);
    info!("Ran {} tick(s) on {} node(s)", grid.ticks(), files.len());
    print_nodes(&grid, &files);
}

fn read_source(path: &str) -> Result<String, GridError> {
    fs::read_to_string(path).map_err(|e| GridError::Io {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

fn print_nodes(grid: &Grid, files: &[String]) {
    let name_w = files
        .iter()
        .map(|f| f.chars().count())
        .max()
        .unwrap_or(0)
        .max("node".len());

    let header = format!(
        "{:<name_w$}  {:>6}  {:>6}  {:>3}  {:>4}  {:<5}  status",
        "node", "acc", "bak", "pc", "line", "last"
    );
    println!("{header}");
    println!("{}", "-".repeat(header.len() + 8));

    for ((x, _), node) in grid.nodes() {
        let name = files.get(x).map_or("?", String::as_str);
        let line = node
            .current_line()
            .map_or_else(|| "-".to_string(), |l| l.to_string());
        let last = node.last().map_or("-", |p| p.name());
        println!(
            "{:<name_w$}  {:>6}  {:>6}  {:>3}  {:>4}  {:<5}  {}",
            name,
            node.acc(),
            node.bak(),
            node.pc(),
            line,
            last,
            node.status()
        );
    }
}

const USAGE: &str = "\
Usage: {program} <program>... [OPTIONS]

Arguments:
  program                Node source file, placed left to right

Options:
  -t, --ticks <n>        Number of ticks to run (default: 100)
  -c, --check            Only compile and report diagnostics
  -u, --unbounded        Lift the 40x18 program size limits
  -q, --quiet            Only log warnings and errors
  -h, --help             Show this help message

Examples:
  {program} producer.tis consumer.tis
  {program} producer.tis consumer.tis --ticks 10
  {program} program.tis --check";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}
