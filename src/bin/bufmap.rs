//! bufmap Shell
//!
//! Interactive line-oriented shell over one map, for exercising and
//! inspecting the buffer layout.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use bufmap::{BinaryMap, BufferConfig, BufferManager, Config, DirectBufferManager, MappedBufferManager};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

type Map = BinaryMap<Box<dyn BufferManager>>;

/// bufmap Shell
#[derive(Parser, Debug)]
#[command(name = "bufmap")]
#[command(about = "Interactive shell over an off-heap binary map")]
#[command(version)]
struct Args {
    /// Initial (and minimum) buffer capacity in bytes
    #[arg(short, long, default_value = "1024")]
    capacity: usize,

    /// Maximum buffer capacity in bytes
    #[arg(short, long, default_value = "67108864")]
    max_capacity: usize,

    /// Back the map with this file instead of anonymous memory
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Wipe freed space and verify it in `check`
    #[arg(long)]
    strict: bool,

    /// Check the structure before and after every operation
    #[arg(long)]
    check: bool,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bufmap=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    tracing::info!("bufmap v{}", bufmap::VERSION);

    let config = Config::builder()
        .initial_capacity(args.capacity)
        .max_capacity(args.max_capacity)
        .strict(args.strict)
        .check_invariants(args.check)
        .build();

    let mut map = match open_map(&args, config) {
        Ok(map) => map,
        Err(e) => {
            tracing::error!("Failed to open map: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&mut map) {
        tracing::error!("Shell error: {}", e);
        std::process::exit(1);
    }
}

fn open_map(args: &Args, config: Config) -> bufmap::Result<Map> {
    let buffer: BufferConfig = config.buffer;
    match &args.file {
        Some(path) if path.exists() => {
            tracing::info!("Restoring map from {}", path.display());
            let manager = MappedBufferManager::open(path, &buffer)?;
            BinaryMap::restore(Box::new(manager) as Box<dyn BufferManager>, config)
        }
        Some(path) => {
            tracing::info!("Creating map in {}", path.display());
            let manager = MappedBufferManager::create(path, &buffer)?;
            BinaryMap::with_config(Box::new(manager) as Box<dyn BufferManager>, config)
        }
        None => {
            let manager = DirectBufferManager::new(&buffer)?;
            BinaryMap::with_config(Box::new(manager) as Box<dyn BufferManager>, config)
        }
    }
}

fn run(map: &mut Map) -> io::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        write!(stdout, "bufmap> ")?;
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            // end of input
            return Ok(());
        }

        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&command, rest)) = words.split_first() else {
            continue;
        };

        if matches!(command, "quit" | "exit" | "bye" | "q") {
            return Ok(());
        }

        match execute(map, command, rest) {
            Ok(output) => {
                if !output.is_empty() {
                    writeln!(stdout, "{}", output)?;
                }
            }
            Err(e) => writeln!(stdout, "error: {}", e)?,
        }
    }
}

fn execute(map: &mut Map, command: &str, args: &[&str]) -> bufmap::Result<String> {
    let output = match (command, args) {
        ("get", [key]) => format_value(map.get(key)?),
        ("put", [key, value]) => format_value(map.put(*key, *value)?),
        ("remove", [key]) => format_value(map.remove(key)?),
        ("clear", []) => {
            map.clear()?;
            String::new()
        }
        ("size", []) => map.len().to_string(),
        ("list", []) => map
            .entries_snapshot()?
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join("\n"),
        ("keys", []) => {
            let keys: bufmap::Result<Vec<_>> = map.keys()?.collect();
            keys?.iter().map(|key| key.to_string()).collect::<Vec<_>>().join("\n")
        }
        ("dump", []) => map.dump(),
        ("check", []) => {
            map.check("check command")?;
            "ok".to_string()
        }
        ("stats", []) => format!("{:#?}", map.stats()),
        ("help", _) => HELP.to_string(),
        _ => format!("unknown command '{}'; try help", command),
    };
    Ok(output)
}

fn format_value(value: Option<bufmap::Binary>) -> String {
    value.map_or_else(|| "(none)".to_string(), |v| v.to_string())
}

const HELP: &str = "\
get <key>            value stored for key
put <key> <value>    store value, print the previous one
remove <key>         remove key, print its value
clear                remove every entry
size                 number of entries
list                 every key=value in buffer order
keys                 every key in bucket order
dump                 counters, buffer hex and list heads
check                validate the buffer structure
stats                counters
quit | exit | bye | q";
