use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use env_logger::Env;
use nrbf_reader::{parse_and_resolve, parse_in_place, UnresolvedPolicy, Value};

/// Dump an MS-NRBF stream as JSON.
#[derive(Parser)]
#[command(name = "nrbf-dump", about = "Decode an MS-NRBF stream to JSON", version)]
struct Cli {
    /// Path to the file holding the MS-NRBF stream.
    input: PathBuf,

    /// The input file holds base64 text rather than raw bytes.
    #[arg(long, default_value_t = false)]
    base64: bool,

    /// Reference resolution mode.
    #[arg(long, value_enum, default_value_t = Mode::Expand)]
    mode: Mode,

    /// Pretty-print the JSON output.
    #[arg(long, default_value_t = false)]
    pretty: bool,

    /// Replace an unresolved or cyclic reference with a stub instead of
    /// failing the whole dump.
    #[arg(long, default_value_t = false)]
    allow_stub_references: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Resolve references into an acyclic tree (the default, JSON-friendly).
    Expand,
    /// Resolve references in place; the result may contain cycles and is
    /// reported as a debug dump rather than JSON.
    InPlace,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(Failure::Io(err)) => {
            eprintln!("nrbf-dump: {err}");
            ExitCode::from(2)
        }
        Err(Failure::Parse(err)) => {
            eprintln!("nrbf-dump: {err}");
            ExitCode::from(1)
        }
    }
}

enum Failure {
    Io(std::io::Error),
    Parse(nrbf_reader::ParseError),
}

impl From<std::io::Error> for Failure {
    fn from(err: std::io::Error) -> Self {
        Failure::Io(err)
    }
}

impl From<nrbf_reader::ParseError> for Failure {
    fn from(err: nrbf_reader::ParseError) -> Self {
        Failure::Parse(err)
    }
}

fn run() -> Result<(), Failure> {
    let cli = Cli::parse();

    let raw = fs::read(&cli.input)?;
    let bytes = if cli.base64 {
        let text: Vec<u8> = raw.into_iter().filter(|b| !b.is_ascii_whitespace()).collect();
        base64::Engine::decode(&base64::engine::general_purpose::STANDARD, text).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, format!("invalid base64 input: {e}"))
        })?
    } else {
        raw
    };

    let policy = if cli.allow_stub_references {
        UnresolvedPolicy::Stub
    } else {
        UnresolvedPolicy::Fail
    };

    match cli.mode {
        Mode::Expand => {
            let value = parse_and_resolve(&bytes[..], policy)?;
            print_json(&value, cli.pretty);
        }
        Mode::InPlace => {
            let graph = parse_in_place(&bytes[..], policy)?;
            println!("{:#?}", graph.borrow());
        }
    }

    Ok(())
}

fn print_json(value: &Value, pretty: bool) {
    let json = to_json(value);
    let text = if pretty {
        serde_json::to_string_pretty(&json)
    } else {
        serde_json::to_string(&json)
    }
    .expect("Value never produces non-serializable JSON");
    println!("{text}");
}

/// Maps [`Value`] to `serde_json::Value`; kept in the binary crate so the
/// library stays interchange-format-agnostic.
fn to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as J;

    match value {
        Value::Null => J::Null,
        Value::Boolean(b) => J::Bool(*b),
        Value::Integer(_) | Value::Float(_) => {
            serde_json::to_value(value).unwrap_or(J::Null)
        }
        Value::Decimal(s) => J::String(s.clone()),
        Value::Char(c) => J::String(c.to_string()),
        Value::String(s) => J::String(s.to_string()),
        Value::DateTime(dt) => J::String(
            dt.to_naive_datetime()
                .map(|naive| naive.to_string())
                .unwrap_or_else(|| format!("ticks:{}", dt.ticks)),
        ),
        Value::TimeSpan(ticks) => J::Number((*ticks).into()),
        Value::Array(items) => J::Array(items.iter().map(to_json).collect()),
        Value::Class(class) => {
            let mut map = serde_json::Map::with_capacity(class.fields.len());
            for (key, value) in &class.fields {
                map.insert(key.clone(), to_json(value));
            }
            J::Object(map)
        }
        Value::Reference(id) => J::String(format!("#ref:{id}")),
    }
}
