use std::path::PathBuf;

use anyhow::Context;
use bindhost::{Bridge, Config, Engine, HostFunction, HostValue, Module, Response};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directives.
const LOG_ENV: &str = "BINDHOST_LOG";

#[derive(Parser)]
#[command(name = "bindhost", about = "Host bridge for bindgen-style wasm modules")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List a module's imports and exports, flagging imports the standard
    /// operation table does not provide.
    Inspect {
        /// Path to a .wasm or .wat file.
        file: PathBuf,
    },
    /// Instantiate a module, run its start hook and optionally one export.
    Run {
        /// Path to a .wasm or .wat file.
        file: PathBuf,
        /// Export to call with no arguments after the start hook.
        #[arg(long)]
        invoke: Option<String>,
        /// Chunk size for streaming instantiation.
        #[arg(long, default_value_t = 64 * 1024)]
        chunk_size: usize,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Inspect { file } => inspect(file),
        Command::Run {
            file,
            invoke,
            chunk_size,
        } => run(file, invoke, chunk_size),
    }
}

fn read_module(path: &PathBuf) -> anyhow::Result<Vec<u8>> {
    let raw = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(wat::parse_bytes(&raw)?.into_owned())
}

fn inspect(file: PathBuf) -> anyhow::Result<()> {
    let bytes = read_module(&file)?;
    let engine = Engine::default();
    let module = Module::from_bytes(&engine, &bytes)?;
    let config = Config::from_env();
    let linker = bindhost::Linker::new(&config).with_std_ops();

    let abi = module.abi();
    println!("imports:");
    let missing = abi.missing_imports(&linker);
    for import in &abi.imports {
        let status = if missing.contains(&import) {
            "  (missing)".to_string()
        } else {
            linker
                .kind(&import.name)
                .map(|kind| format!("  [{kind:?}]"))
                .unwrap_or_default()
        };
        println!("  {}::{} {:?}{status}", import.module, import.name, import.kind);
    }
    println!("exports:");
    for export in &abi.exports {
        println!("  {} {:?}", export.name, export.kind);
    }
    Ok(())
}

fn run(file: PathBuf, invoke: Option<String>, chunk_size: usize) -> anyhow::Result<()> {
    let bytes = read_module(&file)?;
    let engine = Engine::default();
    let mut config = Config::from_env();
    config.trap_unknown_imports(true);
    let mut bridge = Bridge::with_std_ops(&engine, config);

    let console = HostValue::object();
    console
        .set_property(
            &HostValue::from("log"),
            HostFunction::native("log", |_, _, args| {
                let line: Vec<String> = args.iter().map(HostValue::to_string).collect();
                println!("{}", line.join(" "));
                Ok(HostValue::Undefined)
            })
            .into(),
        )
        .map_err(|fault| anyhow::anyhow!("{fault}"))?;
    bridge
        .define_global("console", console)
        .map_err(|fault| anyhow::anyhow!("{fault}"))?;

    let response = Response::from_bytes(Some("application/wasm"), bytes, chunk_size);
    futures::executor::block_on(bridge.init(response))?;
    bridge.run_microtasks();

    if let Some(name) = invoke {
        let results = bridge
            .call_dynamic(&name, &[])
            .map_err(|fault| anyhow::anyhow!("{name}: {fault}"))?;
        for result in results {
            println!("{result:?}");
        }
        let ran = bridge.run_microtasks();
        tracing::debug!(ran, "microtasks drained");
    }
    Ok(())
}
