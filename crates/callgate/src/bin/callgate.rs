use std::io::Read;
use std::process::ExitCode;
use std::thread;

use anyhow::Context;
use callgate::limits::EXECUTION_STACK_SIZE;
use callgate::{
    Engine, ExecutionResult, ExportKind, FuncIdx, Imports, Module, Value, execute, instantiate_with_limit,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "callgate", about = "Run WebAssembly functions under a call-depth limit")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute an exported function and print its results.
    Run {
        /// Path to a .wat or .wasm file. Reads from stdin if "-".
        file: String,
        /// Name of the exported function.
        function: String,
        /// Arguments, parsed according to the function's parameter types.
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
        /// Call depth to start at.
        #[arg(long, default_value_t = 0)]
        depth: u32,
    },
    /// List exported functions and their signatures.
    Exports {
        /// Path to a .wat or .wasm file. Reads from stdin if "-".
        file: String,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run { file, function, args, depth } => run(file, function, args, depth),
        Command::Exports { file } => exports(file),
    }
}

fn run(file: String, function: String, args: Vec<String>, depth: u32) -> anyhow::Result<ExitCode> {
    let bytes = read_input(&file)?;
    // Instances are single-threaded, so everything from loading to execution
    // happens on a thread with enough stack for a full-depth call chain.
    let worker = thread::Builder::new()
        .name("callgate-exec".into())
        .stack_size(EXECUTION_STACK_SIZE)
        .spawn(move || -> anyhow::Result<ExecutionResult> {
            let engine = Engine::default();
            let module = Module::from_file_bytes(&engine, &bytes)?;
            let func_idx = module
                .find_exported_function(&function)
                .with_context(|| format!("function {function} is not exported"))?;
            let ty = module
                .func_type(func_idx)
                .with_context(|| format!("function {function} has no type"))?;
            if ty.params().len() != args.len() {
                anyhow::bail!("{function} expects {} arguments, got {}", ty.params().len(), args.len());
            }
            let args = args
                .iter()
                .zip(ty.params())
                .map(|(text, ty)| Value::parse(text, *ty))
                .collect::<anyhow::Result<Vec<_>>>()?;

            let instance = instantiate_with_limit(module, Imports::default(), engine.memory_pages_limit())?;
            Ok(execute(&instance, func_idx, &args, depth))
        })
        .context("failed to spawn execution thread")?;
    let result = match worker.join() {
        Ok(result) => result?,
        Err(panic) => std::panic::resume_unwind(panic),
    };

    match result {
        ExecutionResult::Trapped => {
            println!("trapped");
            Ok(ExitCode::FAILURE)
        }
        ExecutionResult::Success(values) => {
            let rendered: Vec<String> = values.iter().map(Value::to_string).collect();
            println!("{}", rendered.join(" "));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn exports(file: String) -> anyhow::Result<ExitCode> {
    let bytes = read_input(&file)?;
    let module = Module::from_file_bytes(&Engine::default(), &bytes)?;
    for export in module.exports() {
        if export.kind != ExportKind::Func {
            continue;
        }
        if let Some(ty) = module.func_type(FuncIdx(export.index)) {
            println!("{} {:?} -> {:?}", export.name, ty.params(), ty.results());
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn read_input(file: &str) -> anyhow::Result<Vec<u8>> {
    if file == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        std::fs::read(file).with_context(|| format!("failed to read {file}"))
    }
}
