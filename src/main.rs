use std::env;
use std::fs;
use std::io::{self, Write};
use std::sync::Once;

use lox_arith::compiler;
use lox_arith::debug::disassemble_chunk;
use lox_arith::prelude::*;

/// The conventional exit code in BSD Unixes.
/// See: man 3 sysexits
mod ex {
    /// The conventional exit code for usage error.
    pub const USAGE: i32 = 64;
    /// When the input data is incorrect -- for example, a compile-time error.
    pub const DATAERR: i32 = 65;
    /// An internal software error occured.
    pub const SOFTWARE: i32 = 70;
    /// An error occured while doing I/O on a file.
    pub const IOERR: i32 = 74;
}

/// Command line options.
#[derive(Default)]
struct Options {
    /// Print the compiled chunk before running it.
    disassemble: bool,
    path: Option<String>,
}

static TRACING_INIT: Once = Once::new();

/// Sends library events to stderr. Enable with `RUST_LOG=lox_arith=debug` or
/// `RUST_LOG=lox_arith=trace`.
fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        // Only initialize if RUST_LOG is set
        if env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_writer(io::stderr)
                        .with_target(true)
                        .with_level(true),
                )
                .with(filter)
                .init();
        }
    });
}

fn main() {
    init_tracing();

    let Some(options) = parse_args(env::args().skip(1)) else {
        eprintln!("Usage: lox-arith [--disassemble] [path]");
        std::process::exit(ex::USAGE);
    };

    let status = match &options.path {
        None => repl(&options),
        Some(path) => run_file(path, &options),
    };

    std::process::exit(status)
}

/// Returns `None` when the arguments do not make sense.
fn parse_args(args: impl Iterator<Item = String>) -> Option<Options> {
    let mut options = Options::default();

    for arg in args {
        match arg.as_str() {
            "--disassemble" => options.disassemble = true,
            flag if flag.starts_with("--") => return None,
            _ if options.path.is_some() => return None,
            _ => options.path = Some(arg),
        }
    }

    Some(options)
}

/// Evaluate expressions interactively using the read-execute-print loop.
fn repl(options: &Options) -> i32 {
    let mut vm = VM::default();
    let mut line = String::with_capacity(1024);

    let stdin = io::stdin();

    loop {
        line.clear();

        print!("> ");
        // A prompt that fails to show is not worth stopping for.
        let _ = io::stdout().flush();
        match stdin.read_line(&mut line) {
            Ok(0) | Err(_) => {
                println!();
                break;
            }
            Ok(_) => {
                if line.trim().is_empty() {
                    continue;
                }
                // Errors were already reported; keep going.
                let _ = run(&mut vm, &line, options);
            }
        }
    }

    0
}

fn run_file(filename: &str, options: &Options) -> i32 {
    let source = match fs::read_to_string(filename) {
        Ok(s) => s,
        Err(_) => {
            eprintln!("Could not read file: {filename}");
            return ex::IOERR;
        }
    };
    let mut vm = VM::default();

    use InterpretationError::*;
    match run(&mut vm, &source, options) {
        Ok(_) => 0,
        Err(CompileError(_)) => ex::DATAERR,
        Err(RuntimeError(_)) => ex::SOFTWARE,
    }
}

/// Compiles and runs one program, printing its value or its errors.
fn run(vm: &mut VM, source: &str, options: &Options) -> lox_arith::Result<Value> {
    let result = compiler::compile(source).and_then(|chunk| {
        if options.disassemble {
            disassemble_chunk(&chunk, "code");
        }
        Ok(vm.execute(&chunk)?)
    });

    match &result {
        Ok(value) => println!("{value}"),
        Err(InterpretationError::CompileError(errors)) => {
            for error in errors {
                eprintln!("{error}");
            }
        }
        Err(InterpretationError::RuntimeError(error)) => eprintln!("{error}"),
    }

    result
}
