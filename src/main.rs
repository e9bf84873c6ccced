//! GoTien CLI: Execute files or run the REPL.

use std::env;
use std::process;

use colored::Colorize;
use gotien::bytecode::print_disassembly;
use gotien::error::GotienError;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// CLI command to execute.
enum Command {
    /// Run a script file
    Run { file: String },
    /// Evaluate a string
    Eval { code: String },
    /// Start the REPL
    Repl,
}

/// CLI options parsed from arguments.
struct Options {
    command: Command,
    disassemble: bool,
}

fn print_usage() {
    eprintln!("GoTien {} - bytecode compiler and virtual machine", VERSION);
    eprintln!();
    eprintln!("Usage: gotien [options] [script.gt]");
    eprintln!("       gotien -e <code>");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -e <code>           Evaluate code and print the result");
    eprintln!("  -d, --disassemble   Print the bytecode before running");
    eprintln!("  --no-color          Disable colored diagnostics");
    eprintln!("  --version, -V       Show the version");
    eprintln!("  --help, -h          Show this help message");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  gotien                       Start interactive REPL");
    eprintln!("  gotien script.gt             Run a script file");
    eprintln!("  gotien -d script.gt          Show bytecode, then run");
    eprintln!("  gotien -e 'len(\"hello\")'     Evaluate code directly");
}

fn usage_error(message: &str) -> ! {
    eprintln!("{} {}", "Error:".red().bold(), message);
    print_usage();
    process::exit(64);
}

fn parse_args() -> Options {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut options = Options {
        command: Command::Repl,
        disassemble: false,
    };

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                process::exit(0);
            }
            "--version" | "-V" => {
                println!("gotien {}", VERSION);
                process::exit(0);
            }
            "--disassemble" | "-d" => options.disassemble = true,
            "--no-color" => colored::control::set_override(false),
            "-e" => {
                i += 1;
                if i >= args.len() {
                    usage_error("-e requires a code argument");
                }
                if !matches!(options.command, Command::Repl) {
                    usage_error("Only one script or -e argument can be given");
                }
                options.command = Command::Eval {
                    code: args[i].clone(),
                };
            }
            _ if arg.starts_with('-') => usage_error(&format!("Unknown option: {}", arg)),
            _ => {
                if !matches!(options.command, Command::Repl) {
                    usage_error("Only one script file can be specified");
                }
                options.command = Command::Run { file: arg.clone() };
            }
        }
        i += 1;
    }

    options
}

fn main() {
    let options = parse_args();

    match &options.command {
        Command::Repl => run_repl(),
        Command::Run { file } => run_file(file, &options),
        Command::Eval { code } => run_source(code, &options),
    }
}

fn run_file(path: &str, options: &Options) {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("{} Could not read '{}': {}", "Error:".red().bold(), path, e);
            process::exit(1);
        }
    };
    run_source(&source, options);
}

fn run_source(source: &str, options: &Options) {
    let result = gotien::compile(source).and_then(|bytecode| {
        if options.disassemble {
            print_disassembly(&bytecode);
            println!();
        }
        gotien::run_bytecode(bytecode)
    });

    match result {
        Ok(value) => println!("{}", value),
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            process::exit(exit_code(&e));
        }
    }
}

fn exit_code(err: &GotienError) -> i32 {
    match err {
        GotienError::Parse(_) | GotienError::Compile(_) => 65,
        GotienError::Runtime(_) => 70,
        GotienError::Io(_) => 1,
    }
}

fn run_repl() {
    if let Err(e) = gotien::repl::start() {
        eprintln!("{} {}", "Error:".red().bold(), e);
        process::exit(1);
    }
}
