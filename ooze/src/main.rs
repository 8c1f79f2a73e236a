#![forbid(unsafe_code)]

mod repl;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use ooze::{Bindings, Env};

#[derive(Parser)]
#[command(name = "ooze", about = "A strictly-typed embedded scripting language")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load the given scripts and print the result of `main()`.
    Run { files: Vec<PathBuf> },
    /// Start an interactive session with the given scripts loaded.
    Repl { files: Vec<PathBuf> },
}

fn load_scripts(env: &mut Env, files: &[PathBuf]) -> Result<(), Vec<String>> {
    let mut sources = Vec::new();
    for file in files {
        match std::fs::read_to_string(file) {
            Ok(text) => sources.push(text),
            Err(err) => return Err(vec![format!("unable to read {}: {err}", file.display())]),
        }
    }
    let refs: Vec<&str> = sources.iter().map(String::as_str).collect();
    env.parse_scripts(&refs).map_err(|errs| errs.lines)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut env = Env::with_primitives();
    let executor = ooze::make_task_executor(0);

    let code = match cli.command {
        Command::Run { files } => {
            if let Err(lines) = load_scripts(&mut env, &files) {
                for line in lines {
                    eprintln!("{line}");
                }
                return ExitCode::from(1);
            }
            let mut bindings = Bindings::new();
            match env.run_to_string(&executor, &mut bindings, "main()") {
                Ok(out) => {
                    println!("{out}");
                    0
                }
                Err(errs) => {
                    for line in errs.lines {
                        eprintln!("{line}");
                    }
                    1
                }
            }
        }
        Command::Repl { files } => repl::run_repl(&executor, &mut env, &files),
    };

    ExitCode::from(code as u8)
}
