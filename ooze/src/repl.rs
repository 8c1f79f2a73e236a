use std::io::{BufRead, Write};
use std::path::PathBuf;

use ooze::{BindingState, Bindings, Env, ExecutorRef};

fn help() -> Vec<String> {
    vec![
        ":h - This message".to_string(),
        ":b - List all bindings (* means they are not ready, & means they are borrowed)".to_string(),
        ":f - List all environment and script functions".to_string(),
        ":t - List all registered types and their capabilities".to_string(),
        ":r binding - Release the given binding".to_string(),
        ":a bindings... - Await the given bindings or everything if unspecified".to_string(),
        ":e file - Evaluate the given script file".to_string(),
    ]
}

fn list_bindings(env: &Env, bindings: &Bindings) -> Vec<String> {
    let mut output = vec![format!("{} binding(s)", bindings.len())];
    let mut names: Vec<&String> = bindings.keys().collect();
    names.sort();
    for name in names {
        let binding = &bindings[name];
        let marker = match binding.state() {
            BindingState::Ready => "",
            BindingState::Borrowed => "&",
            BindingState::NotReady => "*",
        };
        output.push(format!(
            "  {name}: {marker}{}",
            env.pretty_print(binding.ty)
        ));
    }
    output
}

// Ubiquitous overload sets are collapsed to a count in `:f` output.
const COLLAPSE: [&str; 2] = ["clone", "to_string"];

fn list_functions(env: &Env) -> Vec<String> {
    let globals = env.globals();

    let mut lines = Vec::new();
    for (name, ty) in &globals {
        if COLLAPSE.contains(&name.as_str()) {
            continue;
        }
        let pretty = env.pretty_print(*ty);
        let signature = pretty.strip_prefix("fn").unwrap_or(&pretty);
        lines.push(format!("  {name}{signature}"));
    }
    lines.sort();

    let mut output = vec![format!("{} function(s)", lines.len())];
    for collapsed in COLLAPSE {
        let count = globals.iter().filter(|(n, _)| n == collapsed).count();
        if count > 0 {
            output.push(format!("  {collapsed} [{count} overloads]"));
        }
    }
    output.extend(lines);
    output
}

fn list_types(env: &Env) -> Vec<String> {
    let names = env.type_names();
    let mut output = vec![format!("{} type(s)", names.len())];
    for name in names {
        let to_string = if env.has_to_string(&name) { "Y" } else { "N" };
        output.push(format!("  {name:20} [to_string: {to_string}]"));
    }
    output
}

fn release(bindings: &mut Bindings, name: &str) -> Vec<String> {
    if bindings.remove(name).is_some() {
        Vec::new()
    } else {
        vec![format!("Binding {name} not found")]
    }
}

fn await_bindings(bindings: &mut Bindings, names: &[&str]) -> Vec<String> {
    let mut output = Vec::new();
    let targets: Vec<String> = if names.is_empty() {
        bindings.keys().cloned().collect()
    } else {
        names.iter().map(|n| n.to_string()).collect()
    };

    for name in targets {
        match bindings.get_mut(&name) {
            Some(binding) => {
                let values = std::mem::take(&mut binding.values);
                binding.values = values
                    .into_iter()
                    .map(|v| v.await_ready())
                    .collect();
            }
            None => output.push(format!("Binding {name} not found")),
        }
    }
    output
}

fn eval_file(env: &mut Env, path: &str) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(text) => match env.parse_scripts(&[&text]) {
            Ok(()) => Vec::new(),
            Err(errs) => errs.lines,
        },
        Err(err) => vec![format!("unable to read {path}: {err}")],
    }
}

/// Evaluate one REPL line: a `:` command, or an expression to run.
pub fn step_repl(
    ex: &ExecutorRef,
    env: &mut Env,
    bindings: &mut Bindings,
    line: &str,
) -> Vec<String> {
    let line = line.trim();
    if line.is_empty() {
        return Vec::new();
    }

    if let Some(cmd) = line.strip_prefix(':') {
        let parts: Vec<&str> = cmd.split_whitespace().collect();
        return match parts.as_slice() {
            ["h"] => help(),
            ["b"] => list_bindings(env, bindings),
            ["f"] => list_functions(env),
            ["t"] => list_types(env),
            ["r", name] => release(bindings, name),
            ["a", names @ ..] => await_bindings(bindings, names),
            ["e", file] => eval_file(env, file),
            _ => vec!["Error parsing command".to_string()],
        };
    }

    match env.run_to_string(ex, bindings, line) {
        Ok(out) if out.is_empty() => Vec::new(),
        Ok(out) => vec![out],
        Err(errs) => errs.lines,
    }
}


pub fn run_repl(ex: &ExecutorRef, env: &mut Env, files: &[PathBuf]) -> i32 {
    let mut bindings = Bindings::new();

    for file in files {
        for line in eval_file(env, &file.display().to_string()) {
            println!("{line}");
        }
    }

    println!("Welcome to the ooze repl!");
    println!("Try :h for help. Use Ctrl^D to exit.");
    print!("> ");
    let _ = std::io::stdout().flush();

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        for out in step_repl(ex, env, &mut bindings, &line) {
            println!("{out}");
        }
        print!("> ");
        let _ = std::io::stdout().flush();
    }

    0
}
