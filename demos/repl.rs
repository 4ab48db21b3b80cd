use clap::Parser;
use rustmal::ast::Value;
use rustmal::evaluator::Environment;
use rustmal::printer::pr_str;
use rustmal::{create_global_env, rep};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::panic;
use std::process;
use tracing_subscriber::EnvFilter;

/// Interactive interpreter and script runner
#[derive(Debug, Parser)]
#[command(name = "rustmal", version, about)]
struct Args {
    /// Script to load instead of starting the interactive loop
    script: Option<String>,

    /// Arguments made available to the script as *ARGV*
    #[arg(trailing_var_arg = true)]
    script_args: Vec<String>,

    /// Log filter used when RUST_LOG is not set (e.g. "debug", "rustmal=trace")
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = panic::catch_unwind(|| match &args.script {
        Some(script) => run_script(script, &args.script_args),
        None => run_repl(),
    });

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

/// Bind `*ARGV*`, load the script and exit non-zero if it fails
fn run_script(script: &str, script_args: &[String]) {
    let env = create_global_env();
    env.set(
        "*ARGV*",
        script_args.iter().map(|arg| Value::from(arg.as_str())).collect(),
    );

    let form = format!("(load-file {})", pr_str(&Value::from(script), true));
    if let Some(output) = rep(&form, &env)
        && output != "nil"
    {
        eprintln!("{output}");
        process::exit(1);
    }
}

fn run_repl() {
    let env = create_global_env();
    let _ = rep(r#"(println (str "Mal [" *host-language* "]"))"#, &env);
    println!("Type :help for more commands, or Ctrl+D to exit.");
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            eprintln!("Could not initialize REPL: {err}");
            process::exit(1);
        }
    };

    loop {
        match rl.readline("user> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match line {
                    ":help" => {
                        print_help();
                        continue;
                    }
                    ":env" => {
                        print_environment(&env);
                        continue;
                    }
                    ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                // Errors come back as printable values like any other result
                if let Some(output) = rep(line, &env) {
                    println!("{output}");
                }
            }

            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+D     - Exit the interpreter");
    println!();
    println!("Special forms:");
    println!("  def! defmacro! let* do if fn* quote quasiquote macroexpand try*/catch*");
    println!();
    println!("Examples:");
    println!("  (+ 1 2 3)");
    println!("  (def! fib (fn* (n) (if (< n 2) n (+ (fib (- n 1)) (fib (- n 2))))))");
    println!("  (let* (xs [1 2 3]) `(0 ~@xs))");
    println!("  (try* (throw {{:code 7}}) (catch* e (str \"caught: \" e)))");
    println!("  (load-file \"script.mal\")");
    println!();
}

fn print_environment(env: &Environment) {
    let bindings = env.get_all_bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    // Separate built-in functions from user-defined values
    let mut builtins = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in bindings {
        match value {
            Value::Builtin(..) => builtins.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    if !builtins.is_empty() {
        println!("Built-in functions ({}):", builtins.len());
        for row in builtins.chunks(4) {
            for name in row {
                print!("  {name:<15}");
            }
            println!();
        }
        println!();
    }

    if !user_defined.is_empty() {
        println!("User-defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}
