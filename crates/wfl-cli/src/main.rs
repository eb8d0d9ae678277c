//! WFL command-line tool
//!
//! Compile and evaluate formulas from the command line.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::{rngs::StdRng, SeedableRng};
use std::fs;
use std::path::PathBuf;
use wfl_formula::{builtins, Formula, FormulaDebugger, FormulaOptions, MapCallable};

#[derive(Parser)]
#[command(name = "wfl")]
#[command(author, version, about = "Evaluate WFL formulas", long_about = None)]
struct Cli {
    /// Log compilation and evaluation details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a formula and print the result
    Eval {
        /// Formula source (omit when using --file)
        formula: Option<String>,

        /// Read the formula from a file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Bind a variable: NAME=FORMULA (may be repeated)
        #[arg(long = "var", value_name = "NAME=FORMULA")]
        vars: Vec<String>,

        /// Seed for dice rolls
        #[arg(short, long)]
        seed: Option<u64>,

        /// Print the evaluation trace
        #[arg(short, long)]
        trace: bool,
    },

    /// Compile a formula and report any errors
    Check {
        /// Formula source (omit when using --file)
        formula: Option<String>,

        /// Read the formula from a file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// List the built-in functions
    Functions,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Eval {
            formula,
            file,
            vars,
            seed,
            trace,
        } => cmd_eval(formula, file, &vars, seed, trace),
        Commands::Check { formula, file } => cmd_check(formula, file),
        Commands::Functions => cmd_functions(),
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve the formula text and the options to compile it with
fn load_source(
    formula: Option<String>,
    file: Option<PathBuf>,
) -> Result<(String, FormulaOptions)> {
    match (formula, file) {
        (Some(source), None) => Ok((source, FormulaOptions::default())),
        (None, Some(path)) => {
            let source = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read formula file: {}", path.display()))?;
            Ok((source, FormulaOptions::for_file(path.display().to_string())))
        }
        (Some(_), Some(_)) => bail!("Give either a formula or --file, not both"),
        (None, None) => bail!("No formula given"),
    }
}

fn compile(source: &str, options: FormulaOptions) -> Result<Formula> {
    Formula::with_options(source, options, None).map_err(|e| anyhow::anyhow!(e.message()))
}

fn cmd_eval(
    formula: Option<String>,
    file: Option<PathBuf>,
    vars: &[String],
    seed: Option<u64>,
    trace: bool,
) -> Result<()> {
    let (source, options) = load_source(formula, file)?;
    let formula = compile(&source, options)?;

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut ctx = MapCallable::new();
    for var in vars {
        let (name, value_source) = var
            .split_once('=')
            .with_context(|| format!("Expected NAME=FORMULA, got '{}'", var))?;
        let value = compile(value_source, FormulaOptions::for_file(format!("--var {}", name)))?
            .execute(&ctx, &mut rng, None)
            .with_context(|| format!("Failed to evaluate variable '{}'", name))?;
        tracing::debug!(name, value = %value.to_debug_string(), "bound variable");
        ctx.add(name.trim(), value);
    }

    let mut debugger = FormulaDebugger::new();
    let result = formula.execute(&ctx, &mut rng, trace.then_some(&mut debugger));

    if trace {
        print!("{}", debugger);
    }
    let value = result.with_context(|| format!("Failed to evaluate: {}", source.trim()))?;
    println!("{}", value.to_debug_string());

    Ok(())
}

fn cmd_check(formula: Option<String>, file: Option<PathBuf>) -> Result<()> {
    let (source, options) = load_source(formula, file)?;
    let formula = compile(&source, options)?;

    println!("ok: {}", formula.expression());
    let defined = formula.symbols().borrow().function_names();
    if !defined.is_empty() {
        println!("defines: {}", defined.join(", "));
    }

    Ok(())
}

fn cmd_functions() -> Result<()> {
    let registry = builtins();
    let mut names: Vec<&str> = registry.names().collect();
    names.sort_unstable();

    for name in names {
        if let Some(def) = registry.get(name) {
            println!("{:<16} {}", name, def.arity());
        }
    }

    Ok(())
}
