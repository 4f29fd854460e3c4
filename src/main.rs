//! dynmod CLI: inspect and run saved module artifacts.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use dynmod::artifact::{LoadedModule, invoke_saved};
use dynmod::routine::Routine;
use dynmod::value::Value;

#[derive(Parser)]
#[command(name = "dynmod", version, about = "Inspect and run saved dynamic modules")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the routines in an artifact.
    Inspect {
        /// Path to a `.dmod` artifact.
        artifact: PathBuf,

        /// Print the listing as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the instructions of one routine.
    Disasm {
        /// Path to a `.dmod` artifact.
        artifact: PathBuf,
        /// Routine name.
        routine: String,
    },

    /// Run a routine and print what it writes.
    Invoke {
        /// Path to a `.dmod` artifact.
        artifact: PathBuf,
        /// Routine name.
        routine: String,

        /// Arguments as a JSON array, e.g. '[{"x": 1, "y": 2}]'.
        #[arg(long, default_value = "[]")]
        args: String,
    },
}

#[derive(Serialize)]
struct RoutineListing {
    name: String,
    signature: String,
    instructions: usize,
    calls: Vec<String>,
}

#[derive(Serialize)]
struct ModuleListing {
    module: String,
    path: String,
    routines: Vec<RoutineListing>,
}

fn listing(routine: &Routine) -> RoutineListing {
    let mut calls: Vec<String> = routine
        .body
        .iter()
        .filter_map(|i| i.call_target().map(str::to_string))
        .collect();
    calls.sort();
    calls.dedup();
    RoutineListing {
        name: routine.name.clone(),
        signature: routine.signature.to_string(),
        instructions: routine.body.len(),
        calls,
    }
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect { artifact, json } => {
            let module = LoadedModule::load(&artifact)?;
            let listing = ModuleListing {
                module: module.name().to_string(),
                path: module.path().display().to_string(),
                routines: module.routines().iter().map(|r| listing(r)).collect(),
            };

            if json {
                let text = serde_json::to_string_pretty(&listing).into_diagnostic()?;
                println!("{text}");
            } else {
                println!("Module: {} ({})", listing.module, listing.path);
                if listing.routines.is_empty() {
                    println!("  no routines");
                }
                for r in &listing.routines {
                    print!("  {}{} [{} instructions]", r.name, r.signature, r.instructions);
                    if !r.calls.is_empty() {
                        print!(" calls {}", r.calls.join(", "));
                    }
                    println!();
                }
            }
        }

        Commands::Disasm { artifact, routine } => {
            let module = LoadedModule::load(&artifact)?;
            let Some(found) = module.routine(&routine) else {
                miette::bail!("routine \"{routine}\" not found in {}", artifact.display());
            };
            println!("{}{}:", found.name, found.signature);
            for (at, instr) in found.body.iter().enumerate() {
                println!("  {at:>4}: {instr}");
            }
        }

        Commands::Invoke {
            artifact,
            routine,
            args,
        } => {
            let parsed: Vec<serde_json::Value> = serde_json::from_str(&args).into_diagnostic()?;
            let args: Vec<Value> = parsed.into_iter().map(Value::from).collect();

            let out = invoke_saved(&artifact, &routine, &args)?;
            println!("{}", String::from_utf8_lossy(&out));
        }
    }

    Ok(())
}
