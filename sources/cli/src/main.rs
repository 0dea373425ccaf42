use std::{fs, path::Path, process::exit};

use anyhow::{anyhow, Context, Result};
use args::{Cli, Command};
use clap::Parser;
use classfile::{ClassFile, StructuralEq};
use enhancer::{EnhancementPlan, FieldAccessors};
use tracing::{debug, error, info, Level};
use tracing_subscriber::fmt;

mod args;

fn read_class(path: &Path) -> Result<(Vec<u8>, ClassFile)> {
    let bytes = fs::read(path).with_context(|| format!("could not read {}", path.display()))?;
    let class = ClassFile::read(&bytes).with_context(|| format!("could not parse {}", path.display()))?;
    Ok((bytes, class))
}

fn verify(path: &Path) -> Result<()> {
    let (bytes, class) = read_class(path)?;
    let written = class.write();

    if let Some(offset) = bytes.iter().zip(&written).position(|(a, b)| a != b) {
        return Err(anyhow!("rewritten bytes differ from the input at offset {offset}"));
    }
    if bytes.len() != written.len() {
        return Err(anyhow!(
            "rewritten class is {} bytes, input is {}",
            written.len(),
            bytes.len()
        ));
    }

    let reread = ClassFile::read(&written)?;
    class
        .structural_diff(&reread)
        .map_err(|mismatch| anyhow!("reread class differs: {mismatch}"))?;

    debug!("{} has {} constant pool slots", path.display(), class.constant_pool.len());
    Ok(())
}

fn run(args: Cli) -> Result<()> {
    match args.command {
        Command::Print { class } => {
            let (_, class) = read_class(&class)?;
            print!("{}", class.dump());
        }
        Command::Verify { classes } => {
            let mut failures = 0;
            for path in &classes {
                match verify(path) {
                    Ok(()) => println!("ok {}", path.display()),
                    Err(e) => {
                        println!("FAILED {}: {:#}", path.display(), e);
                        failures += 1;
                    }
                }
            }

            if failures > 0 {
                return Err(anyhow!("{failures} of {} classes failed verification", classes.len()));
            }
        }
        Command::Enhance {
            class,
            output,
            interfaces,
            fields,
            managed,
        } => {
            let bytes = fs::read(&class).with_context(|| format!("could not read {}", class.display()))?;

            let plan = EnhancementPlan {
                interfaces,
                added_fields: fields,
                managed_fields: vec![],
                inherited_fields: vec![],
            };
            let plan = managed
                .iter()
                .fold(plan, |plan, field| plan.managing(field, FieldAccessors::conventional(field)));

            let enhanced = enhancer::enhance(&bytes, &plan)
                .with_context(|| format!("could not enhance {}", class.display()))?;

            fs::write(&output, &enhanced).with_context(|| format!("could not write {}", output.display()))?;
            info!("wrote {} bytes to {}", enhanced.len(), output.display());
        }
    }

    Ok(())
}

fn main() {
    let args = Cli::parse();

    let mut format = fmt::format()
        .with_ansi(true)
        .without_time()
        .with_level(true)
        .with_target(false)
        .with_thread_names(false)
        .with_source_location(true)
        .compact();

    if args.plain {
        format = format.with_ansi(false).with_source_location(false);
    }

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .event_format(format)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args) {
        error!("{:#}", e);
        exit(1);
    }
}
