use std::path::PathBuf;

use clap::{Parser, Subcommand};
use classfile::flags::FieldAccessFlags;
use enhancer::AddedField;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(long, short, global = true)]
    /// Emit debug logs as well as the usual progress messages
    pub verbose: bool,

    #[arg(long, global = true)]
    /// Emit logs without colours or source locations, which is friendlier to machines
    pub plain: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print a human readable listing of a class file
    Print { class: PathBuf },

    /// Check that each class file parses, and that writing it back reproduces it exactly
    Verify {
        #[arg(required = true)]
        classes: Vec<PathBuf>,
    },

    /// Enhance a class file and write the result
    Enhance {
        class: PathBuf,

        #[arg(long, short)]
        /// Where to write the enhanced class
        output: PathBuf,

        #[arg(long("interface"))]
        /// Interfaces to implement, as internal names (a/b/C)
        interfaces: Vec<String>,

        #[arg(long("add-field"), value_parser = parse_added_field)]
        /// Private fields to add, as name:descriptor
        fields: Vec<AddedField>,

        #[arg(long("manage"))]
        /// Fields to route through generated `name$get` / `name$set` accessors
        managed: Vec<String>,
    },
}

fn parse_added_field(value: &str) -> Result<AddedField, String> {
    let (name, descriptor) = value
        .split_once(':')
        .ok_or_else(|| format!("expected name:descriptor, got '{value}'"))?;

    if name.is_empty() || descriptor.is_empty() {
        return Err(format!("expected name:descriptor, got '{value}'"));
    }

    Ok(AddedField {
        name: name.to_string(),
        descriptor: descriptor.to_string(),
        flags: FieldAccessFlags::PRIVATE,
    })
}
