//! CLI argument definitions for udump

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "udump")]
#[command(about = "Reflection-layout dumper and symbol database tool", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a generation against a memory dump and save a project file
    #[command(visible_alias = "g")]
    Generate {
        /// Path to the raw memory dump
        dump: PathBuf,

        /// Base virtual address the dump was captured at (hex accepted)
        #[arg(long, value_parser = parse_address)]
        base: usize,

        /// Target configuration JSON
        #[arg(short, long)]
        config: PathBuf,

        /// Output project file
        #[arg(short, long, default_value = "project.udump")]
        output: PathBuf,
    },

    /// Show package and entity statistics of a project file
    #[command(visible_alias = "i")]
    Info {
        /// Path to a project file
        project: PathBuf,
    },

    /// Print one struct's cooked layout
    #[command(visible_alias = "l")]
    Layout {
        /// Path to a project file
        project: PathBuf,

        /// Short name of the struct or class
        name: String,
    },

    /// Dump the decoded name cache
    Names {
        /// Path to a project file
        project: PathBuf,

        /// Only print names containing this substring
        #[arg(short, long)]
        filter: Option<String>,
    },
}

/// Accept both decimal and 0x-prefixed hexadecimal addresses
pub fn parse_address(s: &str) -> Result<usize, std::num::ParseIntError> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        usize::from_str_radix(hex, 16)
    } else {
        s.parse()
    }
}
