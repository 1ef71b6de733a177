//! CLI argument parsing for the rawbuf diagnostic tool

use crate::crc::Kernel;
use crate::mempool::PoolIndex;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// rawbuf - inspect CPU capabilities, checksum files and dump pool accounting
#[derive(Parser, Debug)]
#[command(name = "rawbuf")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output logs as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show detected CPU features and the selected crc32c kernel
    Probe,

    /// Compute the CRC-32C of files through file-mapped raw blocks
    Crc(CrcArgs),

    /// Map files into a pool and print the mempool accounting dump
    Dump(DumpArgs),

    /// Show configuration
    Config(ConfigArgs),
}

/// Arguments for the crc command
#[derive(Parser, Debug)]
pub struct CrcArgs {
    /// Files to checksum
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Force a kernel (portable, sse42, pclmul, aarch64)
    #[arg(short, long)]
    pub kernel: Option<Kernel>,

    /// Print the raw register (seed 0, no inversion) instead of standard CRC-32C
    #[arg(long)]
    pub raw: bool,
}

/// Arguments for the dump command
#[derive(Parser, Debug)]
pub struct DumpArgs {
    /// Files to map before dumping
    pub files: Vec<PathBuf>,

    /// Pool the mapped files are charged to
    #[arg(short, long, default_value = "buffer_anon")]
    pub pool: PoolIndex,

    /// Enable per-type tracking before dumping
    #[arg(long)]
    pub debug_mode: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Write a default configuration file to this path
    #[arg(long)]
    pub init: Option<PathBuf>,
}
