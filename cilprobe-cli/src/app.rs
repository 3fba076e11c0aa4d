use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// cilprobe - CIL method body inspection and coverage instrumentation
#[derive(Debug, Parser)]
#[command(name = "cilprobe", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared across all subcommands.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit output as JSON instead of human-readable text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Decode a raw method body and print its IL listing and exception regions.
    Dump {
        /// Raw method body (tiny or fat header, code, data sections).
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },

    /// Insert coverage probes into a raw method body.
    Instrument {
        /// Raw method body (tiny or fat header, code, data sections).
        #[arg(value_name = "FILE")]
        path: PathBuf,

        /// Points file with `seq <offset> <id>` and `branch <offset> <path> <id>` lines.
        #[arg(short, long, value_name = "FILE")]
        points: PathBuf,

        /// Token of the managed visit method (hex like 0x0A000001 or decimal).
        #[arg(short, long, value_name = "TOKEN", conflicts_with = "function")]
        token: Option<String>,

        /// Address of a native visit callback, called through `calli`.
        #[arg(long, value_name = "ADDRESS", requires = "signature")]
        function: Option<String>,

        /// StandAloneSig token of the native callback signature.
        #[arg(long, value_name = "TOKEN", requires = "function")]
        signature: Option<String>,

        /// Push the native callback address as a 32-bit value.
        #[arg(long, requires = "function")]
        pointer32: bool,

        /// Where to write the rewritten body.
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Skip statement probes.
        #[arg(long)]
        no_sequence: bool,

        /// Skip branch probes.
        #[arg(long)]
        no_branches: bool,

        /// Instrument even if the first statement probe is already present.
        #[arg(long)]
        force: bool,

        /// Extra evaluation stack slots reserved for the probes.
        #[arg(long, default_value_t = 2)]
        extra_max_stack: u16,
    },
}
