//! Command-line interface definitions for the `volclone` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `volclone` binary.
#[derive(Debug, Parser)]
#[command(
    name = "volclone",
    about = "Clone an encrypted block volume to an unencrypted replacement",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Clone a volume and swap it onto its instance.
    #[command(
        name = "clone",
        about = "Clone a volume and swap it onto its instance"
    )]
    Clone(CloneCommand),
}

/// Arguments for the `volclone clone` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct CloneCommand {
    /// Instance the source volume is attached to.
    #[arg(long, value_name = "INSTANCE_ID")]
    pub(crate) instance_id: String,
    /// Volume to clone. Must be attached to the given instance.
    #[arg(long, value_name = "VOLUME_ID")]
    pub(crate) volume_id: String,
    /// Size of the clone in GiB. Defaults to the source volume's size.
    ///
    /// Cold and throughput-optimised storage classes enforce a provider
    /// minimum, so the effective size may be larger than requested.
    #[arg(long, value_name = "GIB")]
    pub(crate) new_size: Option<u32>,
    /// Take a safety snapshot of the source volume before any destructive
    /// step.
    #[arg(long)]
    pub(crate) backup: bool,
}
