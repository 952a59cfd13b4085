use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "agent-chain")]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "start", about = "Start a chain node")]
    Start {
        #[arg(long = "config", help = "Path to the YAML node configuration")]
        config: Option<PathBuf>,
        #[arg(
            long = "bootstrap",
            help = "Advertise this node as a bootstrap node for discovery"
        )]
        bootstrap: bool,
        #[arg(
            long = "discovery",
            default_value_t = true,
            help = "Enable automatic peer discovery",
            action = clap::ArgAction::Set
        )]
        discovery: bool,
    },
    #[command(
        name = "keygen",
        about = "Generate a node key pair and print the derived address"
    )]
    Keygen {
        #[arg(long = "out", help = "Write the hex-encoded key to this file")]
        out: Option<PathBuf>,
    },
}
