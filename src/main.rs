use agent_chain::config::NodeConfig;
use agent_chain::utils::NodeKeyPair;
use agent_chain::{node, Command, Opt};
use clap::Parser;
use log::{error, LevelFilter};
use std::fs;
use std::process;

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let opt = Opt::parse();

    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Start {
            config,
            bootstrap,
            discovery,
        } => {
            let mut node_config = NodeConfig::load(config.as_deref())?;
            // Command line flags override the file
            node_config.is_bootstrap = bootstrap || node_config.is_bootstrap;
            node_config.enable_discovery = discovery;

            node::run(node_config)?;
        }
        Command::Keygen { out } => {
            let key_pair = NodeKeyPair::generate()?;
            println!("Address: {}", key_pair.address());
            match out {
                Some(path) => {
                    fs::write(&path, key_pair.to_hex())?;
                    println!("Key written to {}", path.display());
                }
                None => println!("Private key: {}", key_pair.to_hex()),
            }
        }
    }
    Ok(())
}
