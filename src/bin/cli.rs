//! hostlink CLI Client
//!
//! Command-line interface for sending commands to a hostlink server.

use std::time::Duration;

use clap::{Parser, Subcommand};
use hostlink::{Client, ClientConfig, Params, Response};
use serde_json::Value;

/// hostlink CLI
#[derive(Parser, Debug)]
#[command(name = "hostlink-cli")]
#[command(about = "Send a command to a hostlink server")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = hostlink::config::DEFAULT_ADDR)]
    server: String,

    /// Override the timeout in milliseconds (default depends on the command)
    #[arg(short, long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send an arbitrary command
    Send {
        /// The command type
        command_type: String,

        /// Parameters as a JSON object
        #[arg(default_value = "{}")]
        params: String,
    },

    /// Print the scene summary
    Scene,

    /// Ping the server
    Ping,
}

fn main() {
    let args = Args::parse();

    let client = Client::new(ClientConfig::builder().server_addr(&args.server).build());

    let (command_type, params) = match args.command {
        Commands::Send {
            command_type,
            params,
        } => match parse_params(&params) {
            Ok(params) => (command_type, params),
            Err(e) => {
                eprintln!("Invalid params: {e}");
                std::process::exit(2);
            }
        },
        Commands::Scene => ("get_scene_info".to_string(), Params::new()),
        Commands::Ping => ("ping".to_string(), Params::new()),
    };

    let response = match args.timeout_ms {
        Some(ms) => client.send(&command_type, params, Duration::from_millis(ms)),
        None => client.send_command(&command_type, params),
    };

    match serde_json::to_string_pretty(&response) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("Failed to print response: {e}"),
    }

    if let Response::Error { .. } = response {
        std::process::exit(1);
    }
}

fn parse_params(text: &str) -> Result<Params, String> {
    match serde_json::from_str::<Value>(text).map_err(|e| e.to_string())? {
        Value::Object(params) => Ok(params),
        other => Err(format!("expected a JSON object, got {other}")),
    }
}
