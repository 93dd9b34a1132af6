//! Clap CLI definitions for payagent.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub const AFTER_HELP: &str = "\
\x1b[1;36mExamples:\x1b[0m
  payagent url register                  Agent URL a registerApp call opens
  payagent url acknowledge --origin https://wallet.example
  payagent config                        Show the effective configuration
  payagent simulate register --name Acme Run registerApp in a simulated browser
  payagent simulate pay --amount 9.99    Run the full multi-hop pay flow";

/// payagent: Payment Agent messaging layer tools.
#[derive(Parser)]
#[command(
    name = "payagent",
    version,
    about = "Payment Agent messaging layer tools",
    after_help = AFTER_HELP,
)]
pub struct Cli {
    /// Path to config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the agent URL an operation would open.
    Url {
        /// Which operation.
        #[arg(value_enum)]
        operation: UrlOperation,
        /// Agent URL overriding the configured default.
        #[arg(long)]
        agent_url: Option<String>,
        /// Origin of the calling page.
        #[arg(long, default_value = "https://shop.example")]
        origin: String,
    },
    /// Print the effective configuration as TOML.
    Config,
    /// Run a flow end-to-end in a simulated browser.
    #[command(subcommand)]
    Simulate(SimulateCommands),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum UrlOperation {
    Register,
    Request,
    Acknowledge,
    Pending,
}

#[derive(Subcommand)]
pub enum SimulateCommands {
    /// Register a payment app with a scripted agent.
    Register {
        /// Name placed in the app manifest.
        #[arg(long, default_value = "Acme")]
        name: String,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Pay through a scripted mediator and payment app.
    Pay {
        /// Line item label.
        #[arg(long, default_value = "Book")]
        label: String,
        /// Line item amount.
        #[arg(long, default_value = "9.99")]
        amount: String,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simulate_pay() {
        let cli = Cli::try_parse_from(["payagent", "simulate", "pay", "--amount", "12.00"]).unwrap();
        match cli.command {
            Commands::Simulate(SimulateCommands::Pay { label, amount, json }) => {
                assert_eq!(label, "Book");
                assert_eq!(amount, "12.00");
                assert!(!json);
            }
            _ => panic!("Expected simulate pay"),
        }
    }

    #[test]
    fn test_parse_url_with_global_config() {
        let cli = Cli::try_parse_from([
            "payagent",
            "url",
            "pending",
            "--config",
            "/tmp/payagent.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/payagent.toml")));
        assert!(matches!(
            cli.command,
            Commands::Url {
                operation: UrlOperation::Pending,
                ..
            }
        ));
    }
}
