//! payagent CLI: inspect agent URLs and configuration, and run Payment Agent
//! flows end-to-end inside a simulated browser.

mod cli;
mod simulate;

use clap::Parser;
use cli::{Cli, Commands, SimulateCommands, UrlOperation};
use payagent_kernel::config::{load_config, to_toml};
use payagent_kernel::{AgentOptions, PaymentAgent};
use payagent_types::config::AgentConfig;
use payagent_types::PaymentResult;
use payagent_wire::SimulatedBrowser;
use std::path::PathBuf;
use std::sync::Arc;

fn init_tracing_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing_stderr();

    match cli.command {
        Commands::Url {
            operation,
            agent_url,
            origin,
        } => cmd_url(cli.config, operation, agent_url, &origin),
        Commands::Config => cmd_config(cli.config),
        Commands::Simulate(SimulateCommands::Register { name, json }) => {
            let config = load_config(cli.config.as_deref());
            let report = block_on(simulate::register(config, &name));
            print_report(report, json);
        }
        Commands::Simulate(SimulateCommands::Pay {
            label,
            amount,
            json,
        }) => {
            let config = load_config(cli.config.as_deref());
            let report = block_on(simulate::pay(config, &label, &amount));
            print_report(report, json);
        }
    }
}

/// Run a simulation on a single-threaded runtime.
///
/// Every actor of a simulation shares this one thread, so an actor never
/// observes a surface between its opening and its listener registration.
fn block_on<T>(future: impl std::future::Future<Output = PaymentResult<T>>) -> T {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => fail(&format!("Failed to create Tokio runtime: {e}")),
    };
    match rt.block_on(future) {
        Ok(value) => value,
        Err(e) => fail(&e.to_string()),
    }
}

fn fail(message: &str) -> ! {
    eprintln!("error: {message}");
    std::process::exit(1);
}

fn cmd_url(
    config_path: Option<PathBuf>,
    operation: UrlOperation,
    agent_url: Option<String>,
    origin: &str,
) {
    let config = load_config(config_path.as_deref());
    let url = match agent_url_for(config, operation, agent_url, origin) {
        Ok(url) => url,
        Err(e) => fail(&e.to_string()),
    };
    println!("{url}");
}

fn agent_url_for(
    config: AgentConfig,
    operation: UrlOperation,
    agent_url: Option<String>,
    origin: &str,
) -> PaymentResult<String> {
    let browser = SimulatedBrowser::new();
    let agent = PaymentAgent::new(Arc::new(browser.open_tab(origin)?), config);
    let options = AgentOptions { agent_url };
    match operation {
        UrlOperation::Register => agent.register_url(&options),
        UrlOperation::Request => agent.request_url(&options),
        UrlOperation::Acknowledge => agent.acknowledge_url(&options),
        UrlOperation::Pending => agent.pending_request_url(&options),
    }
}

fn cmd_config(config_path: Option<PathBuf>) {
    let config = load_config(config_path.as_deref());
    match to_toml(&config) {
        Ok(rendered) => print!("{rendered}"),
        Err(e) => fail(&format!("Failed to render config: {e}")),
    }
}

fn print_report(report: simulate::Report, json: bool) {
    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => fail(&format!("Failed to render report: {e}")),
        }
        return;
    }

    println!("{} settled with:", report.operation);
    match serde_json::to_string_pretty(&report.result) {
        Ok(rendered) => println!("{rendered}"),
        Err(_) => println!("{}", report.result),
    }
    println!();
    println!("Browser activity:");
    for (i, event) in report.history.iter().enumerate() {
        println!("  {:>3}  {}", i + 1, simulate::describe(event));
    }
}
