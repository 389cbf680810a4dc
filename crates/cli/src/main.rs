//! stackql-provider CLI
//!
//! Loads a service document and reports what was parsed.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use stackql_provider_parser::{Loader, Service};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stackql-provider")]
#[command(version, about = "Load SQL-augmented OpenAPI provider documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a service document and print its name
    #[command(after_help = "EXAMPLES:\n  \
        stackql-provider read okta/v1/services/Application.yaml\n\n  \
        # List resources and their methods\n  \
        stackql-provider read --verbose googleapis.com/v1/services/compute-v1.yaml")]
    Read {
        /// Path to the service document (YAML or JSON)
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Read { path } => read_command(&path, cli.verbose),
    }
}

fn read_command(path: &Path, verbose: bool) -> Result<()> {
    let service = Loader::new()
        .load_service_from_file(path)
        .with_context(|| format!("Failed to load service document {}", path.display()))?;
    debug!(path = %path.display(), resources = service.resource_names().len(), "loaded service");

    println!("successfully parsed svc = '{}'", service.name);

    if verbose {
        print_service(&service);
    }
    Ok(())
}

fn print_service(service: &Service) {
    println!("\n{}", "Service:".bold());
    println!("  Title: {}", service.title.yellow());
    println!("  Version: {}", service.version.yellow());
    if let Some(server) = service.servers().first() {
        println!("  Server: {}", server.url);
    }

    println!("\n{}", "Resources:".bold());
    for (name, resource) in service.resources() {
        println!("  • {} ({})", name.cyan(), resource.id);
        for method in resource.ordered_methods() {
            println!(
                "    {} {} {} {}",
                method.sql_verb.to_string().green(),
                method.key,
                method.api_method,
                method.path
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_read_arguments() {
        let cli = Cli::try_parse_from(["stackql-provider", "read", "svc.yaml", "-v"]).unwrap();
        assert!(cli.verbose);
        let Commands::Read { path } = cli.command;
        assert_eq!(path, PathBuf::from("svc.yaml"));

        assert!(Cli::try_parse_from(["stackql-provider", "read"]).is_err());
    }

    #[test]
    fn test_read_missing_file_fails() {
        let err = read_command(Path::new("does/not/exist.yaml"), false).unwrap_err();
        assert!(err.to_string().contains("does/not/exist.yaml"));
    }
}
