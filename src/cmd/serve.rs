/*!
serve.rs

`ai serve [PORT] [--host H] [--token T] [--no-auth]`: run the HTTP front door
over the configured alias table and provider registry.

Token precedence: `--token`, then `AI_DISPATCH_SERVER_TOKEN`, else a random
token printed to stderr.
*/

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Args;

use crate::cmd::format::{Role, StyleOptions, color};
use crate::config::{ConfigRecord, Settings};
use crate::dispatch::DispatchEngine;
use crate::provider::ProviderRegistry;
use crate::server::{self, AppState, DEFAULT_HOST, DEFAULT_PORT};

pub const TOKEN_ENV: &str = "AI_DISPATCH_SERVER_TOKEN";

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(value_parser = clap::value_parser!(u16).range(1..), default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to bind
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Bearer token clients must send [env: AI_DISPATCH_SERVER_TOKEN]
    #[arg(long)]
    pub token: Option<String>,

    /// Disable authentication (any local process can call the server)
    #[arg(long)]
    pub no_auth: bool,
}

/// Token the server will require, if any. `env_token` is the value of `TOKEN_ENV`.
pub fn effective_token(args: &ServeArgs, env_token: Option<String>) -> Option<String> {
    if args.no_auth {
        return None;
    }
    Some(
        args.token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| env_token.filter(|t| !t.is_empty()))
            .unwrap_or_else(server::generate_token),
    )
}

pub fn execute_serve(mut settings: Settings, args: ServeArgs) -> Result<()> {
    let style = StyleOptions::detect();
    let record = ConfigRecord::load(&settings.config_path())?;
    settings.apply(&record);
    let table = record.alias_table()?;
    let registry = ProviderRegistry::builtin(&settings)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", args.host, args.port))?;

    let token = effective_token(&args, std::env::var(TOKEN_ENV).ok());
    println!("ai server starting on http://{addr}");
    println!("Endpoints:");
    println!("  GET  /health    - Health check (no auth)");
    println!("  GET  /models    - List available models");
    println!("  GET  /providers - List providers");
    println!("  POST /call      - Execute prompt");
    match &token {
        Some(t) => {
            eprintln!("\nAuth token: {t}");
            eprintln!("Use: Authorization: Bearer <token>");
        }
        None => eprintln!(
            "{}",
            color(
                Role::Warning,
                "WARNING: Authentication disabled. Any local process can call this server.",
                &style
            )
        ),
    }
    println!("\nPress Ctrl+C to stop");

    let state = AppState::new(DispatchEngine::new(registry, table), token);
    let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    rt.block_on(server::run(state, addr))
        .with_context(|| format!("Server on {addr} failed"))
}
