use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use http::Method;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tollgate::config::TollgateConfig;
use tollgate::ratelimit::{RejectionReason, RequestInfo};

/// Dry-run admission decisions for a synthetic request.
#[derive(Debug, Parser)]
#[command(name = "tollgate", version, about)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Peer address of the request, e.g. 10.0.0.1:4000
    #[arg(long, default_value = "127.0.0.1:0")]
    peer: String,

    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    #[arg(long, default_value = "/")]
    path: String,

    /// Request header as NAME:VALUE, may be repeated
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Basic credentials as USER:PASS
    #[arg(long)]
    basic_auth: Option<String>,

    /// How many times to send the request
    #[arg(short = 'n', long, default_value_t = 1)]
    repeat: u32,

    /// Print decisions as JSON lines
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct Decision {
    attempt: u32,
    admitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    rejection: Option<RejectionReason>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => TollgateConfig::from_file(path)?,
        None => TollgateConfig::default(),
    };
    let tollgate = config.build()?;

    let request = build_request(&args)?;

    for attempt in 1..=args.repeat {
        let rejection = tollgate.controller.admit(&tollgate.limiter, &request).await?;
        let decision = Decision {
            attempt,
            admitted: rejection.is_none(),
            rejection,
        };

        if args.json {
            println!("{}", serde_json::to_string(&decision)?);
        } else {
            match &decision.rejection {
                None => println!("#{attempt}: admitted"),
                Some(r) => println!("#{attempt}: rejected {} {}", r.status_code, r.message),
            }
        }
    }

    Ok(())
}

fn build_request(args: &Args) -> anyhow::Result<RequestInfo> {
    let method = Method::from_bytes(args.method.to_uppercase().as_bytes())
        .with_context(|| format!("invalid method {}", args.method))?;

    let mut request = RequestInfo::new(method, args.path.clone()).with_remote_addr(&args.peer);

    for header in &args.headers {
        let Some((name, value)) = header.split_once(':') else {
            bail!("header must be NAME:VALUE, got {header}");
        };
        request = request.with_header(name.trim(), value.trim());
    }

    if let Some(creds) = &args.basic_auth {
        let Some((user, pass)) = creds.split_once(':') else {
            bail!("basic auth must be USER:PASS");
        };
        request = request.with_basic_auth(user, pass);
    }

    Ok(request)
}
