//! Tether helper binary.
//!
//! # Usage
//!
//! ```bash
//! # Normally launched by the host with injected arguments
//! tether-helper -port=8573 -token=BASE64KEY -pid=4242
//!
//! # Hand-launched for poking at the wire protocol
//! tether-helper --port=8573 --token=BASE64KEY
//! ```
//!
//! Stdout carries exactly one thing: the PEM public key block the host
//! adopts. Logs go to stderr, filtered by `RUST_LOG` (default `info`).

use tether_helper::{USAGE, parse_args, run};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[allow(clippy::print_stderr)]
fn print_usage(problem: &dyn std::fmt::Display) {
    eprintln!("{problem}");
    eprintln!("{USAGE}");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = match parse_args(&raw) {
        Ok(args) => args,
        Err(problem) => {
            print_usage(&problem);
            std::process::exit(2);
        }
    };

    tracing::info!(port = args.port, watching_pid = ?args.pid, "helper starting");
    run(args).await?;
    Ok(())
}
