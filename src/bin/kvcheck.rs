//! Conformance runner: drives the canonical scenario against a live
//! server and reports per-step results.
//!
//! The target address comes from the first process argument, then the
//! `KVCHECK_ADDR` environment variable, then `localhost:6379`. Exits 0
//! only when every step passed; 2 when the server is unreachable.

use kvcheck::harness::{canonical_scenario, Harness};
use kvcheck::{client, DEFAULT_HOST, DEFAULT_PORT};

use std::env;
use std::process;
use tracing::info;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::try_init().ok();

    let addr = env::args()
        .nth(1)
        .or_else(|| env::var("KVCHECK_ADDR").ok())
        .unwrap_or_else(|| format!("{}:{}", DEFAULT_HOST, DEFAULT_PORT));

    info!(%addr, "starting conformance run");

    let client = match client::connect(addr.as_str()).await {
        Ok(client) => client,
        Err(err) => {
            eprintln!("cannot reach {}: {}", addr, err);
            process::exit(2);
        }
    };

    let report = Harness::new(client).run(canonical_scenario()).await;

    print!("{}", report);

    process::exit(if report.all_passed() { 0 } else { 1 });
}
