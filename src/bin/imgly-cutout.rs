//! Subject cutout CLI tool
//!
//! Thin wrapper over the library's CLI module.

#[cfg(feature = "cli")]
use imgly_cutout::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please build with --features cli");
    std::process::exit(1);
}
