//! See https://github.com/matklad/cargo-xtask
//! Developer tasks for the vmdisk workspace.

use std::process::Command;

use color_eyre::eyre::{eyre, Context, Report};
use color_eyre::Result;
use xshell::{cmd, Shell};

#[allow(clippy::type_complexity)]
const TASKS: &[(&str, fn(&Shell) -> Result<()>)] = &[
    ("build", build),
    ("test-integration", test_integration),
    ("cleanup", cleanup),
];

const RELEASE_BINARY: &str = "target/release/vmdisk";

fn install_tracing() {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let fmt_layer = fmt::layer().with_target(false);
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .init();
}

fn main() -> Result<(), Report> {
    install_tracing();
    color_eyre::install()?;
    // Ensure our working directory is the toplevel
    {
        let toplevel_path = Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .output()
            .context("Invoking git rev-parse")?;
        if !toplevel_path.status.success() {
            return Err(eyre!("Failed to invoke git rev-parse"));
        }
        let path = String::from_utf8(toplevel_path.stdout)?;
        std::env::set_current_dir(path.trim()).context("Changing to toplevel")?;
    }

    let task = std::env::args().nth(1);

    let sh = xshell::Shell::new()?;
    if let Some(cmd) = task.as_deref() {
        let f = TASKS
            .iter()
            .find_map(|(k, f)| (*k == cmd).then_some(*f))
            .unwrap_or(print_help);
        f(&sh)?;
    } else {
        print_help(&sh)?;
    }
    Ok(())
}

fn build(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo build -p vmdisk --release").run()?;
    cfg_if::cfg_if! {
        if #[cfg(target_os = "linux")] {
            // Nothing, virsh is all we need at runtime
        } else {
            compile_error!("Unsupported OS - only Linux is supported")
        }
    }
    Ok(())
}

/// Build the release binary and run the integration tests against it.
///
/// Set VMDISK_TEST_POOL to a libvirt storage pool to include the tests
/// that create volumes.
fn test_integration(sh: &Shell) -> Result<()> {
    build(sh)?;
    let pool = std::env::var("VMDISK_TEST_POOL").ok();
    match pool.as_deref() {
        Some(pool) => tracing::info!("Running integration tests against pool {pool}"),
        None => tracing::info!("VMDISK_TEST_POOL unset; skipping libvirt tests"),
    }
    let _env = sh.push_env("VMDISK_PATH", RELEASE_BINARY);
    cmd!(sh, "cargo test -p integration-tests").run()?;
    Ok(())
}

/// Remove volumes left behind by interrupted integration test runs
fn cleanup(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo run -p integration-tests --bin test-cleanup").run()?;
    Ok(())
}

fn print_help(_sh: &Shell) -> Result<()> {
    println!("Tasks:");
    for (name, _) in TASKS {
        println!("  - {name}");
    }
    Ok(())
}
