use std::path::Path;
use std::process::Command;

use color_eyre::eyre::eyre;
use color_eyre::Result;
use libtest_mimic::{Arguments, Trial};

/// Prefix of every volume created by the integration tests
pub(crate) const TEST_VOLUME_PREFIX: &str = "vmdisk-it-";

mod tests {
    pub mod cli;
    pub mod pool_lifecycle;
}

/// Get the path to the vmdisk binary, checking VMDISK_PATH env var first, then falling back to "vmdisk"
pub(crate) fn get_vmdisk_command() -> Result<String> {
    if let Ok(path) = std::env::var("VMDISK_PATH") {
        return Ok(path);
    }
    // Force the user to set this if we're running from the project dir
    if let Some(path) = ["target/debug/vmdisk", "target/release/vmdisk"]
        .into_iter()
        .find(|p| Path::new(p).exists())
    {
        return Err(eyre!(
            "Detected {path} - set VMDISK_PATH={path} to run using this binary"
        ));
    }
    Ok("vmdisk".to_owned())
}

/// Storage pool for tests that need libvirt, if one is configured and virsh works
pub(crate) fn test_pool() -> Option<String> {
    let pool = std::env::var("VMDISK_TEST_POOL").ok()?;
    let usable = Command::new("virsh")
        .args(["pool-info", &pool])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    usable.then_some(pool)
}

/// A unique volume name for one test
pub(crate) fn test_volume_name(what: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{TEST_VOLUME_PREFIX}{what}-{}", &id[..8])
}

fn main() {
    let args = Arguments::from_args();

    let tests = vec![
        Trial::test("cli_help", || {
            tests::cli::test_help()?;
            Ok(())
        }),
        Trial::test("cli_unsupported_scheme", || {
            tests::cli::test_import_unsupported_scheme()?;
            Ok(())
        }),
        Trial::test("cli_missing_file", || {
            tests::cli::test_import_missing_file()?;
            Ok(())
        }),
        Trial::test("cli_config_volume_too_large", || {
            tests::cli::test_config_volume_too_large()?;
            Ok(())
        }),
        Trial::test("pool_missing", || {
            tests::pool_lifecycle::test_missing_pool()?;
            Ok(())
        }),
        Trial::test("pool_import_clone_remove", || {
            tests::pool_lifecycle::test_import_clone_remove()?;
            Ok(())
        }),
        Trial::test("pool_config_volume", || {
            tests::pool_lifecycle::test_config_volume()?;
            Ok(())
        }),
        Trial::test("pool_remove_missing", || {
            tests::pool_lifecycle::test_remove_missing()?;
            Ok(())
        }),
    ];

    libtest_mimic::run(&args, tests).exit();
}
