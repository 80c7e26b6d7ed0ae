use std::process::Command;

/// Prefix of every volume created by the integration tests
const TEST_VOLUME_PREFIX: &str = "vmdisk-it-";

fn cleanup_integration_test_volumes() -> Result<(), Box<dyn std::error::Error>> {
    let Ok(pool) = std::env::var("VMDISK_TEST_POOL") else {
        println!("VMDISK_TEST_POOL not set, nothing to clean up");
        return Ok(());
    };
    println!("Cleaning up integration test volumes in pool '{pool}'...");

    let list_output = Command::new("virsh").args(["vol-list", &pool]).output()?;
    if !list_output.status.success() {
        eprintln!("Warning: Failed to list volumes");
        return Ok(());
    }

    let stdout = String::from_utf8_lossy(&list_output.stdout);
    let volumes: Vec<&str> = stdout
        .lines()
        .skip(2)
        .filter_map(|l| l.split_whitespace().next())
        .filter(|name| name.starts_with(TEST_VOLUME_PREFIX))
        .collect();

    if volumes.is_empty() {
        println!("No integration test volumes found to clean up");
        return Ok(());
    }

    println!(
        "Found {} integration test volume(s) to clean up",
        volumes.len()
    );

    let mut cleaned = 0;
    for name in volumes {
        print!("  Removing volume {}... ", name);
        let rm_output = Command::new("virsh")
            .args(["vol-delete", name, "--pool", &pool])
            .output()?;

        if rm_output.status.success() {
            println!("✓");
            cleaned += 1;
        } else {
            println!("✗ (failed)");
            eprintln!("    Error: {}", String::from_utf8_lossy(&rm_output.stderr));
        }
    }

    println!("Cleanup completed: {} volume(s) removed", cleaned);
    Ok(())
}

fn main() {
    if let Err(e) = cleanup_integration_test_volumes() {
        eprintln!("Error during cleanup: {}", e);
        std::process::exit(1);
    }
}
