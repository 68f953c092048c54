//! Build script for pmufw
//!
//! Generates the table capacities and API version constants consumed by
//! the `config` module.

use std::env;
use std::fs;
use std::path::Path;

/// PM API version reported by `GetApiVersion`
const PM_VERSION_MAJOR: u32 = 1;
const PM_VERSION_MINOR: u32 = 0;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=PMUFW_MAX_NODES");
    println!("cargo:rerun-if-env-changed=PMUFW_MAX_NOTIFIERS");

    generate_config();
}

fn env_or(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn generate_config() {
    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    let dest_path = Path::new(&out_dir).join("pmu_config.rs");

    let mut config = String::new();
    config.push_str("// Auto-generated configuration file\n\n");

    config.push_str(&format!("pub const PM_VERSION_MAJOR: u32 = {};\n", PM_VERSION_MAJOR));
    config.push_str(&format!("pub const PM_VERSION_MINOR: u32 = {};\n", PM_VERSION_MINOR));

    // Table capacities
    config.push_str("\n// Table capacities\n");
    config.push_str(&format!("pub const MAX_NODES: usize = {};\n", env_or("PMUFW_MAX_NODES", 64)));
    config.push_str("pub const MAX_MASTERS: usize = 8;\n");
    config.push_str("pub const MAX_PROCS_PER_MASTER: usize = 4;\n");
    config.push_str("pub const MAX_REQUIREMENTS: usize = 128;\n");
    config.push_str(&format!(
        "pub const MAX_NOTIFIERS: usize = {};\n",
        env_or("PMUFW_MAX_NOTIFIERS", 16)
    ));

    fs::write(&dest_path, config).expect("failed to write pmu_config.rs");
}
