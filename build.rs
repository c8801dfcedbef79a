use std::{env, path::PathBuf};

use anyhow::anyhow;
use embuild::cargo::set_rustc_env;
use embuild::kconfig::{try_from_config_file, Value};
use log::LevelFilter;

#[allow(dead_code)]
#[path = "src/env_flags.rs"]
mod env_flags;

use env_flags::{CargoDirectives, RECOGNIZED_FLAGS};

const ENV_FILE: &str = ".env";
const CONFIG_FILE: &str = "src/controller.config";

fn main() -> anyhow::Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .env()
        .init()
        .map_err(|e| anyhow!("{e}"))?;

    if env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }

    let root = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    println!("cargo:rerun-if-changed={}", root.join(CONFIG_FILE).display());

    for (key, value) in try_from_config_file(root.join(CONFIG_FILE))? {
        match value {
            Value::String(string) => set_rustc_env(key, string),
            _ => continue,
        }
    }

    let env_file = root.join(ENV_FILE);
    let mut cargo = CargoDirectives::new(&env_file, RECOGNIZED_FLAGS);
    for flag in env_flags::translate(&env_file, &mut cargo)? {
        cargo.warn(flag);
    }
    for line in cargo.lines() {
        println!("{line}");
    }

    Ok(())
}
