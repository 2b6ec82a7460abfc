//! `triage config` -- print the effective configuration.

use anyhow::Result;

use triage_types::config::GlobalConfig;

pub fn show_config(config: &GlobalConfig, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
    } else {
        print!("{}", toml::to_string_pretty(config)?);
    }
    Ok(())
}
