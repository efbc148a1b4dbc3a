//! `tabload tables` command implementation
//!
//! Lists what a registry file defines.

use colored::Colorize;
use std::path::Path;
use tabload_engine::ColumnRule;

use super::load_registry;
use crate::error::Result;

pub async fn run(registry: &Path) -> Result<()> {
    let registry = load_registry(registry)?;

    let tables: Vec<_> = registry.tables().collect();
    if tables.is_empty() {
        println!("No tables defined.");
    } else {
        println!("{}", "Tables:".cyan().bold());
        for (name, schema) in tables {
            let typed = schema
                .columns
                .iter()
                .filter(|c| schema.rule_for(c) != ColumnRule::Text)
                .count();
            println!(
                "  {:<24} {} columns ({} typed)",
                name.green(),
                schema.width(),
                typed
            );
        }
    }

    if !registry.scripts().is_empty() {
        println!();
        println!("{}", "Scripts:".cyan().bold());
        for script in registry.scripts() {
            println!("  {}", script.name.green());
        }
    }

    Ok(())
}
