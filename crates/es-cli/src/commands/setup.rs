//! Setup command implementation - scaffolds a suite directory and es.ini

use anyhow::{Context, Result};
use es_core::Platform;
use std::fs;
use std::path::Path;

use crate::cli::{GlobalArgs, SetupArgs};

/// Name of the example test written into a new suite
pub(crate) const EXAMPLE_TEST_FILE: &str = "EXAMPLE.es.sql";

/// What a setup run created; existing files are left alone
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Scaffold {
    pub suite_created: bool,
    pub config_created: bool,
}

/// Execute the setup command
pub(crate) async fn execute(args: &SetupArgs, global: &GlobalArgs) -> Result<()> {
    let suite_dir = args.dir.as_deref().unwrap_or(&global.suite_dir);
    let platform = Platform::from(args.platform);

    let scaffold = scaffold(platform, suite_dir, &global.config)?;

    if scaffold.suite_created {
        println!(
            "Created '{}' directory with example query file.",
            suite_dir.display()
        );
    } else {
        println!(
            "Directory '{}' already exists. Skipping creation.",
            suite_dir.display()
        );
    }
    if scaffold.config_created {
        println!(
            "Created '{}' configuration file for {}.",
            global.config.display(),
            platform
        );
    } else {
        println!(
            "File '{}' already exists. Skipping creation.",
            global.config.display()
        );
    }
    Ok(())
}

/// Create the suite directory and config template when they are missing
pub(crate) fn scaffold(platform: Platform, suite_dir: &Path, config_path: &Path) -> Result<Scaffold> {
    let mut created = Scaffold::default();

    if !suite_dir.exists() {
        fs::create_dir_all(suite_dir)
            .with_context(|| format!("Failed to create directory: {}", suite_dir.display()))?;
        let example = suite_dir.join(EXAMPLE_TEST_FILE);
        fs::write(&example, example_sql(platform))
            .with_context(|| format!("Failed to write {}", example.display()))?;
        created.suite_created = true;
    }

    if !config_path.exists() {
        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        fs::write(config_path, config_template(platform))
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        created.config_created = true;
    }

    Ok(created)
}

fn config_template(platform: Platform) -> &'static str {
    match platform {
        Platform::Snowflake => include_str!("../../templates/snowflake.ini"),
        Platform::Postgres => include_str!("../../templates/postgres.ini"),
        Platform::Databricks => include_str!("../../templates/databricks.ini"),
    }
}

fn example_sql(platform: Platform) -> &'static str {
    match platform {
        Platform::Snowflake => include_str!("../../templates/snowflake.es.sql"),
        Platform::Postgres => include_str!("../../templates/postgres.es.sql"),
        Platform::Databricks => include_str!("../../templates/databricks.es.sql"),
    }
}

#[cfg(test)]
#[path = "setup_test.rs"]
mod tests;
