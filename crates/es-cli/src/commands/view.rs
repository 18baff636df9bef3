//! View command implementation - list tests and print their SQL

use anyhow::{Context, Result};
use es_core::find_test;

use super::common::{self, FAILURE_EXIT_CODE, NO_TESTS_MESSAGE};
use crate::cli::{GlobalArgs, ViewArgs, ViewCommands, ViewTestArgs, ViewTestsArgs};

/// Execute the view command
pub(crate) async fn execute(args: &ViewArgs, global: &GlobalArgs) -> Result<()> {
    match &args.command {
        ViewCommands::Tests(args) => list_tests(args, global),
        ViewCommands::Test(args) => show_test(args, global).await,
    }
}

fn list_tests(args: &ViewTestsArgs, global: &GlobalArgs) -> Result<()> {
    let suite = if args.all { None } else { args.suite.as_deref() };
    let sources = common::discover(&global.suite_dir, suite)?;
    if sources.is_empty() {
        println!("{}", NO_TESTS_MESSAGE);
        std::process::exit(FAILURE_EXIT_CODE);
    }

    println!("Test cases found:\n");
    common::print_test_table(&sources);
    println!("\n{} tests", sources.len());
    Ok(())
}

async fn show_test(args: &ViewTestArgs, global: &GlobalArgs) -> Result<()> {
    let found = find_test(&global.suite_dir, &args.name)
        .with_context(|| format!("Failed to look up test '{}'", args.name))?;

    let Some(source) = found else {
        println!("Error: Test '{}' not found.", args.name);
        let subgroup = args.name.split_once('/').map(|(group, _)| group);
        let available: Vec<String> = common::discover(&global.suite_dir, subgroup)?
            .iter()
            .map(|s| s.display_name())
            .collect();
        println!("Available tests: {}", available.join(", "));
        std::process::exit(FAILURE_EXIT_CODE);
    };

    let sql = tokio::fs::read_to_string(&source.path)
        .await
        .with_context(|| format!("Failed to read test file: {}", source.path.display()))?;
    println!("{}", sql.trim_end());
    Ok(())
}
