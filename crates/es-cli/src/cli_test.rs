use super::*;
use clap::CommandFactory;

#[test]
fn verify_cli_args() {
    // Validates the entire command tree: short flag conflicts,
    // duplicate args, and other clap definition errors.
    Cli::command().debug_assert();
}

#[test]
fn test_run_defaults() {
    let cli = Cli::try_parse_from(["es", "run"]).unwrap();
    assert_eq!(cli.global.config, PathBuf::from("es.ini"));
    assert_eq!(cli.global.suite_dir, PathBuf::from("es_suite"));
    assert!(!cli.global.verbose);
    match cli.command {
        Commands::Run(args) => {
            assert!(args.junit.is_none());
            assert!(args.export_failures.is_none());
            assert!(args.threads.is_none());
            assert_eq!(args.sample_limit, 1000);
        }
        other => panic!("expected run, got {:?}", other),
    }
}

#[test]
fn test_run_flags() {
    let cli = Cli::try_parse_from([
        "es",
        "run",
        "-e",
        "prod",
        "--junit",
        "out/results.xml",
        "-x",
        "failures",
        "-t",
        "8",
        "-s",
        "finance",
        "-v",
    ])
    .unwrap();
    assert!(cli.global.verbose);
    let Commands::Run(args) = cli.command else {
        panic!("expected run");
    };
    assert_eq!(args.env.as_deref(), Some("prod"));
    assert_eq!(args.junit, Some(PathBuf::from("out/results.xml")));
    assert_eq!(args.export_failures, Some(PathBuf::from("failures")));
    assert_eq!(args.threads, Some(8));
    assert_eq!(args.suite.as_deref(), Some("finance"));
}

#[test]
fn test_zero_threads_rejected() {
    assert!(Cli::try_parse_from(["es", "run", "-t", "0"]).is_err());
}

#[test]
fn test_view_tests_all_conflicts_with_suite() {
    assert!(Cli::try_parse_from(["es", "view", "tests", "-a", "-s", "finance"]).is_err());
    assert!(Cli::try_parse_from(["es", "view", "tests", "-a"]).is_ok());
}

#[test]
fn test_setup_platform() {
    let cli = Cli::try_parse_from(["es", "setup", "databricks", "--dir", "checks"]).unwrap();
    let Commands::Setup(args) = cli.command else {
        panic!("expected setup");
    };
    assert_eq!(Platform::from(args.platform), Platform::Databricks);
    assert_eq!(args.dir, Some(PathBuf::from("checks")));

    assert!(Cli::try_parse_from(["es", "setup", "sqlite"]).is_err());
}
