use std::path::PathBuf;

use clap::Parser;

use super::*;

#[test]
fn run_uses_the_default_root() {
    let cli = Cli::parse_from(["enquete", "run"]);
    assert_eq!(cli.root, PathBuf::from(".enquete"));
    assert!(matches!(cli.command, Commands::Run));
}

#[test]
fn root_flag_overrides_the_default() {
    let cli = Cli::parse_from(["enquete", "--root", "/tmp/survey", "status"]);
    assert_eq!(cli.root, PathBuf::from("/tmp/survey"));
    assert!(matches!(cli.command, Commands::Status));
}

#[test]
fn result_takes_an_optional_session_id() {
    let cli = Cli::parse_from(["enquete", "result"]);
    let Commands::Result(args) = cli.command else {
        panic!("expected result command");
    };
    assert!(args.session.is_none());

    let cli = Cli::parse_from(["enquete", "result", "--session", "s1"]);
    let Commands::Result(args) = cli.command else {
        panic!("expected result command");
    };
    assert_eq!(args.session.as_deref(), Some("s1"));
}

#[test]
fn auth_subcommands_parse() {
    let cli = Cli::parse_from([
        "enquete",
        "auth",
        "signup",
        "--email",
        "user@example.com",
        "--password",
        "motdepasse",
        "--full-name",
        "Jean Martin",
    ]);
    let Commands::Auth(args) = cli.command else {
        panic!("expected auth command");
    };
    let AuthCommand::Signup {
        email,
        password,
        full_name,
    } = args.command
    else {
        panic!("expected signup");
    };
    assert_eq!(email, "user@example.com");
    assert_eq!(password, "motdepasse");
    assert_eq!(full_name.as_deref(), Some("Jean Martin"));

    let cli = Cli::parse_from(["enquete", "auth", "whoami"]);
    let Commands::Auth(args) = cli.command else {
        panic!("expected auth command");
    };
    assert!(matches!(args.command, AuthCommand::Whoami));
}
