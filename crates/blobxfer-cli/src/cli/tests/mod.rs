//! CLI parse tests.

use super::{apply_overrides, Cli, CliCommand};
use clap::Parser;

pub(super) fn parse(args: &[&str]) -> CliCommand {
    let cli = Cli::try_parse_from(args).unwrap();
    cli.command
}


#[test]
fn cli_parse_checksum() {
    match parse(&["blobxfer", "checksum", "/path/to/file.bin"]) {
        CliCommand::Checksum { path } => {
            assert_eq!(path, std::path::PathBuf::from("/path/to/file.bin"))
        }
        _ => panic!("expected Checksum"),
    }
}

#[test]
fn cli_parse_global_secondary_host() {
    let cli = Cli::try_parse_from([
        "blobxfer",
        "checksum",
        "x.bin",
        "--secondary-host",
        "acct-secondary.blob.core.windows.net",
    ])
    .unwrap();
    assert_eq!(
        cli.secondary_host.as_deref(),
        Some("acct-secondary.blob.core.windows.net")
    );
}

#[test]
fn secondary_host_override_creates_retry_section() {
    let mut cfg = blobxfer_core::config::BlobxferConfig::default();
    apply_overrides(&mut cfg, Some("replica.example".to_string()));
    assert_eq!(
        cfg.retry_options().secondary_host.as_deref(),
        Some("replica.example")
    );

    let mut untouched = blobxfer_core::config::BlobxferConfig::default();
    apply_overrides(&mut untouched, None);
    assert!(untouched.retry.is_none());
}

#[test]
fn cli_rejects_unknown_command() {
    assert!(Cli::try_parse_from(["blobxfer", "status"]).is_err());
}
