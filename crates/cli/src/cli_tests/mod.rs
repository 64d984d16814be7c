// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use super::*;
use clap::CommandFactory;
use offsync_core::{Method, Priority};
use yare::parameterized;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("offsync").chain(args.iter().copied())).unwrap()
}

#[test]
fn test_cli_is_well_formed() {
    Cli::command().debug_assert();
}

#[test]
fn test_global_options_after_subcommand() {
    let cli = parse(&["status", "--state-dir", "/tmp/s", "--config", "/tmp/c.toml"]);
    assert_eq!(cli.state_dir, Some(PathBuf::from("/tmp/s")));
    assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.toml")));
    assert!(matches!(cli.command, Command::Status { json: false }));
}

#[test]
fn test_enqueue_defaults() {
    let cli = parse(&["enqueue", "post", "/campaigns"]);
    let Command::Enqueue(args) = cli.command else {
        unreachable!("parsed as enqueue");
    };
    assert_eq!(args.method, Method::Post);
    assert_eq!(args.target, "/campaigns");
    assert_eq!(args.priority, Priority::Normal);
    assert_eq!(args.payload, None);
    assert_eq!(args.max_retries, None);
}

#[test]
fn test_enqueue_all_options() {
    let cli = parse(&[
        "enqueue",
        "PATCH",
        "/settings",
        "--payload",
        "{\"theme\":\"dark\"}",
        "-p",
        "high",
        "--max-retries",
        "5",
        "-d",
        "Save settings",
    ]);
    let Command::Enqueue(args) = cli.command else {
        unreachable!("parsed as enqueue");
    };
    assert_eq!(args.method, Method::Patch);
    assert_eq!(args.priority, Priority::High);
    assert_eq!(args.max_retries, Some(5));
    assert_eq!(args.description.as_deref(), Some("Save settings"));
}

#[parameterized(
    bad_method = { &["enqueue", "FETCH", "/x"] },
    bad_priority = { &["enqueue", "GET", "/x", "--priority", "urgent"] },
    missing_target = { &["enqueue", "GET"] },
    missing_id = { &["remove"] },
)]
fn test_rejects(args: &[&str]) {
    let argv = std::iter::once("offsync").chain(args.iter().copied());
    assert!(Cli::try_parse_from(argv).is_err());
}

#[test]
fn test_watch_topics_repeat() {
    let cli = parse(&["watch", "--topic", "revenue", "--topic", "notifications"]);
    let Command::Watch { topics } = cli.command else {
        unreachable!("parsed as watch");
    };
    assert_eq!(topics, ["revenue", "notifications"]);
}

#[parameterized(
    replay = { "replay" },
    retry_failed = { "retry-failed" },
    clear = { "clear" },
)]
fn test_bare_commands(name: &str) {
    assert!(Cli::try_parse_from(["offsync", name]).is_ok());
}
