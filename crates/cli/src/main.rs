// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use clap::Parser;
use offsync::Cli;

fn main() {
    let cli = Cli::parse();
    offsync::setup_logging();
    if let Err(e) = offsync::run(cli) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
