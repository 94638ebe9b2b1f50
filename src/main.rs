/*
 * SPDX-FileCopyrightText: 2024 The colbert-index Authors
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

use anyhow::Result;
use clap::Parser;

mod cli;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = cli::Cli::parse();
    if let Err(err) = cli::run(cli) {
        log::error!("{err:#}");
        std::process::exit(1);
    }
    Ok(())
}
