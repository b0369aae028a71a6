// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `exchange-rt config` command: print the effective configuration.

use std::path::Path;

pub fn execute(path: Option<&Path>) -> anyhow::Result<()> {
    let config = match path {
        Some(path) => runtime::ExchangeConfig::from_file(path)?,
        None => runtime::ExchangeConfig::default(),
    };
    config.validate()?;

    match path {
        Some(path) => println!("# effective configuration from {}", path.display()),
        None => println!("# default configuration"),
    }
    print!("{}", config.to_toml()?);
    Ok(())
}
