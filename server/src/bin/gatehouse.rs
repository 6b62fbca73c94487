// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Executable that serves the SAML login handshake

use anyhow::anyhow;
use anyhow::Context;
use clap::Parser;
use gatehouse_server::config::Config;
use slog::info;
use slog::warn;
use std::path::PathBuf;

#[derive(Parser, Debug)]
struct Args {
    #[clap(long, action)]
    config_file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    let config_file = &args.config_file;
    let config_file_contents = std::fs::read_to_string(config_file)
        .with_context(|| format!("read config file {:?}", config_file))?;
    let config: Config = toml::from_str(&config_file_contents)
        .with_context(|| format!("parse config file {:?}", config_file))?;

    let log = config
        .log
        .to_logger("gatehouse")
        .context("failed to create logger")?;

    if !config.saml.is_enabled() {
        // still serve: the gate 404s login traffic until the administrator
        // completes the configuration
        warn!(
            &log,
            "SAML identity provider is disabled or missing mandatory settings"
        );
    }

    info!(&log, "starting server";
        "callback_url" => config.callback_url()
    );

    let server = gatehouse_server::start_server(&config, &log).await?;

    server
        .await
        .map_err(|error_message| anyhow!("server exiting: {}", error_message))
}
