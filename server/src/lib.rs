// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Dropshot server exposing the SAML login handshake
//!
//! This crate is the host side of the protocol: it loads configuration,
//! constructs the identity provider once at startup, and routes the two
//! protocol phases (plus a descriptor view for login UIs) over HTTP.  All
//! protocol decisions live in `gatehouse-auth`; the handlers here only
//! translate between HTTP and the core's types.

pub mod config;
pub mod context;
pub mod http_entrypoints;
pub mod views;

use anyhow::anyhow;
use slog::o;
use std::sync::Arc;

use crate::config::Config;
use crate::context::ServerContext;

/// Start the HTTP server over a context built from `config`.
pub async fn start_server(
    config: &Config,
    log: &slog::Logger,
) -> Result<dropshot::HttpServer<Arc<ServerContext>>, anyhow::Error> {
    let api = http_entrypoints::api();
    let context = Arc::new(ServerContext::new(config));

    let server = dropshot::HttpServerStarter::new(
        &config.dropshot,
        api,
        context,
        &log.new(o!("component" => "http")),
    )
    .map_err(|error| anyhow!("setting up HTTP server: {:#}", error))?
    .start();

    Ok(server)
}
