// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared state for the server

use gatehouse_auth::provider::SamlIdentityProvider;
use gatehouse_auth::validator::SamaelValidator;

use crate::config::Config;

/// Built once at startup and shared by every request handler.
pub struct ServerContext {
    pub provider: SamlIdentityProvider<SamaelValidator>,
    /// Assertion-consumer URL for the init phase.
    pub callback_url: String,
}

impl ServerContext {
    pub fn new(config: &Config) -> ServerContext {
        ServerContext {
            provider: SamlIdentityProvider::new(
                config.saml.clone(),
                SamaelValidator,
                config.server.external_tls_enabled,
            ),
            callback_url: config.callback_url(),
        }
    }
}
