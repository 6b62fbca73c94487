// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Server configuration, read from a TOML file at startup

use gatehouse_auth::settings::ProviderConfig;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub log: dropshot::ConfigLogging,
    #[serde(default)]
    pub dropshot: dropshot::ConfigDropshot,
    pub server: ServerConfig,
    pub saml: ProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// External base URL of this deployment, as reachable by the user's
    /// browser (and so by the IdP's redirects), e.g.
    /// "https://sp.example.com".
    pub base_url: String,

    /// Whether TLS is terminated in front of this server.  Controls the
    /// `Secure` attribute on the CSRF cookie; the server itself never
    /// enforces TLS.
    #[serde(default)]
    pub external_tls_enabled: bool,
}

impl Config {
    /// The assertion-consumer URL the IdP posts callbacks to.
    pub fn callback_url(&self) -> String {
        format!("{}/login/saml", self.server.base_url.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod test {
    use super::Config;

    #[test]
    fn test_config_parses_and_derives_the_callback_url() {
        let config: Config = toml::from_str(
            r#"
            [log]
            mode = "stderr-terminal"
            level = "info"

            [dropshot]
            bind_address = "127.0.0.1:12220"

            [server]
            base_url = "https://sp.example.com/"

            [saml]
            enabled = true
            provider_id = "https://idp.example.com"
            login_url = "https://idp.example.com/sso"
            certificate = "placeholder"
            application_id = "https://sp.example.com"
            login_attribute = "login"
            name_attribute = "name"
            "#,
        )
        .unwrap();

        assert_eq!(config.callback_url(), "https://sp.example.com/login/saml");
        assert!(!config.server.external_tls_enabled);
        assert!(config.saml.is_enabled());
    }
}
