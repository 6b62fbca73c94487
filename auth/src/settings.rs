// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Resolution of externally supplied configuration into protocol settings
//!
//! The configuration surface is owned by the host; this module only reads
//! it.  Resolution fails fast: a missing mandatory value is a configuration
//! error surfaced to the administrator before any network interaction is
//! attempted, never a runtime error in the middle of a handshake.

use gatehouse_common::Error;
use serde::Deserialize;

/// Sentinel assertion-consumer URL substituted when no callback URL is
/// supplied.  Only the init phase needs the real callback URL; the settings
/// object built for response processing carries this placeholder.
pub const ACS_URL_PLACEHOLDER: &str = "http://localhost";

/// Raw configuration for the SAML identity provider, as supplied by the
/// host's configuration layer (the `[saml]` section of the config file).
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Master switch.  Ignored unless the mandatory settings below are also
    /// present; see [`ProviderConfig::is_enabled`].
    #[serde(default)]
    pub enabled: bool,

    /// Identifier (URI) of the identity provider entity.
    pub provider_id: Option<String>,

    /// SSO login URL of the identity provider.
    pub login_url: Option<String>,

    /// X.509 signing certificate of the identity provider, PEM text.
    pub certificate: Option<String>,

    /// Entity id this application presents as the service provider.
    pub application_id: Option<String>,

    /// Allow users unknown to the application to authenticate.
    #[serde(default = "default_true")]
    pub allow_signup: bool,

    /// Full XML-signature and schema validation of responses.  Always on in
    /// production; disabling it is only for controlled testing against
    /// self-signed or not-yet-configured endpoints.
    #[serde(default = "default_true")]
    pub strict: bool,

    /// Assertion attribute carrying the user's login.
    pub login_attribute: Option<String>,

    /// Assertion attribute carrying the user's display name.
    pub name_attribute: Option<String>,

    /// Assertion attribute carrying the user's email, if any.
    pub email_attribute: Option<String>,

    /// Assertion attribute whose values denote the user's group
    /// memberships, if any.
    pub group_attribute: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Configured attribute-name bindings for the identity mapping.
///
/// Login and display name are mandatory for the provider to be usable at
/// all; email and group are optional and, when unset, are not looked up.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeBindings {
    pub login: String,
    pub name: String,
    pub email: Option<String>,
    pub group: Option<String>,
}

/// Protocol settings consumed by the assertion validator, resolved from a
/// [`ProviderConfig`].
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderSettings {
    /// IdP entity id, normalized to end with a trailing slash.
    pub idp_entity_id: String,
    /// IdP SSO URL, normalized to end with a trailing slash.
    pub idp_sso_url: String,
    /// IdP X.509 signing certificate, PEM text.
    pub idp_certificate: String,
    /// SP entity id.
    pub sp_entity_id: String,
    /// SP assertion-consumer URL (or [`ACS_URL_PLACEHOLDER`]).
    pub acs_url: String,
    pub strict: bool,
}

impl ProviderConfig {
    /// Build the settings object for one protocol phase.
    ///
    /// `callback_url` is required for the init phase, where the IdP must be
    /// told where to post the response; response processing resolves with
    /// `None` and gets the placeholder.
    pub fn resolve(
        &self,
        callback_url: Option<&str>,
    ) -> Result<ProviderSettings, Error> {
        let idp_entity_id = url_with_ending_slash(
            self.provider_id
                .as_deref()
                .ok_or_else(|| Error::configuration("Provider ID is missing"))?,
        );
        let idp_sso_url = url_with_ending_slash(
            self.login_url
                .as_deref()
                .ok_or_else(|| Error::configuration("Login URL is missing"))?,
        );
        let idp_certificate = self
            .certificate
            .clone()
            .ok_or_else(|| Error::configuration("Certificate is missing"))?;

        // Reject garbage certificates here rather than mid-handshake.
        openssl::x509::X509::from_pem(idp_certificate.as_bytes()).map_err(
            |e| {
                Error::configuration(&format!(
                    "Certificate is not a valid PEM X.509 certificate: {}",
                    e
                ))
            },
        )?;

        let sp_entity_id = self
            .application_id
            .clone()
            .ok_or_else(|| Error::configuration("Application ID is missing"))?;

        Ok(ProviderSettings {
            idp_entity_id,
            idp_sso_url,
            idp_certificate,
            sp_entity_id,
            acs_url: callback_url.unwrap_or(ACS_URL_PLACEHOLDER).to_owned(),
            strict: self.strict,
        })
    }

    /// Attribute bindings for the identity mapping.  Login and display name
    /// bindings are mandatory.
    pub fn bindings(&self) -> Result<AttributeBindings, Error> {
        Ok(AttributeBindings {
            login: self.login_attribute.clone().ok_or_else(|| {
                Error::configuration("Login attribute is missing")
            })?,
            name: self.name_attribute.clone().ok_or_else(|| {
                Error::configuration("User name attribute is missing")
            })?,
            email: self.email_attribute.clone(),
            group: self.group_attribute.clone(),
        })
    }

    /// The enablement gate consulted by the host before the init phase is
    /// ever routed here: the enabled flag counts only when every setting the
    /// handshake cannot run without is present.
    pub fn is_enabled(&self) -> bool {
        self.enabled
            && self.login_url.is_some()
            && self.certificate.is_some()
            && self.login_attribute.is_some()
            && self.name_attribute.is_some()
    }

    pub fn allows_signup(&self) -> bool {
        self.allow_signup
    }
}

fn url_with_ending_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_owned()
    } else {
        format!("{}/", url)
    }
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use super::ProviderConfig;

    /// A fully populated configuration with a freshly minted self-signed
    /// IdP certificate.
    pub(crate) fn full_config() -> ProviderConfig {
        ProviderConfig {
            enabled: true,
            provider_id: Some("https://idp.example.com".to_string()),
            login_url: Some("https://idp.example.com/sso".to_string()),
            certificate: Some(self_signed_certificate_pem()),
            application_id: Some("https://sp.example.com".to_string()),
            allow_signup: true,
            strict: true,
            login_attribute: Some("login".to_string()),
            name_attribute: Some("name".to_string()),
            email_attribute: Some("email".to_string()),
            group_attribute: Some("groups".to_string()),
        }
    }

    pub(crate) fn self_signed_certificate_pem() -> String {
        let params =
            rcgen::CertificateParams::new(vec!["idp.example.com".to_string()]);
        rcgen::Certificate::from_params(params)
            .expect("failed to generate IdP keys")
            .serialize_pem()
            .expect("failed to serialize IdP certificate")
    }
}
