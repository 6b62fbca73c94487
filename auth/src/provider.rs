// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The identity-provider orchestrator: sequencing of the two protocol
//! phases
//!
//! Constructed once at startup with its configuration and its assertion
//! validator passed explicitly; there is no ambient lookup and no state
//! shared between requests other than the CSRF cookie the browser carries.

use crate::csrf;
use crate::identity::Assertion;
use crate::identity::UserIdentity;
use crate::identity::map_user_identity;
use crate::relay::RelativeUri;
use crate::relay::RelayState;
use crate::settings::ProviderConfig;
use crate::validator::AssertionValidator;
use gatehouse_common::Error;
use http::header::HeaderMap;
use http::header::HeaderValue;

/// Fixed key under which the host's authentication dispatcher knows this
/// provider.
pub const SAML_PROVIDER_KEY: &str = "saml";

/// Rendering hints for the host's login UI.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProviderDisplay {
    pub name: &'static str,
    pub icon_path: &'static str,
    pub background_color: &'static str,
}

/// Result of the init phase: where to send the browser, and the cookie
/// that must travel with the redirect.
#[derive(Debug)]
pub struct InitRedirect {
    /// IdP SSO URL carrying the authentication request and relay state.
    pub location: String,
    pub set_cookie: HeaderValue,
}

/// A completed, verified login.  Ownership of the identity passes to the
/// caller's authentication context; the core keeps nothing.
#[derive(Debug)]
pub struct Authenticated {
    pub identity: UserIdentity,
    /// Page the user originally asked for, if the relay carried one.
    pub redirect_uri: Option<RelativeUri>,
}

/// Result of the callback phase.
///
/// `clear_cookie`, when present, must be sent to the browser regardless of
/// the outcome: the CSRF cookie is single-use and was consumed by this
/// attempt.  It is absent only when the callback failed before the CSRF
/// state was consulted.
#[derive(Debug)]
pub struct CallbackResult {
    pub clear_cookie: Option<HeaderValue>,
    pub outcome: Result<Authenticated, Error>,
}

pub struct SamlIdentityProvider<V> {
    config: ProviderConfig,
    validator: V,
    tls_enabled: bool,
}

impl<V: AssertionValidator> SamlIdentityProvider<V> {
    pub fn new(config: ProviderConfig, validator: V, tls_enabled: bool) -> Self {
        SamlIdentityProvider { config, validator, tls_enabled }
    }

    pub fn key(&self) -> &'static str {
        SAML_PROVIDER_KEY
    }

    pub fn display(&self) -> ProviderDisplay {
        ProviderDisplay {
            name: "SAML",
            icon_path: "/static/authsaml/saml.svg",
            background_color: "#444444",
        }
    }

    /// Whether the host should route logins here at all.  Consulted before
    /// [`SamlIdentityProvider::init`] is ever invoked.
    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    pub fn allows_signup(&self) -> bool {
        self.config.allows_signup()
    }

    /// Init phase: build settings, mint the CSRF state, and produce the IdP
    /// redirect that starts the login.
    ///
    /// `callback_url` is this deployment's assertion-consumer URL, where
    /// the IdP will post the response.  `redirect_uri` is the page to land
    /// the user on after a successful callback.
    pub fn init(
        &self,
        callback_url: &str,
        redirect_uri: Option<RelativeUri>,
    ) -> Result<InitRedirect, Error> {
        let settings = self.config.resolve(Some(callback_url))?;

        let generated = csrf::generate_state(self.tls_enabled);
        let relay =
            RelayState { state: generated.token, redirect_uri }
                .to_encoded()
                .map_err(|e| {
                    Error::initialization_failed(&format!(
                        "encoding relay state: {:#}",
                        e
                    ))
                })?;

        let location =
            self.validator.sign_in_url(&settings, &relay).map_err(|e| {
                Error::initialization_failed(&format!(
                    "building identity provider redirect: {:#}",
                    e
                ))
            })?;

        Ok(InitRedirect { location, set_cookie: generated.set_cookie })
    }

    /// Callback phase: validate the posted response, consume the CSRF
    /// state, check the assertion's verdict, and map the identity.
    ///
    /// The checks run strictly in that order.  A response the validator
    /// cannot trust fails immediately, before CSRF is even consulted (no
    /// conclusion can be drawn from a malformed response), and leaves the
    /// cookie untouched.  Everything after that consumes the cookie,
    /// success or failure.
    pub fn callback(&self, headers: &HeaderMap, body: &str) -> CallbackResult {
        let settings = match self.config.resolve(None) {
            Ok(settings) => settings,
            Err(error) => {
                return CallbackResult {
                    clear_cookie: None,
                    outcome: Err(error),
                };
            }
        };

        let (assertion, relay_state_string) =
            match self.validator.validate(&settings, body) {
                Ok(validated) => validated,
                Err(error) => {
                    return CallbackResult {
                        clear_cookie: None,
                        outcome: Err(Error::response_processing(&format!(
                            "{:#}",
                            error
                        ))),
                    };
                }
            };

        // An undecodable relay envelope is handled like an absent state
        // value: the cookie is still consumed and verification fails.
        let relay = relay_state_string
            .as_deref()
            .and_then(|encoded| RelayState::from_encoded(encoded).ok());
        let returned_state = relay.as_ref().map(|r| r.state.as_str());

        let verification =
            csrf::verify_state(headers, returned_state, self.tls_enabled);
        let clear_cookie = verification.clear_cookie;
        if let Err(error) = verification.result {
            return CallbackResult { clear_cookie, outcome: Err(error.into()) };
        }

        if let Err(error) = check_assertion_verdict(&assertion) {
            return CallbackResult { clear_cookie, outcome: Err(error) };
        }

        let bindings = match self.config.bindings() {
            Ok(bindings) => bindings,
            Err(error) => {
                return CallbackResult { clear_cookie, outcome: Err(error) };
            }
        };

        let outcome =
            map_user_identity(&bindings, &assertion).map(|identity| {
                Authenticated {
                    identity,
                    redirect_uri: relay.and_then(|r| r.redirect_uri),
                }
            });
        CallbackResult { clear_cookie, outcome }
    }
}

fn check_assertion_verdict(assertion: &Assertion) -> Result<(), Error> {
    if assertion.authenticated && assertion.errors.is_empty() {
        return Ok(());
    }
    if assertion.errors.is_empty() {
        Err(Error::unauthorized("Unknown error reason"))
    } else {
        Err(Error::unauthorized(&assertion.errors.join(", ")))
    }
}
