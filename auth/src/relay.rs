// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The relay parameter round-tripped through the identity provider
//!
//! The IdP treats RelayState as opaque and echoes it back verbatim with the
//! callback.  We pack two things into it: the raw CSRF state token, and the
//! page the user originally asked for so a successful login can land them
//! back there.  The redirect target is constrained to a relative URI so the
//! post-login redirect can never leave this host.

use anyhow::Context;
use base64::Engine;
use http::Uri;
use parse_display::Display;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RelayState {
    /// The CSRF state token, verbatim.  Never log this value.
    pub state: String,
    pub redirect_uri: Option<RelativeUri>,
}

impl RelayState {
    pub fn to_encoded(&self) -> Result<String, anyhow::Error> {
        Ok(base64::engine::general_purpose::STANDARD.encode(
            serde_json::to_string(&self).context("encoding relay state")?,
        ))
    }

    pub fn from_encoded(encoded: &str) -> Result<Self, anyhow::Error> {
        serde_json::from_str(
            &String::from_utf8(
                base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .context("base64 decoding relay state")?,
            )
            .context("creating relay state string")?,
        )
        .context("json from relay state string")
    }
}

/// A URI with no scheme and no host.  This is meant as a security feature:
/// we never redirect to a URI on a different host.
#[derive(Clone, Debug, Deserialize, Display, JsonSchema, PartialEq, Serialize)]
#[serde(try_from = "String")]
#[display("{0}")]
pub struct RelativeUri(String);

impl FromStr for RelativeUri {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s.to_string())
    }
}

impl TryFrom<Uri> for RelativeUri {
    type Error = String;

    fn try_from(uri: Uri) -> Result<Self, Self::Error> {
        if uri.host().is_none() && uri.scheme().is_none() {
            Ok(Self(uri.to_string()))
        } else {
            Err(format!("\"{}\" is not a relative URI", uri))
        }
    }
}

impl TryFrom<String> for RelativeUri {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse::<Uri>()
            .map_err(|_| format!("\"{}\" is not a relative URI", s))
            .and_then(Self::try_from)
    }
}

#[cfg(test)]
mod test {
    use super::{RelativeUri, RelayState};

    #[test]
    fn test_relay_state_round_trips() {
        let relay = RelayState {
            state: "0123456789abcdefghijklmnopqr".to_string(),
            redirect_uri: Some("/projects/roundtrip".parse().unwrap()),
        };
        let encoded = relay.to_encoded().unwrap();
        // the raw token must not be readable without decoding
        assert!(!encoded.contains(&relay.state));
        assert_eq!(RelayState::from_encoded(&encoded).unwrap(), relay);
    }

    #[test]
    fn test_relay_state_without_redirect_round_trips() {
        let relay =
            RelayState { state: "token".to_string(), redirect_uri: None };
        let encoded = relay.to_encoded().unwrap();
        assert_eq!(RelayState::from_encoded(&encoded).unwrap(), relay);
    }

    #[test]
    fn test_relay_state_rejects_garbage() {
        assert!(RelayState::from_encoded("not base64!").is_err());
        let not_json = base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            "not json",
        );
        assert!(RelayState::from_encoded(&not_json).is_err());
    }

    #[test]
    fn test_relative_uri() {
        let good = ["/", "/abc", "/abc/def?q=1"];
        for g in good.iter() {
            assert!(RelativeUri::try_from(g.to_string()).is_ok());
        }

        let bad = ["", "example.com", "http://example.com", "//example.com"];
        for b in bad.iter() {
            assert!(RelativeUri::try_from(b.to_string()).is_err());
        }
    }
}
