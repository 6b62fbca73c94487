// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error handling facilities for the SSO handshake
//!
//! Every failure in the handshake is terminal for the request that produced
//! it; nothing here is retried.  The variants exist so that callers can tell
//! an attack (`Unauthorized`) apart from misconfiguration (`Configuration`,
//! `MissingRequiredAttribute`) and from untrusted input the validator could
//! not make sense of (`ResponseProcessing`).  When generated as part of an
//! HTTP request, an `Error` is converted into an `HttpError` as one of the
//! last steps in processing the request.

use dropshot::HttpError;
use serde::Deserialize;
use serde::Serialize;

#[derive(Clone, Debug, Deserialize, thiserror::Error, PartialEq, Serialize)]
pub enum Error {
    /// A mandatory configuration value is missing or malformed.  Surfaced to
    /// the administrator at settings-resolution time, before any network
    /// interaction is attempted.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// The outbound redirect to the identity provider could not be built.
    /// Fatal for the request; not retried.
    #[error("failed to initialize authentication request: {internal_message}")]
    InitializationFailed { internal_message: String },

    /// The assertion validator could not parse or validate the response.
    /// The input is untrusted; no partial identity is ever produced from it.
    #[error("failed to process identity provider response: {internal_message}")]
    ResponseProcessing { internal_message: String },

    /// Authentication was refused: CSRF state mismatch, missing CSRF cookie,
    /// or an assertion that reports failure.  Surfaced to the end user.
    #[error("authentication failed: {reason}")]
    Unauthorized { reason: String },

    /// A structurally valid, CSRF-valid assertion did not carry an attribute
    /// the identity mapping requires.  This indicates IdP/SP attribute
    /// mapping misconfiguration rather than an attack, so it gets its own
    /// variant (and error code) even though it is reported as unauthorized.
    #[error("mandatory attribute {key:?} is missing from the assertion")]
    MissingRequiredAttribute { key: String },
}

impl Error {
    pub fn configuration(message: &str) -> Error {
        Error::Configuration { message: message.to_owned() }
    }

    pub fn initialization_failed(internal_message: &str) -> Error {
        Error::InitializationFailed {
            internal_message: internal_message.to_owned(),
        }
    }

    pub fn response_processing(internal_message: &str) -> Error {
        Error::ResponseProcessing {
            internal_message: internal_message.to_owned(),
        }
    }

    pub fn unauthorized(reason: &str) -> Error {
        Error::Unauthorized { reason: reason.to_owned() }
    }

    pub fn missing_attribute(key: &str) -> Error {
        Error::MissingRequiredAttribute { key: key.to_owned() }
    }
}

impl From<Error> for HttpError {
    /// Defines how handshake errors are exposed to clients over HTTP.
    ///
    /// Configuration and initialization problems are server-side: the
    /// end user gets a 500 and the detail stays in the server log.  The
    /// remaining variants describe the client's own request and are safe to
    /// surface.
    fn from(error: Error) -> HttpError {
        match error {
            Error::Configuration { message } => {
                HttpError::for_internal_error(format!(
                    "configuration error: {}",
                    message
                ))
            }

            Error::InitializationFailed { internal_message } => {
                HttpError::for_internal_error(internal_message)
            }

            Error::ResponseProcessing { internal_message } => {
                HttpError::for_bad_request(
                    Some(String::from("ResponseProcessing")),
                    format!(
                        "failed to process identity provider response: {}",
                        internal_message
                    ),
                )
            }

            Error::Unauthorized { reason } => HttpError::for_client_error(
                Some(String::from("Unauthorized")),
                http::StatusCode::UNAUTHORIZED,
                format!("authentication failed: {}", reason),
            ),

            error @ Error::MissingRequiredAttribute { .. } => {
                HttpError::for_client_error(
                    Some(String::from("MissingRequiredAttribute")),
                    http::StatusCode::UNAUTHORIZED,
                    error.to_string(),
                )
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::Error;
    use dropshot::HttpError;

    #[test]
    fn test_misconfiguration_is_a_server_error() {
        let error: HttpError =
            Error::configuration("Provider ID is missing").into();
        assert_eq!(error.status_code, http::StatusCode::INTERNAL_SERVER_ERROR);
        assert!(error.internal_message.contains("Provider ID is missing"));
    }

    #[test]
    fn test_unauthorized_maps_to_401_with_reason() {
        let error: HttpError = Error::unauthorized("expired").into();
        assert_eq!(error.status_code, http::StatusCode::UNAUTHORIZED);
        assert_eq!(error.external_message, "authentication failed: expired");
        assert_eq!(error.error_code, Some(String::from("Unauthorized")));
    }

    #[test]
    fn test_missing_attribute_is_distinguishable_from_an_attack() {
        let error: HttpError = Error::missing_attribute("login").into();
        assert_eq!(error.status_code, http::StatusCode::UNAUTHORIZED);
        assert_eq!(
            error.error_code,
            Some(String::from("MissingRequiredAttribute"))
        );
        assert!(error.external_message.contains("\"login\""));
    }

    #[test]
    fn test_untrusted_response_is_a_bad_request() {
        let error: HttpError =
            Error::response_processing("bad base64").into();
        assert_eq!(error.status_code, http::StatusCode::BAD_REQUEST);
    }
}
