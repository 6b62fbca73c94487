// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Server side of a SAML 2.0 single-sign-on handshake
//!
//! Gatehouse is the service provider (SP) in this exchange, and the login
//! flow has two externally triggered phases with no server-side state between
//! them beyond a single CSRF cookie:
//!
//! 1. The user's browser hits the init phase.  We build the protocol
//!    settings, mint a CSRF state token (storing only its hash in a cookie),
//!    and redirect the browser to the IdP's SSO login URL:
//!
//!      https://some.idp.test/auth/saml?SAMLRequest=...&RelayState=...
//!
//!    SAMLRequest is base64 encoded zlib compressed XML.  RelayState can be
//!    anything; we encode the state token plus the page the user originally
//!    asked for, so that on success the user can be sent back to where they
//!    were.
//!
//! 2. The user authenticates with the IdP, which sends the browser back to
//!    us with a POST whose urlencoded body carries the IdP's SAMLResponse
//!    plus the echoed RelayState.  The response is handed to the assertion
//!    validator (a mature SAML library behind the [`validator`] seam); only
//!    once it validates do we consume the CSRF state, check the assertion's
//!    own verdict, and map its attributes onto an application user identity.
//!
//! Every failure is terminal for the request that produced it.  Nothing here
//! is retried, and no partial identity is ever produced.

pub mod csrf;
pub mod identity;
pub mod provider;
pub mod relay;
pub mod settings;
pub mod validator;
