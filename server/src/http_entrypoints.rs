// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Handler functions (entrypoints) for the login routes
//!
//! The handlers are deliberately thin: they translate between HTTP and the
//! core's types and let the provider decide.  The one piece of
//! HTTP-shaped logic that lives here is cookie delivery on failure
//! responses.  The CSRF cookie is single-use, and once the provider has
//! consumed it the clearing Set-Cookie has to reach the browser even when
//! authentication failed, which dropshot's error type cannot carry.

use dropshot::endpoint;
use dropshot::ApiDescription;
use dropshot::HttpError;
use dropshot::HttpResponseOk;
use dropshot::Query;
use dropshot::RequestContext;
use dropshot::UntypedBody;
use gatehouse_auth::relay::RelativeUri;
use http::{header, Response, StatusCode};
use hyper::Body;
use schemars::JsonSchema;
use serde::Deserialize;
use slog::{info, warn};
use std::sync::Arc;

use crate::context::ServerContext;
use crate::views::IdentityProviderView;

pub fn api() -> ApiDescription<Arc<ServerContext>> {
    fn register(
        api: &mut ApiDescription<Arc<ServerContext>>,
    ) -> Result<(), String> {
        api.register(login_saml_redirect)?;
        api.register(login_saml)?;
        api.register(identity_provider_view)?;
        Ok(())
    }

    let mut api = ApiDescription::new();
    register(&mut api).expect("registered login entrypoints");
    api
}

#[derive(Deserialize, JsonSchema)]
pub struct LoginUrlQuery {
    /// Page to send the user back to after a successful login.
    redirect_uri: Option<RelativeUri>,
}

/// The host consults the enablement gate before routing any login traffic
/// to the provider.
fn provider_gate(apictx: &ServerContext) -> Result<(), HttpError> {
    if apictx.provider.is_enabled() {
        Ok(())
    } else {
        Err(HttpError::for_not_found(
            None,
            String::from("SAML identity provider is not enabled"),
        ))
    }
}

/// Get a redirect straight to the IdP
///
/// Starts the login: mints the CSRF state and sends the browser to the
/// identity provider's SSO URL.
#[endpoint {
   method = GET,
   path = "/login/saml/redirect",
   tags = ["login"],
}]
pub(crate) async fn login_saml_redirect(
    rqctx: RequestContext<Arc<ServerContext>>,
    query_params: Query<LoginUrlQuery>,
) -> Result<Response<Body>, HttpError> {
    let apictx = rqctx.context();
    provider_gate(apictx)?;

    let redirect_uri = query_params.into_inner().redirect_uri;
    let init = apictx
        .provider
        .init(&apictx.callback_url, redirect_uri)
        .map_err(HttpError::from)?;

    info!(rqctx.log, "redirecting login to identity provider");

    Ok(Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, init.location)
        .header(header::SET_COOKIE, init.set_cookie)
        .body("".into())?)
}

/// Authenticate a user via SAML
///
/// Assertion-consumer endpoint: the IdP posts the SAMLResponse (plus echoed
/// RelayState) here after the user authenticates.
#[endpoint {
   method = POST,
   path = "/login/saml",
   tags = ["login"],
}]
pub(crate) async fn login_saml(
    rqctx: RequestContext<Arc<ServerContext>>,
    body: UntypedBody,
) -> Result<Response<Body>, HttpError> {
    let apictx = rqctx.context();
    provider_gate(apictx)?;

    let result =
        apictx.provider.callback(rqctx.request.headers(), body.as_str()?);

    match result.outcome {
        Ok(authenticated) => {
            // The authentication context takes ownership of the identity
            // here; this deployment's context is the structured log.
            info!(
                rqctx.log,
                "authenticated via SAML";
                "login" => authenticated.identity.login.clone()
            );

            let next_url = authenticated
                .redirect_uri
                .map(|uri| uri.to_string())
                .unwrap_or_else(|| String::from("/"));

            let mut response = Response::builder()
                .status(StatusCode::SEE_OTHER)
                .header(header::LOCATION, next_url);
            if let Some(clear_cookie) = result.clear_cookie {
                response = response.header(header::SET_COOKIE, clear_cookie);
            }
            Ok(response.body("".into())?)
        }

        Err(error) => {
            let http_error = HttpError::from(error);
            warn!(
                rqctx.log,
                "SAML login failed";
                "message" => http_error.external_message.clone()
            );

            match result.clear_cookie {
                // The state was never consulted; let dropshot render the
                // error as usual.
                None => Err(http_error),

                // The state was consumed: the clearing cookie must reach
                // the browser, so build the failure response by hand.
                Some(clear_cookie) => Ok(Response::builder()
                    .status(http_error.status_code)
                    .header(header::SET_COOKIE, clear_cookie)
                    .header(
                        header::CONTENT_TYPE,
                        "text/plain; charset=UTF-8",
                    )
                    .body(http_error.external_message.into())?),
            }
        }
    }
}

/// Describe the configured identity provider
///
/// Login UIs use this to render the provider button without knowing
/// anything else about SAML.
#[endpoint {
   method = GET,
   path = "/login/saml/provider",
   tags = ["login"],
}]
pub(crate) async fn identity_provider_view(
    rqctx: RequestContext<Arc<ServerContext>>,
) -> Result<HttpResponseOk<IdentityProviderView>, HttpError> {
    let apictx = rqctx.context();
    provider_gate(apictx)?;
    Ok(HttpResponseOk(IdentityProviderView::from(&apictx.provider)))
}
