// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The assertion-validator seam
//!
//! Parsing and cryptographically validating SAML XML is delegated to a
//! mature library (samael) behind a narrow trait, so the orchestrator can be
//! exercised against scripted assertions and the library can be swapped.

use crate::identity::Assertion;
use crate::settings::ProviderSettings;
use anyhow::{Context, anyhow};
use base64::Engine;
use samael::key_info::{KeyInfo, X509Data};
use samael::metadata::{
    Endpoint, EntityDescriptor, HTTP_REDIRECT_BINDING, IdpSsoDescriptor,
    KeyDescriptor,
};
use samael::service_provider::ServiceProvider;
use samael::service_provider::ServiceProviderBuilder;
use serde::Deserialize;
use std::collections::BTreeMap;

const SAML2_PROTOCOL: &str = "urn:oasis:names:tc:SAML:2.0:protocol";

/// Validates SAML callbacks and constructs IdP redirects.
///
/// Both operations are fallible with opaque errors: an error here means the
/// input (or the settings) could not be trusted or used at all, and the
/// orchestrator fails the request without retrying.
pub trait AssertionValidator {
    /// URL on the IdP's SSO endpoint that starts a login, carrying
    /// `relay_state` for the round trip.
    fn sign_in_url(
        &self,
        settings: &ProviderSettings,
        relay_state: &str,
    ) -> Result<String, anyhow::Error>;

    /// Parse and validate the urlencoded callback body, returning the
    /// validated assertion and the relay value echoed by the IdP.
    fn validate(
        &self,
        settings: &ProviderSettings,
        body: &str,
    ) -> Result<(Assertion, Option<String>), anyhow::Error>;
}

/// Form body the IdP posts to the assertion-consumer URL.
#[derive(Debug, Deserialize)]
struct SamlLoginPost {
    #[serde(rename = "SAMLResponse")]
    saml_response: String,
    #[serde(rename = "RelayState")]
    relay_state: Option<String>,
}

/// [`AssertionValidator`] backed by samael.
#[derive(Clone, Copy, Debug, Default)]
pub struct SamaelValidator;

impl SamaelValidator {
    fn service_provider(
        settings: &ProviderSettings,
    ) -> Result<ServiceProvider, anyhow::Error> {
        // The handshake keeps no per-request state between init and
        // callback, so responses cannot be matched to a request id here;
        // the CSRF state protocol binds callback to request instead.
        let mut sp = ServiceProviderBuilder::default()
            .entity_id(settings.sp_entity_id.clone())
            .allow_idp_initiated(true)
            .idp_metadata(idp_descriptor(settings)?)
            .acs_url(settings.acs_url.clone())
            .build()
            .map_err(|e| anyhow!("building service provider: {}", e))?;

        if !settings.strict {
            // testing-only mode: accept responses regardless of age
            sp.max_issue_delay = chrono::Duration::max_value();
        }

        Ok(sp)
    }
}

impl AssertionValidator for SamaelValidator {
    fn sign_in_url(
        &self,
        settings: &ProviderSettings,
        relay_state: &str,
    ) -> Result<String, anyhow::Error> {
        let sp = Self::service_provider(settings)?;
        let authn_request = sp
            .make_authentication_request(&settings.idp_sso_url)
            .map_err(|e| anyhow!("building authentication request: {}", e))?;

        let url = authn_request
            .redirect(relay_state)
            .map_err(|e| anyhow!("encoding redirect: {}", e))?
            .ok_or_else(|| anyhow!("authentication request yielded no URL"))?;

        Ok(url.to_string())
    }

    fn validate(
        &self,
        settings: &ProviderSettings,
        body: &str,
    ) -> Result<(Assertion, Option<String>), anyhow::Error> {
        let login: SamlLoginPost =
            serde_urlencoded::from_str(body).context("parsing callback body")?;

        let sp = Self::service_provider(settings)?;
        let saml_assertion = sp
            .parse_base64_response(&login.saml_response, None)
            .map_err(|e| anyhow!("validating SAML response: {}", e))?;

        let subject = saml_assertion
            .subject
            .ok_or_else(|| anyhow!("no subject in SAML response"))?;
        let name_id = subject
            .name_id
            .ok_or_else(|| anyhow!("no NameID in SAML response subject"))?;

        let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        if let Some(statements) = saml_assertion.attribute_statements {
            for statement in statements {
                for attribute in statement.attributes {
                    let name = match attribute.name {
                        Some(name) => name,
                        None => continue,
                    };
                    let values = attributes.entry(name).or_default();
                    for value in attribute.values {
                        if let Some(value) = value.value {
                            values.push(value);
                        }
                    }
                }
            }
        }

        // samael either yields a fully validated assertion or an error, so
        // a success here is an authenticated assertion with no soft
        // failures to report.
        let assertion = Assertion {
            subject: name_id.value,
            authenticated: true,
            errors: vec![],
            attributes,
        };

        Ok((assertion, login.relay_state))
    }
}

/// Minimal IdP metadata descriptor carrying exactly what the settings
/// resolver knows: the IdP entity id, its redirect-binding SSO endpoint,
/// and its signing certificate.
fn idp_descriptor(
    settings: &ProviderSettings,
) -> Result<EntityDescriptor, anyhow::Error> {
    Ok(EntityDescriptor {
        entity_id: Some(settings.idp_entity_id.clone()),
        idp_sso_descriptors: Some(vec![IdpSsoDescriptor {
            protocol_support_enumeration: Some(SAML2_PROTOCOL.to_string()),
            key_descriptors: vec![KeyDescriptor {
                key_use: Some("signing".to_string()),
                key_info: KeyInfo {
                    id: None,
                    x509_data: Some(X509Data {
                        certificates: vec![certificate_base64_der(
                            &settings.idp_certificate,
                        )?],
                    }),
                },
                encryption_methods: None,
            }],
            single_sign_on_services: vec![Endpoint {
                binding: HTTP_REDIRECT_BINDING.to_string(),
                location: settings.idp_sso_url.clone(),
                response_location: None,
            }],
            want_authn_requests_signed: Some(false),
            id: None,
            valid_until: None,
            cache_duration: None,
            error_url: None,
            signature: None,
            organization: None,
            contact_people: vec![],
            artifact_resolution_service: vec![],
            single_logout_services: vec![],
            manage_name_id_services: vec![],
            name_id_formats: vec![],
            name_id_mapping_services: vec![],
            assertion_id_request_services: vec![],
            attribute_profiles: vec![],
            attributes: vec![],
        }]),
        ..Default::default()
    })
}

/// The descriptor carries the certificate as base64 DER; round-tripping
/// through openssl strips the PEM armor and validates the input once more.
fn certificate_base64_der(pem: &str) -> Result<String, anyhow::Error> {
    let certificate = openssl::x509::X509::from_pem(pem.as_bytes())
        .context("parsing IdP certificate PEM")?;
    let der = certificate.to_der().context("re-encoding IdP certificate")?;
    Ok(base64::engine::general_purpose::STANDARD.encode(der))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::settings::test_helpers::full_config;

    fn settings() -> ProviderSettings {
        full_config()
            .resolve(Some("https://sp.example.com/login/saml"))
            .unwrap()
    }

    #[test]
    fn test_descriptor_carries_the_settings() {
        let settings = settings();
        let descriptor = idp_descriptor(&settings).unwrap();
        assert_eq!(
            descriptor.entity_id.as_deref(),
            Some("https://idp.example.com/")
        );

        let idp = &descriptor.idp_sso_descriptors.unwrap()[0];
        assert_eq!(idp.single_sign_on_services.len(), 1);
        assert_eq!(
            idp.single_sign_on_services[0].binding,
            HTTP_REDIRECT_BINDING
        );
        assert_eq!(
            idp.single_sign_on_services[0].location,
            "https://idp.example.com/sso/"
        );

        let key = &idp.key_descriptors[0];
        assert_eq!(key.key_use.as_deref(), Some("signing"));
        let certificates =
            &key.key_info.x509_data.as_ref().unwrap().certificates;
        // PEM armor never reaches the descriptor
        assert_eq!(certificates.len(), 1);
        assert!(!certificates[0].contains("BEGIN CERTIFICATE"));
    }

    #[test]
    fn test_sign_in_url_targets_the_sso_endpoint() {
        let settings = settings();
        let url = SamaelValidator
            .sign_in_url(&settings, "opaque-relay-value")
            .unwrap();
        assert!(url.starts_with("https://idp.example.com/sso/?"));
        assert!(url.contains("SAMLRequest="));
        assert!(url.contains("RelayState=opaque-relay-value"));
    }

    #[test]
    fn test_validate_rejects_a_body_without_a_response() {
        let settings = settings();
        let error = SamaelValidator
            .validate(&settings, "RelayState=whatever")
            .unwrap_err();
        assert!(error.to_string().contains("parsing callback body"));
    }

    #[test]
    fn test_validate_rejects_an_unparseable_response() {
        let settings = settings();
        assert!(SamaelValidator
            .validate(&settings, "SAMLResponse=bm90IHhtbA%3D%3D")
            .is_err());
    }
}
