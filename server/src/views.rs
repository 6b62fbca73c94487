// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Public views of server state

use gatehouse_auth::provider::SamlIdentityProvider;
use gatehouse_auth::validator::AssertionValidator;
use schemars::JsonSchema;
use serde::Serialize;

/// Descriptor of the configured identity provider, for login UI rendering.
#[derive(Clone, Debug, JsonSchema, Serialize)]
pub struct IdentityProviderView {
    pub key: String,
    pub name: String,
    pub icon_path: String,
    pub background_color: String,
    /// Whether users unknown to the application may authenticate.
    pub allows_signup: bool,
}

impl<V: AssertionValidator> From<&SamlIdentityProvider<V>>
    for IdentityProviderView
{
    fn from(provider: &SamlIdentityProvider<V>) -> Self {
        let display = provider.display();
        IdentityProviderView {
            key: provider.key().to_string(),
            name: display.name.to_string(),
            icon_path: display.icon_path.to_string(),
            background_color: display.background_color.to_string(),
            allows_signup: provider.allows_signup(),
        }
    }
}
