// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mapping a validated assertion onto an application user identity

use crate::settings::AttributeBindings;
use gatehouse_common::Error;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// The validated, IdP-signed claim set for one login event, as exposed by
/// the assertion validator.
#[derive(Clone, Debug, PartialEq)]
pub struct Assertion {
    /// The asserted subject identifier (NameID).
    pub subject: String,

    /// Whether the validator considers the subject authenticated.
    pub authenticated: bool,

    /// Validation error messages, in the order the validator reported them.
    /// Empty when authentication succeeded.
    pub errors: Vec<String>,

    /// Attribute name to asserted values, in assertion order.  An absent or
    /// empty entry means the attribute was not asserted.
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl Assertion {
    /// All values asserted for `name`; `None` when the attribute was not
    /// asserted (including a present-but-empty value list).
    pub fn attribute_values(&self, name: &str) -> Option<&[String]> {
        match self.attributes.get(name) {
            Some(values) if !values.is_empty() => Some(values),
            _ => None,
        }
    }

    /// The first asserted value for `name`.  Where a single value is
    /// expected but several were asserted, first-in-assertion-order wins;
    /// that is a defined tie-break, not an error.
    pub fn first_attribute_value(&self, name: &str) -> Option<&str> {
        self.attribute_values(name).map(|values| values[0].as_str())
    }
}

/// The identity handed to the host's authentication context after a
/// successful callback.  The core does not retain it.
#[derive(Clone, Debug, PartialEq)]
pub struct UserIdentity {
    /// Unique login key.
    pub login: String,
    /// Login as known to the identity provider.  Equal to `login` here.
    pub provider_login: String,
    /// Display name.
    pub name: String,
    pub email: Option<String>,
    /// Group memberships.  `None` when no group binding is configured (no
    /// lookup was attempted at all); otherwise the deduplicated set of
    /// asserted values, possibly empty.
    pub groups: Option<BTreeSet<String>>,
}

/// Convert a validated assertion into a [`UserIdentity`] using the
/// configured attribute bindings.
///
/// Login and display name are mandatory: a binding that yields no value
/// fails with a missing-attribute error and no identity is produced.  Email
/// and group are looked up only when their bindings are configured.
pub fn map_user_identity(
    bindings: &AttributeBindings,
    assertion: &Assertion,
) -> Result<UserIdentity, Error> {
    let login = assertion
        .first_attribute_value(&bindings.login)
        .ok_or_else(|| Error::missing_attribute("login"))?
        .to_owned();

    let name = assertion
        .first_attribute_value(&bindings.name)
        .ok_or_else(|| Error::missing_attribute("name"))?
        .to_owned();

    let email = bindings
        .email
        .as_deref()
        .and_then(|attribute| assertion.first_attribute_value(attribute))
        .map(str::to_owned);

    let groups = bindings.group.as_deref().map(|attribute| {
        assertion
            .attribute_values(attribute)
            .map(|values| values.iter().cloned().collect::<BTreeSet<_>>())
            .unwrap_or_default()
    });

    Ok(UserIdentity {
        provider_login: login.clone(),
        login,
        name,
        email,
        groups,
    })
}
