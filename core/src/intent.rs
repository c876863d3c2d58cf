//! Intents registry
//!
//! The full surface of API calls the site can make, as a closed set.
//! Each [`Intent`] fixes its lifecycle tags, resource and method; the free
//! functions in this module are the builders call sites use.
//!
//! Builders never validate the namespace. [`TagRegistry`] does, and the
//! pipeline consults it when one is configured.

use crate::descriptor::{ActionDescriptor, DescriptorError, Method, Resource};
use crate::lifecycle::{ActionType, LifecycleTypes};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Every API call the site knows how to make
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    /// Fetch one package by name
    GetPackage,
    /// Search packages
    GetPackages,
    /// Create an account
    Register,
    /// Sign in
    Login,
    /// Change the account password
    SetPassword,
    /// Change the account email
    SetEmail,
    /// Update the account profile
    UpdateProfile,
    /// Fetch a profile by name
    GetProfile,
    /// List package subscriptions
    GetSubscriptions,
    /// List API tokens
    GetTokens,
}

impl Intent {
    /// All intents, in declaration order
    pub const ALL: [Self; 10] = [
        Self::GetPackage,
        Self::GetPackages,
        Self::Register,
        Self::Login,
        Self::SetPassword,
        Self::SetEmail,
        Self::UpdateProfile,
        Self::GetProfile,
        Self::GetSubscriptions,
        Self::GetTokens,
    ];

    /// The lifecycle tags this intent emits
    #[must_use]
    pub const fn types(self) -> LifecycleTypes {
        match self {
            Self::GetPackage => {
                LifecycleTypes::from_static("GET_PACKAGE_REQUEST", "GET_PACKAGE_SUCCESS", "GET_PACKAGE_FAILURE")
            },
            Self::GetPackages => LifecycleTypes::from_static(
                "GET_PACKAGES_REQUEST",
                "GET_PACKAGES_SUCCESS",
                "GET_PACKAGES_FAILURE",
            ),
            Self::Register => {
                LifecycleTypes::from_static("REGISTER_REQUEST", "REGISTER_SUCCESS", "REGISTER_FAILURE")
            },
            Self::Login => LifecycleTypes::from_static("LOGIN_REQUEST", "LOGIN_SUCCESS", "LOGIN_FAILURE"),
            Self::SetPassword => LifecycleTypes::from_static(
                "SET_PASSWORD_REQUEST",
                "SET_PASSWORD_SUCCESS",
                "SET_PASSWORD_FAILURE",
            ),
            Self::SetEmail => {
                LifecycleTypes::from_static("SET_EMAIL_REQUEST", "SET_EMAIL_SUCCESS", "SET_EMAIL_FAILURE")
            },
            Self::UpdateProfile => LifecycleTypes::from_static(
                "UPDATE_PROFILE_REQUEST",
                "UPDATE_PROFILE_SUCCESS",
                "UPDATE_PROFILE_FAILURE",
            ),
            Self::GetProfile => {
                LifecycleTypes::from_static("GET_PROFILE_REQUEST", "GET_PROFILE_SUCCESS", "GET_PROFILE_FAILURE")
            },
            Self::GetSubscriptions => LifecycleTypes::from_static(
                "GET_SUBSCRIPTIONS_REQUEST",
                "GET_SUBSCRIPTIONS_SUCCESS",
                "GET_SUBSCRIPTIONS_FAILURE",
            ),
            Self::GetTokens => {
                LifecycleTypes::from_static("GET_TOKENS_REQUEST", "GET_TOKENS_SUCCESS", "GET_TOKENS_FAILURE")
            },
        }
    }

    /// The resource this intent acts on
    #[must_use]
    pub const fn resource(self) -> Resource {
        match self {
            Self::GetPackage => Resource::PACKAGE,
            Self::GetPackages => Resource::PACKAGES,
            Self::Register => Resource::REGISTER,
            Self::Login => Resource::LOGIN,
            Self::SetPassword => Resource::PASSWORD,
            Self::SetEmail => Resource::EMAIL,
            Self::UpdateProfile | Self::GetProfile => Resource::PROFILE,
            Self::GetSubscriptions => Resource::SUBSCRIPTION,
            Self::GetTokens => Resource::TOKENS,
        }
    }

    /// The method this intent uses
    #[must_use]
    pub const fn method(self) -> Method {
        match self {
            Self::GetPackage
            | Self::GetPackages
            | Self::GetProfile
            | Self::GetSubscriptions
            | Self::GetTokens => Method::Get,
            Self::Register | Self::Login | Self::SetPassword | Self::SetEmail | Self::UpdateProfile => {
                Method::Post
            },
        }
    }

    /// Descriptor for this intent carrying `payload`
    #[must_use]
    pub fn descriptor<S>(self, payload: Value) -> ActionDescriptor<S> {
        ActionDescriptor::new(self.types(), self.resource(), self.method()).with_payload(payload)
    }

    /// The intent owning `tag`, if any
    #[must_use]
    pub fn for_tag(tag: &ActionType) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|intent| intent.types().phase_of(tag).is_some())
    }
}

/// Serialize a caller payload; construction must stay total, so a payload
/// that cannot be represented as JSON becomes empty.
fn to_payload(payload: impl Serialize) -> Value {
    serde_json::to_value(payload).unwrap_or(Value::Null)
}

/// Fetch one package by name
#[must_use]
pub fn get_package<S>(name: impl Into<String>) -> ActionDescriptor<S> {
    Intent::GetPackage.descriptor(json!({ "name": name.into() }))
}

/// Search packages with a caller-defined query
#[must_use]
pub fn get_packages<S>(query: impl Serialize) -> ActionDescriptor<S> {
    Intent::GetPackages.descriptor(to_payload(query))
}

/// Create an account
#[must_use]
pub fn register<S>(account: impl Serialize) -> ActionDescriptor<S> {
    Intent::Register.descriptor(to_payload(account))
}

/// Sign in
#[must_use]
pub fn login<S>(credentials: impl Serialize) -> ActionDescriptor<S> {
    Intent::Login.descriptor(to_payload(credentials))
}

/// Change the account password
#[must_use]
pub fn set_password<S>(password: impl Serialize) -> ActionDescriptor<S> {
    Intent::SetPassword.descriptor(to_payload(password))
}

/// Change the account email
#[must_use]
pub fn set_email<S>(email: impl Serialize) -> ActionDescriptor<S> {
    Intent::SetEmail.descriptor(to_payload(email))
}

/// Update the account profile
#[must_use]
pub fn update_profile<S>(profile: impl Serialize) -> ActionDescriptor<S> {
    Intent::UpdateProfile.descriptor(to_payload(profile))
}

/// Fetch a profile by name
#[must_use]
pub fn get_profile<S>(name: impl Into<String>) -> ActionDescriptor<S> {
    Intent::GetProfile.descriptor(Value::String(name.into()))
}

/// List package subscriptions
#[must_use]
pub fn get_subscriptions<S>(query: impl Serialize) -> ActionDescriptor<S> {
    Intent::GetSubscriptions.descriptor(to_payload(query))
}

/// List API tokens
#[must_use]
pub fn get_tokens<S>() -> ActionDescriptor<S> {
    Intent::GetTokens.descriptor(Value::Null)
}

/// Ownership of lifecycle tags by resource
///
/// A tag belongs to exactly one resource. Reusing it for another resource is a
/// configuration error.
#[derive(Debug, Clone, Default)]
pub struct TagRegistry {
    owners: HashMap<ActionType, Resource>,
}

impl TagRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry of every tag used by `intents`
    ///
    /// # Errors
    ///
    /// [`DescriptorError::TagCollision`] if two intents on different resources share a tag.
    pub fn from_intents(intents: &[Intent]) -> Result<Self, DescriptorError> {
        let mut registry = Self::new();
        for intent in intents {
            registry.register(&intent.types(), &intent.resource())?;
        }
        Ok(registry)
    }

    /// Record that `resource` owns every tag in `types`
    ///
    /// # Errors
    ///
    /// [`DescriptorError::TagCollision`] if a tag is already owned by another resource.
    pub fn register(&mut self, types: &LifecycleTypes, resource: &Resource) -> Result<(), DescriptorError> {
        self.check_types(types, resource)?;
        for tag in types.iter() {
            self.owners.insert(tag.clone(), resource.clone());
        }
        Ok(())
    }

    /// Check a descriptor against the registered owners
    ///
    /// Tags that were never registered are accepted.
    ///
    /// # Errors
    ///
    /// [`DescriptorError::TagCollision`] if one of its tags belongs to another resource.
    pub fn check<S>(&self, descriptor: &ActionDescriptor<S>) -> Result<(), DescriptorError> {
        self.check_types(descriptor.types(), descriptor.resource())
    }

    fn check_types(&self, types: &LifecycleTypes, resource: &Resource) -> Result<(), DescriptorError> {
        for tag in types.iter() {
            if let Some(owner) = self.owners.get(tag) {
                if owner != resource {
                    return Err(DescriptorError::TagCollision {
                        tag: tag.to_string(),
                        first: owner.to_string(),
                        second: resource.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Resource owning `tag`
    #[must_use]
    pub fn owner(&self, tag: &ActionType) -> Option<&Resource> {
        self.owners.get(tag)
    }

    /// Number of registered tags
    #[must_use]
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Whether nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::lifecycle::Phase;

    #[test]
    fn every_intent_has_a_valid_triple() {
        for intent in Intent::ALL {
            let types = intent.types();
            let rebuilt = LifecycleTypes::new(
                types.request().clone(),
                types.success().clone(),
                types.failure().clone(),
            );
            assert_eq!(rebuilt.unwrap(), types, "{intent:?}");
        }
    }

    #[test]
    fn intent_tags_never_collide() {
        let registry = TagRegistry::from_intents(&Intent::ALL).unwrap();
        assert_eq!(registry.len(), Intent::ALL.len() * 3);
    }

    #[test]
    fn shared_tags_across_resources_are_rejected() {
        let mut registry = TagRegistry::from_intents(&[Intent::Login]).unwrap();
        let reused = LifecycleTypes::new("LOGIN_REQUEST", "REGISTER_SUCCESS", "REGISTER_FAILURE").unwrap();

        let err = registry.register(&reused, &Resource::REGISTER).unwrap_err();
        assert_eq!(
            err,
            DescriptorError::TagCollision {
                tag: "LOGIN_REQUEST".into(),
                first: "login".into(),
                second: "register".into(),
            }
        );
    }

    #[test]
    fn profile_intents_share_a_resource_without_sharing_tags() {
        let registry = TagRegistry::from_intents(&[Intent::GetProfile, Intent::UpdateProfile]).unwrap();
        let descriptor: ActionDescriptor<()> = update_profile(json!({ "bio": "hi" }));
        assert!(registry.check(&descriptor).is_ok());
    }

    #[test]
    fn builders_are_total_and_fixed() {
        let package: ActionDescriptor<()> = get_package("foo");
        assert_eq!(package.payload(), &json!({ "name": "foo" }));
        assert_eq!(package.method(), Method::Get);

        let login: ActionDescriptor<()> = login(json!({ "user": "a", "password": "b" }));
        assert_eq!(login.resource(), &Resource::LOGIN);
        assert_eq!(login.method(), Method::Post);

        let tokens: ActionDescriptor<()> = get_tokens();
        assert_eq!(tokens.payload(), &Value::Null);
        assert_eq!(tokens.types().tag(Phase::Failure), &"GET_TOKENS_FAILURE");

        let profile: ActionDescriptor<()> = get_profile("alice");
        assert_eq!(profile.payload(), &json!("alice"));
    }

    #[test]
    fn tags_map_back_to_their_intent() {
        let tag = ActionType::from("SET_EMAIL_SUCCESS");
        assert_eq!(Intent::for_tag(&tag), Some(Intent::SetEmail));
        assert_eq!(Intent::for_tag(&ActionType::from("LOGOUT")), None);
    }
}
