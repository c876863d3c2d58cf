//! Lifecycle tags
//!
//! Every API call is observed through three tags in the process-wide action
//! namespace: one for the request, one for success and one for failure.
//! [`LifecycleTypes`] can only be built through validating constructors, so a
//! value of that type always carries three distinct, non-empty tags.

use crate::descriptor::DescriptorError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;

/// A tag in the action-type namespace (e.g. `GET_PACKAGE_REQUEST`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionType(Cow<'static, str>);

impl ActionType {
    /// Tag from a static string, usable in constants
    #[must_use]
    pub const fn from_static(tag: &'static str) -> Self {
        Self(Cow::Borrowed(tag))
    }

    /// Tag from an owned or borrowed string
    #[must_use]
    pub fn new(tag: impl Into<Cow<'static, str>>) -> Self {
        Self(tag.into())
    }

    /// The tag as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for ActionType {
    fn from(tag: &'static str) -> Self {
        Self::from_static(tag)
    }
}

impl From<String> for ActionType {
    fn from(tag: String) -> Self {
        Self(Cow::Owned(tag))
    }
}

impl PartialEq<str> for ActionType {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for ActionType {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// Phase of a call's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Emitted synchronously before the transport is invoked
    Request,
    /// Terminal: the transport resolved
    Success,
    /// Terminal: the transport rejected
    Failure,
}

impl Phase {
    /// Whether this phase ends a lifecycle
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

/// Ordered triple of distinct tags `(request, success, failure)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LifecycleTypes {
    request: ActionType,
    success: ActionType,
    failure: ActionType,
}

impl LifecycleTypes {
    /// Build a triple, rejecting empty or repeated tags
    ///
    /// # Errors
    ///
    /// - [`DescriptorError::EmptyTag`] if any tag is empty
    /// - [`DescriptorError::DuplicateTag`] if two tags are equal
    pub fn new(
        request: impl Into<ActionType>,
        success: impl Into<ActionType>,
        failure: impl Into<ActionType>,
    ) -> Result<Self, DescriptorError> {
        let tags = [request.into(), success.into(), failure.into()];

        for (index, tag) in tags.iter().enumerate() {
            if tag.as_str().is_empty() {
                return Err(DescriptorError::EmptyTag { index });
            }
        }
        for (i, tag) in tags.iter().enumerate() {
            if tags[i + 1..].contains(tag) {
                return Err(DescriptorError::DuplicateTag { tag: tag.to_string() });
            }
        }

        let [request, success, failure] = tags;
        Ok(Self {
            request,
            success,
            failure,
        })
    }

    /// Triple for compile-time tables whose tags are known to be valid.
    ///
    /// Used by [`Intent`](crate::intent::Intent); uniqueness of those tables is
    /// covered by the registry tests.
    pub(crate) const fn from_static(
        request: &'static str,
        success: &'static str,
        failure: &'static str,
    ) -> Self {
        Self {
            request: ActionType::from_static(request),
            success: ActionType::from_static(success),
            failure: ActionType::from_static(failure),
        }
    }

    /// Validate a dynamically shaped `types` field
    ///
    /// Accepts only an array of exactly three distinct, non-empty strings.
    ///
    /// # Errors
    ///
    /// - [`DescriptorError::NotAnArray`] if `value` is not an array
    /// - [`DescriptorError::WrongArity`] unless it has three entries
    /// - [`DescriptorError::NotAString`] for a non-string entry
    /// - [`DescriptorError::EmptyTag`] / [`DescriptorError::DuplicateTag`] as in [`LifecycleTypes::new`]
    pub fn from_json(value: &Value) -> Result<Self, DescriptorError> {
        let Value::Array(entries) = value else {
            return Err(DescriptorError::NotAnArray);
        };
        if entries.len() != 3 {
            return Err(DescriptorError::WrongArity {
                found: entries.len(),
            });
        }

        let mut tags = Vec::with_capacity(3);
        for (index, entry) in entries.iter().enumerate() {
            match entry {
                Value::String(tag) => tags.push(ActionType::from(tag.clone())),
                _ => return Err(DescriptorError::NotAString { index }),
            }
        }

        let mut tags = tags.into_iter();
        match (tags.next(), tags.next(), tags.next()) {
            (Some(request), Some(success), Some(failure)) => Self::new(request, success, failure),
            _ => Err(DescriptorError::WrongArity { found: entries.len() }),
        }
    }

    /// The request tag
    #[must_use]
    pub const fn request(&self) -> &ActionType {
        &self.request
    }

    /// The success tag
    #[must_use]
    pub const fn success(&self) -> &ActionType {
        &self.success
    }

    /// The failure tag
    #[must_use]
    pub const fn failure(&self) -> &ActionType {
        &self.failure
    }

    /// The tag emitted for `phase`
    #[must_use]
    pub const fn tag(&self, phase: Phase) -> &ActionType {
        match phase {
            Phase::Request => &self.request,
            Phase::Success => &self.success,
            Phase::Failure => &self.failure,
        }
    }

    /// Which phase `tag` belongs to, if any
    #[must_use]
    pub fn phase_of(&self, tag: &ActionType) -> Option<Phase> {
        [Phase::Request, Phase::Success, Phase::Failure]
            .into_iter()
            .find(|phase| self.tag(*phase) == tag)
    }

    /// All three tags in order
    pub fn iter(&self) -> impl Iterator<Item = &ActionType> {
        [&self.request, &self.success, &self.failure].into_iter()
    }
}

impl<'de> Deserialize<'de> for LifecycleTypes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn valid_triple_keeps_order() {
        let types = LifecycleTypes::new("REQ", "OK", "ERR").unwrap();
        assert_eq!(types.request(), &"REQ");
        assert_eq!(types.success(), &"OK");
        assert_eq!(types.failure(), &"ERR");
        assert_eq!(types.phase_of(&ActionType::from("OK")), Some(Phase::Success));
        assert_eq!(types.phase_of(&ActionType::from("OTHER")), None);
    }

    #[test]
    fn duplicate_tags_are_rejected() {
        let err = LifecycleTypes::new("REQ", "REQ", "ERR").unwrap_err();
        assert_eq!(err, DescriptorError::DuplicateTag { tag: "REQ".into() });

        let err = LifecycleTypes::new("REQ", "OK", "OK").unwrap_err();
        assert_eq!(err, DescriptorError::DuplicateTag { tag: "OK".into() });
    }

    #[test]
    fn empty_tag_is_rejected() {
        let err = LifecycleTypes::new("REQ", "", "ERR").unwrap_err();
        assert_eq!(err, DescriptorError::EmptyTag { index: 1 });
    }

    #[test]
    fn json_shape_is_checked() {
        assert_eq!(
            LifecycleTypes::from_json(&json!("REQ")).unwrap_err(),
            DescriptorError::NotAnArray
        );
        assert_eq!(
            LifecycleTypes::from_json(&json!(["REQ", "OK"])).unwrap_err(),
            DescriptorError::WrongArity { found: 2 }
        );
        assert_eq!(
            LifecycleTypes::from_json(&json!(["REQ", "OK", "ERR", "MORE"])).unwrap_err(),
            DescriptorError::WrongArity { found: 4 }
        );
        assert_eq!(
            LifecycleTypes::from_json(&json!(["REQ", 2, "ERR"])).unwrap_err(),
            DescriptorError::NotAString { index: 1 }
        );
        assert_eq!(
            LifecycleTypes::from_json(&json!(["REQ", "ERR", "ERR"])).unwrap_err(),
            DescriptorError::DuplicateTag { tag: "ERR".into() }
        );
    }

    #[test]
    fn deserialize_goes_through_validation() {
        let ok: LifecycleTypes = serde_json::from_value(json!(["A", "B", "C"])).unwrap();
        assert_eq!(ok.tag(Phase::Failure), &"C");

        let err = serde_json::from_value::<LifecycleTypes>(json!(["A", "A", "C"]));
        assert!(err.is_err());
    }

    proptest! {
        #[test]
        fn distinct_non_empty_tags_always_build(
            tags in proptest::collection::hash_set("[A-Z_]{1,12}", 3)
        ) {
            let tags: Vec<String> = tags.into_iter().collect();
            let types = LifecycleTypes::new(tags[0].clone(), tags[1].clone(), tags[2].clone());
            prop_assert!(types.is_ok());
        }

        #[test]
        fn any_repeated_tag_is_rejected(tag in "[A-Z_]{1,12}", other in "[a-z]{1,12}") {
            prop_assert!(LifecycleTypes::new(tag.clone(), other.clone(), tag.clone()).is_err());
            prop_assert!(LifecycleTypes::new(other.clone(), tag.clone(), tag.clone()).is_err());
        }

        #[test]
        fn arrays_of_other_lengths_are_rejected(len in 0_usize..8) {
            prop_assume!(len != 3);
            let value = Value::Array((0..len).map(|i| json!(format!("T{i}"))).collect());
            prop_assert_eq!(
                LifecycleTypes::from_json(&value).unwrap_err(),
                DescriptorError::WrongArity { found: len }
            );
        }
    }
}
