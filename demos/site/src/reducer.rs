//! Site reducer
//!
//! Lifecycle events are routed by tag: the request and terminal phases drive
//! the shared bookkeeping (`pending`, `last_error`), and each intent's success
//! value lands in its own slice of [`SiteState`].

use crate::environment::SiteEnvironment;
use crate::types::{Form, Session, SiteAction, SiteState};
use gophr_core::{
    effect::Effect, intent, reducer::Reducer, smallvec, ActionDescriptor, EventPayload, Intent, LifecycleEvent,
    SmallVec,
};
use serde_json::Value;

/// Descriptor fetching `name`, skipped when the package is already loaded
#[must_use]
pub fn fetch_package(name: impl Into<String>) -> ActionDescriptor<SiteState> {
    let name = name.into();
    intent::get_package(name.clone()).with_cache(move |state: &SiteState| state.has_package(&name))
}

/// Reducer for [`SiteState`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SiteReducer;

impl SiteReducer {
    /// Create a new reducer
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn apply_event(state: &mut SiteState, event: LifecycleEvent, env: &SiteEnvironment) {
        let Some(intent) = Intent::for_tag(&event.action_type) else {
            tracing::trace!(action_type = %event.action_type, "Ignoring event with unknown tag");
            return;
        };

        match event.payload {
            EventPayload::Request(_) => {
                state.pending += 1;
            },
            EventPayload::Failure(error) => {
                state.pending = state.pending.saturating_sub(1);
                tracing::debug!(resource = %event.meta.resource, %error, "API call failed");
                state.last_error.insert(event.meta.resource, error.to_string());
            },
            EventPayload::Success(value) => {
                state.pending = state.pending.saturating_sub(1);
                state.last_error.remove(&event.meta.resource);
                state.last_updated = Some(env.clock().now());
                Self::apply_success(state, intent, value);
            },
        }
    }

    fn apply_success(state: &mut SiteState, intent: Intent, value: Value) {
        match intent {
            Intent::GetPackage => {
                if let Some(name) = value.get("name").and_then(Value::as_str).map(str::to_string) {
                    state.packages.insert(name, value);
                }
            },
            Intent::GetPackages => state.search_results = into_list(value),
            Intent::Register | Intent::Login => {
                state.session = session_from(&value);
                state.validated_forms.remove(&form_for(intent));
            },
            Intent::SetPassword | Intent::SetEmail => {
                if let (Some(profile), Value::Object(fields)) = (state.profile.as_mut(), &value) {
                    if let Some(target) = profile.as_object_mut() {
                        target.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                    }
                }
                state.validated_forms.remove(&form_for(intent));
            },
            Intent::UpdateProfile => {
                state.profile = Some(value);
                state.validated_forms.remove(&Form::Profile);
            },
            Intent::GetProfile => state.profile = Some(value),
            Intent::GetSubscriptions => state.subscriptions = into_list(value),
            Intent::GetTokens => state.tokens = into_list(value),
        }
    }
}

impl Reducer for SiteReducer {
    type State = SiteState;
    type Action = SiteAction;
    type Environment = SiteEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            SiteAction::Lifecycle(event) => Self::apply_event(state, event, env),
            SiteAction::Logout => {
                state.session = None;
                state.tokens.clear();
                state.subscriptions.clear();
                state.validated_forms.clear();
            },
            SiteAction::ValidateForm(form) => {
                state.validated_forms.insert(form);
            },
        }

        smallvec![Effect::None]
    }
}

fn form_for(intent: Intent) -> Form {
    match intent {
        Intent::Register => Form::Register,
        Intent::Login => Form::Login,
        Intent::SetPassword => Form::Password,
        Intent::SetEmail => Form::Email,
        _ => Form::Profile,
    }
}

fn session_from(value: &Value) -> Option<Session> {
    let token = value.get("token").and_then(Value::as_str)?;
    let user = value
        .get("user")
        .and_then(|user| user.as_str().or_else(|| user.get("name").and_then(Value::as_str)))
        .map(str::to_string);
    Some(Session {
        token: token.to_string(),
        user,
    })
}

/// Lists arrive either bare or wrapped in `{ "items": [...] }`
fn into_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut fields) => match fields.remove("items") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        Value::Null => Vec::new(),
        other => vec![other],
    }
}
