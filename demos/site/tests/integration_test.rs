//! Integration tests for the site reducer behind a Store
//!
//! The transport is scripted, so these run the real pipeline and reducer
//! without a network.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use gophr_core::{intent, Dispatch, Intent, Resource, TagRegistry, TransportError};
use gophr_runtime::{DispatchOutcome, DispatchPipeline, Store};
use gophr_site::{fetch_package, Form, SiteAction, SiteEnvironment, SiteReducer, SiteState};
use gophr_testing::{assertions, test_clock, MockTransport, ReducerTest};
use serde_json::json;
use std::time::Duration;

type SiteStore = Store<SiteState, SiteAction, SiteEnvironment, SiteReducer>;

fn store(transport: &MockTransport) -> SiteStore {
    let pipeline = DispatchPipeline::new()
        .with_transport(transport.clone())
        .with_clock(test_clock())
        .with_registry(TagRegistry::from_intents(&Intent::ALL).unwrap());
    Store::with_pipeline(
        SiteState::default(),
        SiteReducer::new(),
        SiteEnvironment::new(test_clock()),
        pipeline,
    )
}

async fn settle(store: &SiteStore, value: Dispatch<SiteState, SiteAction>) -> DispatchOutcome {
    let mut receipt = store.dispatch(value).await.unwrap();
    receipt.handle.wait_with_timeout(Duration::from_secs(5)).await.unwrap();
    receipt.outcome
}

#[tokio::test]
async fn package_is_loaded_then_served_from_cache() {
    let transport = MockTransport::new();
    transport.succeed(Resource::PACKAGE, json!({ "id": 7, "name": "gorilla/mux" }));
    let store = store(&transport);

    let first = settle(&store, fetch_package("gorilla/mux").into()).await;
    assert!(matches!(first, DispatchOutcome::Requested(_)));

    let second = settle(&store, fetch_package("gorilla/mux").into()).await;
    assert_eq!(second, DispatchOutcome::Satisfied);
    assert_eq!(transport.calls_to(&Resource::PACKAGE).len(), 1);

    let (id, pending, updated) = store
        .state(|s| (s.packages["gorilla/mux"]["id"].clone(), s.pending, s.last_updated))
        .await;
    assert_eq!(id, 7);
    assert_eq!(pending, 0);
    assert_eq!(updated, Some(test_clock_now()));
}

#[tokio::test]
async fn different_package_is_not_a_cache_hit() {
    let transport = MockTransport::new();
    transport
        .succeed(Resource::PACKAGE, json!({ "name": "a" }))
        .succeed(Resource::PACKAGE, json!({ "name": "b" }));
    let store = store(&transport);

    settle(&store, fetch_package("a").into()).await;
    let outcome = settle(&store, fetch_package("b").into()).await;

    assert!(matches!(outcome, DispatchOutcome::Requested(_)));
    assert_eq!(store.state(|s| s.packages.len()).await, 2);
}

#[tokio::test]
async fn failed_search_records_error_and_keeps_results() {
    let transport = MockTransport::new();
    transport
        .succeed(Resource::PACKAGES, json!([{ "name": "mux" }, { "name": "chi" }]))
        .fail(Resource::PACKAGES, TransportError::RateLimited);
    let store = store(&transport);

    settle(&store, intent::get_packages(json!({ "q": "router" })).into()).await;
    settle(&store, intent::get_packages(json!({ "q": "router" })).into()).await;

    let (results, error) = store
        .state(|s| (s.search_results.len(), s.last_error.get(&Resource::PACKAGES).cloned()))
        .await;
    assert_eq!(results, 2);
    assert!(error.is_some());
}

#[tokio::test]
async fn login_then_logout() {
    let transport = MockTransport::new();
    transport
        .succeed(Resource::LOGIN, json!({ "token": "abc", "user": { "name": "gopher" } }))
        .succeed(Resource::TOKENS, json!({ "items": [{ "id": "t1" }] }));
    let store = store(&transport);

    store.send(SiteAction::ValidateForm(Form::Login)).await.unwrap();
    settle(&store, intent::login(json!({ "email": "g@go.dev", "password": "pw" })).into()).await;
    settle(&store, intent::get_tokens().into()).await;

    let (user, tokens, login_form) = store
        .state(|s| {
            (
                s.session.as_ref().and_then(|session| session.user.clone()),
                s.tokens.len(),
                s.validated_forms.contains(&Form::Login),
            )
        })
        .await;
    assert_eq!(user.as_deref(), Some("gopher"));
    assert_eq!(tokens, 1);
    assert!(!login_form);

    // Logout is an ordinary action: no API call
    let outcome = settle(&store, Dispatch::Action(SiteAction::Logout)).await;
    assert_eq!(outcome, DispatchOutcome::Forwarded);
    assert!(store.state(|s| s.session.is_none() && s.tokens.is_empty()).await);
    assert_eq!(transport.call_count(), 2);
}

#[test]
fn validate_form_sets_flag() {
    ReducerTest::new(SiteReducer::new())
        .with_env(SiteEnvironment::new(test_clock()))
        .given_state(SiteState::default())
        .when_action(SiteAction::ValidateForm(Form::Register))
        .then_state(|state| assert!(state.validated_forms.contains(&Form::Register)))
        .then_effects(assertions::assert_no_effects)
        .run();
}

fn test_clock_now() -> chrono::DateTime<chrono::Utc> {
    use gophr_core::environment::Clock;
    test_clock().now()
}
