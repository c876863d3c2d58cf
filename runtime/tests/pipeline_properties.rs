//! Pipeline behaviour through the Given-When-Then harness, plus properties
//! over arbitrary descriptors.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use gophr_core::{intent, Dispatch, EventPayload, Intent, Phase, Resource, TagRegistry, TransportError};
use gophr_runtime::{DispatchError, DispatchPipeline, Intercepted};
use gophr_testing::properties::arb_descriptor;
use gophr_testing::{test_clock, MockTransport, Observed, PipelineTest, Probe};
use proptest::prelude::*;
use serde_json::json;

fn pipeline(transport: &MockTransport) -> DispatchPipeline {
    DispatchPipeline::new()
        .with_transport(transport.clone())
        .with_clock(test_clock())
        .with_registry(TagRegistry::from_intents(&Intent::ALL).unwrap())
}

#[tokio::test]
async fn flight_calls_the_transport_only_when_polled() {
    let transport = MockTransport::new();
    let gate = transport.gate(Resource::TOKENS);
    let mut emitted = Vec::new();

    let dispatch: Dispatch<(), Probe> = intent::get_tokens().into();
    let intercepted = pipeline(&transport)
        .intercept(dispatch, &(), |action| emitted.push(action))
        .unwrap();
    let Intercepted::Requested { flight, .. } = intercepted else {
        panic!("expected a request");
    };
    assert_eq!(emitted.len(), 1);
    assert_eq!(transport.call_count(), 0);

    let mut flight = tokio_test::task::spawn(flight);
    tokio_test::assert_pending!(flight.poll());
    assert_eq!(transport.call_count(), 1);

    gate.resolve(json!([{ "id": "t1" }]));
    assert!(flight.is_woken());
    let terminal = tokio_test::assert_ready!(flight.poll());
    match terminal {
        Some(Probe::Event(event)) => {
            assert!(event.is("GET_TOKENS_SUCCESS"));
            assert_eq!(event.success(), Some(&json!([{ "id": "t1" }])));
        },
        other => panic!("expected the success event, got {other:?}"),
    }
}

#[tokio::test]
async fn login_success_carries_the_transport_value() {
    let transport = MockTransport::new();
    transport.succeed(Resource::LOGIN, json!({ "token": "abc" }));

    PipelineTest::new(pipeline(&transport))
        .given_state(())
        .when_dispatched(intent::login(json!({ "email": "a@b.c", "password": "pw" })))
        .then_outcome(|o| assert_eq!(*o, Observed::Requested))
        .then_types(&["LOGIN_REQUEST", "LOGIN_SUCCESS"])
        .then_events(|events| {
            assert_eq!(events[1].success(), Some(&json!({ "token": "abc" })));
            assert_eq!(events[0].meta.dispatch_id, events[1].meta.dispatch_id);
        })
        .run()
        .await;

    assert_eq!(transport.calls()[0].payload["email"], "a@b.c");
}

#[tokio::test]
async fn register_failure_uses_its_own_tags() {
    let transport = MockTransport::new();
    transport.fail(
        Resource::REGISTER,
        TransportError::Status { status: 422, message: "email taken".into() },
    );

    PipelineTest::new(pipeline(&transport))
        .given_state(())
        .when_dispatched(intent::register(json!({ "email": "a@b.c" })))
        .then_types(&["REGISTER_REQUEST", "REGISTER_FAILURE"])
        .then_events(|events| {
            assert!(matches!(
                events[1].payload,
                EventPayload::Failure(TransportError::Status { status: 422, .. })
            ));
        })
        .run()
        .await;
}

#[tokio::test]
async fn plain_actions_are_forwarded_unchanged() {
    let transport = MockTransport::new();

    PipelineTest::new(pipeline(&transport))
        .given_state(())
        .when_dispatched(Dispatch::Action(Probe::Plain(json!({ "type": "LOGOUT" }))))
        .then_outcome(|o| assert_eq!(*o, Observed::Forwarded))
        .then_forwarded(|actions| assert_eq!(actions, [json!({ "type": "LOGOUT" })]))
        .then_events(|events| assert!(events.is_empty()))
        .run()
        .await;

    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn short_triple_is_a_configuration_error() {
    PipelineTest::<()>::new(pipeline(&MockTransport::new()))
        .given_state(())
        .when_json(json!({ "types": ["ONLY_ONE"], "resource": "package", "method": "get" }))
        .then_outcome(|o| assert!(matches!(o, Observed::Rejected(DispatchError::Descriptor(_)))))
        .then_events(|events| assert!(events.is_empty()))
        .run()
        .await;
}

#[tokio::test]
async fn cached_profile_is_not_refetched() {
    let transport = MockTransport::new();

    PipelineTest::new(pipeline(&transport))
        .given_state(Some("gopher".to_string()))
        .when_dispatched(
            intent::get_profile("gopher").with_cache(|profile: &Option<String>| profile.as_deref() == Some("gopher")),
        )
        .then_outcome(|o| assert_eq!(*o, Observed::Satisfied))
        .then_events(|events| assert!(events.is_empty()))
        .run()
        .await;

    assert_eq!(transport.call_count(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn every_uncached_call_emits_request_then_one_terminal(
        descriptor in arb_descriptor::<()>(),
        succeed in any::<bool>(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let transport = MockTransport::new();
        if succeed {
            transport.succeed(descriptor.resource().clone(), json!({ "ok": true }));
        } else {
            transport.fail(descriptor.resource().clone(), TransportError::Network("reset".into()));
        }
        let pipeline = DispatchPipeline::new().with_transport(transport.clone()).with_clock(test_clock());
        let types = descriptor.types().clone();

        let phases = runtime.block_on(async {
            let mut events: Vec<Probe> = Vec::new();
            let outcome = pipeline
                .intercept(Dispatch::Call(descriptor), &(), |e| events.push(e))
                .unwrap();
            if let gophr_runtime::Intercepted::Requested { flight, .. } = outcome {
                events.extend(flight.await);
            }
            events
                .into_iter()
                .map(|p| match p {
                    Probe::Event(e) => (e.phase(), e.action_type),
                    Probe::Plain(_) => panic!("no plain actions expected"),
                })
                .collect::<Vec<_>>()
        });

        prop_assert_eq!(phases.len(), 2);
        prop_assert_eq!(phases[0].0, Phase::Request);
        prop_assert_eq!(&phases[0].1, types.request());
        let (phase, tag) = &phases[1];
        if succeed {
            prop_assert_eq!(*phase, Phase::Success);
            prop_assert_eq!(tag, types.success());
        } else {
            prop_assert_eq!(*phase, Phase::Failure);
            prop_assert_eq!(tag, types.failure());
        }
        prop_assert_eq!(transport.call_count(), 1);
    }
}
