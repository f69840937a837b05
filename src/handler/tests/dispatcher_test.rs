use super::{webhook_body, RecordingControl};
use crate::{
    call::{CallRegistry, CallState, DepartmentTable},
    control::{CallControl, CommandError, CommandResult},
    event::WebhookEvent,
    handler::{DispatchError, Dispatcher, Outcome},
};
use async_trait::async_trait;
use mockall::mock;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};

mock! {
    pub Control {}

    #[async_trait]
    impl CallControl for Control {
        async fn answer(&self, call_control_id: &str) -> CommandResult;
        async fn transfer(&self, call_control_id: &str, destination: &str) -> CommandResult;
        async fn start_menu(&self, call_control_id: &str) -> CommandResult;
    }
}

fn rejected() -> CommandResult {
    Err(CommandError::Rejected {
        status: 500,
        body: String::new(),
    })
}

fn dispatcher_with(control: Arc<dyn CallControl>) -> (Dispatcher, Arc<CallRegistry>) {
    let registry = Arc::new(CallRegistry::new());
    let dispatcher = Dispatcher::new(
        registry.clone(),
        control,
        Arc::new(DepartmentTable::default()),
    );
    (dispatcher, registry)
}

fn event(event_type: &str, payload: Value) -> WebhookEvent {
    WebhookEvent::from_value(&webhook_body(event_type, payload))
}

fn gather(call_control_id: &str, digit: &str) -> WebhookEvent {
    event(
        "call.gather.ended",
        json!({"call_control_id": call_control_id, "digits": digit}),
    )
}

#[tokio::test]
async fn test_initiated_answers_then_starts_menu() {
    let mut control = MockControl::new();
    let mut seq = mockall::Sequence::new();
    control
        .expect_answer()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    control
        .expect_start_menu()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    control.expect_transfer().never();

    let (dispatcher, registry) = dispatcher_with(Arc::new(control));
    let outcome = dispatcher
        .dispatch(&event("call.initiated", json!({"call_control_id": "abc"})))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::AnsweredAndMenuStarted);
    assert_eq!(registry.state("abc"), CallState::MenuActive);
}

#[tokio::test]
async fn test_initiated_answer_failure_skips_menu() {
    let mut control = MockControl::new();
    control.expect_answer().times(1).returning(|_| rejected());
    control.expect_start_menu().never();

    let (dispatcher, registry) = dispatcher_with(Arc::new(control));
    let outcome = dispatcher
        .dispatch(&event("call.initiated", json!({"call_control_id": "abc"})))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::AnswerFailed);
    assert_eq!(registry.state("abc"), CallState::Unseen);
}

#[tokio::test]
async fn test_initiated_menu_failure_still_reports_started() {
    let mut control = MockControl::new();
    control.expect_answer().times(1).returning(|_| Ok(()));
    control
        .expect_start_menu()
        .times(1)
        .returning(|_| Err(CommandError::Timeout));

    let (dispatcher, _) = dispatcher_with(Arc::new(control));
    let outcome = dispatcher
        .dispatch(&event("call.initiated", json!({"call_control_id": "abc"})))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::AnsweredAndMenuStarted);
}

#[tokio::test]
async fn test_missing_call_control_id() {
    let mut control = MockControl::new();
    control.expect_answer().never();
    control.expect_transfer().never();
    control.expect_start_menu().never();

    let (dispatcher, registry) = dispatcher_with(Arc::new(control));
    for event_type in ["call.initiated", "call.gather.ended"] {
        for payload in [json!({}), json!({"call_control_id": ""}), json!({"digit": "1"})] {
            let outcome = dispatcher.dispatch(&event(event_type, payload)).await.unwrap();
            assert_eq!(outcome, Outcome::MissingCallControlId);
        }
    }
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_gather_routes_to_department() {
    let control = Arc::new(RecordingControl::default());
    let (dispatcher, registry) = dispatcher_with(control.clone());

    let outcome = dispatcher.dispatch(&gather("abc", "2")).await.unwrap();

    assert_eq!(
        outcome,
        Outcome::GatherProcessed {
            digit: "2".to_string()
        }
    );
    assert!(registry.is_routed("abc"));
    assert_eq!(
        control.commands(),
        vec!["transfer:abc:sip:support@example.com".to_string()]
    );
}

#[tokio::test]
async fn test_each_digit_maps_to_its_department() {
    for (digit, uri) in [
        ("1", "sip:sales@example.com"),
        ("2", "sip:support@example.com"),
        ("3", "sip:porting@example.com"),
    ] {
        let control = Arc::new(RecordingControl::default());
        let (dispatcher, _) = dispatcher_with(control.clone());
        dispatcher.dispatch(&gather("abc", digit)).await.unwrap();
        assert_eq!(control.commands(), vec![format!("transfer:abc:{}", uri)]);
    }
}

#[tokio::test]
async fn test_second_gather_is_ignored() {
    let control = Arc::new(RecordingControl::default());
    let (dispatcher, _) = dispatcher_with(control.clone());

    dispatcher.dispatch(&gather("abc", "2")).await.unwrap();
    let outcome = dispatcher.dispatch(&gather("abc", "3")).await.unwrap();

    assert_eq!(outcome, Outcome::GatherIgnored);
    assert_eq!(control.count("transfer:"), 1);
}

#[tokio::test]
async fn test_gather_after_hangup_is_ignored() {
    let control = Arc::new(RecordingControl::default());
    let (dispatcher, registry) = dispatcher_with(control.clone());

    let hangup = event("call.hangup", json!({"call_control_id": "abc"}));
    assert_eq!(dispatcher.dispatch(&hangup).await.unwrap(), Outcome::Received);

    for digit in ["1", "", "9"] {
        let outcome = dispatcher.dispatch(&gather("abc", digit)).await.unwrap();
        assert_eq!(outcome, Outcome::GatherIgnored);
    }
    assert!(control.commands().is_empty());
    assert!(!registry.is_routed("abc"));
}

#[tokio::test]
async fn test_unmapped_digit_replays_menu() {
    for digit in ["", "12", "4", "a", "0"] {
        let control = Arc::new(RecordingControl::default());
        let (dispatcher, registry) = dispatcher_with(control.clone());

        let outcome = dispatcher.dispatch(&gather("abc", digit)).await.unwrap();

        assert_eq!(
            outcome,
            Outcome::GatherProcessed {
                digit: digit.to_string()
            }
        );
        assert_eq!(control.commands(), vec!["menu:abc".to_string()]);
        assert!(!registry.is_routed("abc"));
    }
}

#[tokio::test]
async fn test_gather_without_digit_fields() {
    let control = Arc::new(RecordingControl::default());
    let (dispatcher, _) = dispatcher_with(control.clone());

    let outcome = dispatcher
        .dispatch(&event(
            "call.gather.ended",
            json!({"call_control_id": "abc", "status": "timeout"}),
        ))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        Outcome::GatherProcessed {
            digit: String::new()
        }
    );
    assert_eq!(control.count("menu:"), 1);
}

#[tokio::test]
async fn test_nested_result_digit_is_used() {
    let control = Arc::new(RecordingControl::default());
    let (dispatcher, _) = dispatcher_with(control.clone());

    let outcome = dispatcher
        .dispatch(&event(
            "call.gather.ended",
            json!({"call_control_id": "abc", "result": {"digits": " 3 "}}),
        ))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        Outcome::GatherProcessed {
            digit: "3".to_string()
        }
    );
    assert_eq!(control.count("transfer:abc:sip:porting"), 1);
}

#[tokio::test]
async fn test_failed_transfer_does_not_route() {
    let control = Arc::new(RecordingControl {
        transfer_ok: false,
        ..Default::default()
    });
    let (dispatcher, registry) = dispatcher_with(control.clone());

    let outcome = dispatcher.dispatch(&gather("abc", "1")).await.unwrap();
    assert_eq!(
        outcome,
        Outcome::GatherProcessed {
            digit: "1".to_string()
        }
    );
    assert!(!registry.is_routed("abc"));

    // the caller can still pick again
    dispatcher.dispatch(&gather("abc", "1")).await.unwrap();
    assert_eq!(control.count("transfer:"), 2);
    assert!(!registry.is_routed("abc"));
}

#[tokio::test]
async fn test_hangup_always_marks_ended() {
    let control = Arc::new(RecordingControl::default());
    let (dispatcher, registry) = dispatcher_with(control.clone());

    dispatcher.dispatch(&gather("abc", "2")).await.unwrap();
    let hangup = event("call.hangup", json!({"call_control_id": "abc"}));
    assert_eq!(dispatcher.dispatch(&hangup).await.unwrap(), Outcome::Received);
    assert_eq!(dispatcher.dispatch(&hangup).await.unwrap(), Outcome::Received);

    assert!(registry.is_routed("abc"));
    assert!(registry.is_ended("abc"));
    assert_eq!(registry.state("abc"), CallState::Ended);
    assert_eq!(control.count("transfer:"), 1);
}

#[tokio::test]
async fn test_hangup_without_id_is_received() {
    let control = Arc::new(RecordingControl::default());
    let (dispatcher, registry) = dispatcher_with(control);

    let outcome = dispatcher
        .dispatch(&event("call.hangup", json!({})))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Received);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_other_events_are_echoed() {
    let control = Arc::new(RecordingControl::default());
    let (dispatcher, registry) = dispatcher_with(control.clone());

    let outcome = dispatcher
        .dispatch(&event("call.answered", json!({"call_control_id": "abc"})))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        Outcome::Unhandled {
            event: Some("call.answered".to_string())
        }
    );

    let outcome = dispatcher
        .dispatch(&WebhookEvent::from_slice(b"{}"))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Unhandled { event: None });

    assert!(control.commands().is_empty());
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_concurrent_gathers_transfer_once() {
    let control = Arc::new(RecordingControl {
        transfer_delay: Duration::from_millis(100),
        ..Default::default()
    });
    let (dispatcher, registry) = dispatcher_with(control.clone());

    let first = gather("abc", "1");
    let second = gather("abc", "2");
    let (a, b) = tokio::join!(dispatcher.dispatch(&first), dispatcher.dispatch(&second));
    let outcomes = [a.unwrap(), b.unwrap()];

    assert!(outcomes.contains(&Outcome::GatherIgnored));
    assert!(outcomes
        .iter()
        .any(|outcome| matches!(outcome, Outcome::GatherProcessed { .. })));
    assert_eq!(control.count("transfer:"), 1);
    assert!(registry.is_routed("abc"));
}

#[tokio::test]
async fn test_concurrent_gathers_across_tasks() {
    let control = Arc::new(RecordingControl {
        transfer_delay: Duration::from_millis(50),
        ..Default::default()
    });
    let (dispatcher, _) = dispatcher_with(control.clone());
    let dispatcher = Arc::new(dispatcher);

    let mut handles = Vec::new();
    for i in 0..16 {
        let dispatcher = dispatcher.clone();
        handles.push(tokio::spawn(async move {
            let event = gather(&format!("call-{}", i % 4), "3");
            dispatcher.dispatch(&event).await.unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // four distinct calls, one transfer each
    assert_eq!(control.count("transfer:"), 4);
}

#[tokio::test]
async fn test_hangup_during_transfer() {
    let control = Arc::new(RecordingControl {
        transfer_delay: Duration::from_millis(100),
        ..Default::default()
    });
    let (dispatcher, registry) = dispatcher_with(control.clone());

    let gather_event = gather("abc", "1");
    let hangup = event("call.hangup", json!({"call_control_id": "abc"}));
    let (routed, ended) = tokio::join!(dispatcher.dispatch(&gather_event), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        dispatcher.dispatch(&hangup).await
    });

    assert!(matches!(routed.unwrap(), Outcome::GatherProcessed { .. }));
    assert_eq!(ended.unwrap(), Outcome::Received);
    assert!(registry.is_routed("abc"));
    assert!(registry.is_ended("abc"));
}

#[tokio::test]
async fn test_full_call_flow() {
    let control = Arc::new(RecordingControl::default());
    let (dispatcher, registry) = dispatcher_with(control.clone());

    let initiated = event("call.initiated", json!({"call_control_id": "abc"}));
    assert_eq!(
        dispatcher.dispatch(&initiated).await.unwrap(),
        Outcome::AnsweredAndMenuStarted
    );
    assert_eq!(
        dispatcher.dispatch(&gather("abc", "7")).await.unwrap(),
        Outcome::GatherProcessed {
            digit: "7".to_string()
        }
    );
    assert_eq!(registry.state("abc"), CallState::MenuActive);
    assert_eq!(
        dispatcher.dispatch(&gather("abc", "2")).await.unwrap(),
        Outcome::GatherProcessed {
            digit: "2".to_string()
        }
    );
    assert_eq!(registry.state("abc"), CallState::Routed);

    assert_eq!(
        control.commands(),
        vec![
            "answer:abc".to_string(),
            "menu:abc".to_string(),
            "menu:abc".to_string(),
            "transfer:abc:sip:support@example.com".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_missing_destination_is_an_error() {
    let control = Arc::new(RecordingControl::default());
    let registry = Arc::new(CallRegistry::new());
    let mut departments = DepartmentTable::default();
    departments.remove_destination("support");
    let dispatcher = Dispatcher::new(
        registry.clone(),
        control.clone(),
        Arc::new(departments),
    );

    let result = dispatcher.dispatch(&gather("abc", "2")).await;
    assert!(matches!(
        result,
        Err(DispatchError::MissingDestination(name)) if name == "support"
    ));
    assert!(control.commands().is_empty());
    // the claim is released, a later event is processed again
    assert!(registry.claim_gather("abc").is_some());
}

#[test]
fn test_outcome_json() {
    assert_eq!(
        Outcome::AnsweredAndMenuStarted.to_json(),
        json!({"status": "answered_and_menu_started"})
    );
    assert_eq!(
        Outcome::GatherProcessed {
            digit: "2".to_string()
        }
        .to_json(),
        json!({"status": "gather_processed", "digit": "2"})
    );
    assert_eq!(
        Outcome::Unhandled {
            event: Some("call.bridged".to_string())
        }
        .to_json(),
        json!({"status": "received", "event": "call.bridged"})
    );
    assert_eq!(
        Outcome::Unhandled { event: None }.to_json(),
        json!({"status": "received", "event": null})
    );
    assert_eq!(Outcome::Received.to_json(), json!({"status": "received"}));
    assert_eq!(Outcome::Error.to_json(), json!({"status": "error"}));
}
