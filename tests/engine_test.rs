mod helpers;

use std::sync::Arc;
use std::time::{Duration, Instant};

use helpers::{active_id, test_engine, test_engine_with_storage, FakeBackend, SlowStorage};
use vitalchat::chat::{Role, SendOutcome, SendState};
use vitalchat::error::{BackendError, EngineError, FailureKind};
use vitalchat::model::RawResponse;
use vitalchat::storage::{StoragePort, SESSIONS_KEY};

#[tokio::test]
async fn off_topic_question_is_redirected_without_model_call() {
    let backend = Arc::new(FakeBackend::new());
    let engine = test_engine(Arc::clone(&backend));
    let id = active_id(&engine);

    let outcome = engine
        .send_message(&id, "What is the capital of France?")
        .await
        .unwrap();

    assert!(matches!(outcome, SendOutcome::Redirected { .. }));
    assert!(backend.requests().is_empty(), "model must not be called");

    let sessions = engine.sessions();
    let session = sessions.session(&id).unwrap();
    assert_eq!(session.messages.len(), 3);
    assert_eq!(session.messages[1].role, Role::User);
    assert_eq!(session.messages[2].role, Role::Assistant);
    assert_eq!(engine.send_state(&id), SendState::Succeeded);
}

#[tokio::test]
async fn health_question_reaches_model_with_context_and_persona() {
    let backend = Arc::new(FakeBackend::new().reply("Aim for seven to nine hours."));
    let engine = test_engine(Arc::clone(&backend));
    let id = active_id(&engine);

    let outcome = engine
        .send_message(&id, "How much sleep do I need each night?")
        .await
        .unwrap();

    match outcome {
        SendOutcome::Replied {
            reply, context_ids, ..
        } => {
            assert_eq!(reply, "Aim for seven to nine hours.");
            assert_eq!(context_ids.first().map(String::as_str), Some("kb-sleep"));
        }
        other => panic!("expected a reply, got {other:?}"),
    }

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    let prompt = &requests[0].prompt;
    assert!(prompt.starts_with("System: You are VitalChat"));
    assert!(prompt.contains("Relevant health knowledge:"));
    assert!(prompt.contains("Sleep Duration and Quality"));
    assert!(!requests[0].stream);

    // The stored transcript keeps the question as typed.
    let sessions = engine.sessions();
    let session = sessions.session(&id).unwrap();
    assert_eq!(session.messages[1].content, "How much sleep do I need each night?");
    assert_eq!(session.messages[2].content, "Aim for seven to nine hours.");
}

#[tokio::test]
async fn first_user_message_titles_the_session_once() {
    let backend = Arc::new(FakeBackend::new());
    let engine = test_engine(backend);
    let id = active_id(&engine);

    engine
        .send_message(&id, "Is my resting heart rate of 72 normal for my age?")
        .await
        .unwrap();
    let title = engine.sessions().session(&id).unwrap().title.clone();
    assert_eq!(title, "Is my resting heart rate of 72...");

    engine.send_message(&id, "What about during exercise?").await.unwrap();
    assert_eq!(engine.sessions().session(&id).unwrap().title, title);
}

#[tokio::test]
async fn backend_failures_become_assistant_messages() {
    let backend = Arc::new(
        FakeBackend::new()
            .respond(Err(BackendError::Unreachable("connection refused".into())))
            .respond(Ok(RawResponse {
                status: 404,
                body: r#"{"error":"model not found"}"#.into(),
            }))
            .respond(Ok(RawResponse::ok("<html>gateway</html>"))),
    );
    let engine = test_engine(backend);
    let id = active_id(&engine);

    let expected = [
        FailureKind::BackendUnreachable,
        FailureKind::BackendRejected,
        FailureKind::MalformedResponse,
    ];
    for kind in expected {
        let outcome = engine
            .send_message(&id, "Is my blood pressure too high?")
            .await
            .unwrap();
        match outcome {
            SendOutcome::Failed { failure, message } => {
                assert_eq!(failure, kind);
                let sessions = engine.sessions();
                let last = sessions.session(&id).unwrap().messages.last().unwrap().clone();
                assert_eq!(last.role, Role::Assistant);
                assert_eq!(last.content, message);
                assert!(!last.content.contains("<html>"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(engine.send_state(&id), SendState::Failed);
    }

    // greeting + three (question, error) pairs
    assert_eq!(engine.sessions().session(&id).unwrap().messages.len(), 7);
}

#[tokio::test]
async fn blank_and_unknown_sends_are_rejected() {
    let backend = Arc::new(FakeBackend::new());
    let engine = test_engine(Arc::clone(&backend));
    let id = active_id(&engine);

    let err = engine.send_message(&id, "   ").await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = engine
        .send_message("no-such-session", "How do I sleep better?")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SessionNotFound(_)));

    assert_eq!(engine.sessions().session(&id).unwrap().messages.len(), 1);
    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn second_send_to_same_session_is_rejected_while_first_is_pending() {
    let (backend, gate) = FakeBackend::gated();
    let backend = Arc::new(backend);
    let engine = Arc::new(test_engine(Arc::clone(&backend)));
    let id = active_id(&engine);

    let first = {
        let engine = Arc::clone(&engine);
        let id = id.clone();
        tokio::spawn(async move {
            engine
                .send_message(&id, "How much water should I drink?")
                .await
        })
    };
    backend.entered.notified().await;
    assert_eq!(engine.send_state(&id), SendState::Sending);

    let err = engine
        .send_message(&id, "And how much protein?")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SendInProgress(_)));

    // A different session is unaffected.
    let other = engine.sessions().create_session(None).unwrap().id;
    let second = {
        let engine = Arc::clone(&engine);
        let other = other.clone();
        tokio::spawn(async move { engine.send_message(&other, "Tips for better sleep?").await })
    };
    backend.entered.notified().await;
    assert_eq!(engine.send_state(&other), SendState::Sending);

    gate.add_permits(2);
    assert!(matches!(first.await.unwrap().unwrap(), SendOutcome::Replied { .. }));
    assert!(matches!(second.await.unwrap().unwrap(), SendOutcome::Replied { .. }));

    assert_eq!(engine.send_state(&id), SendState::Succeeded);
    assert_eq!(engine.sessions().session(&id).unwrap().messages.len(), 3);
    assert_eq!(backend.requests().len(), 2);
}

#[tokio::test]
async fn reply_for_deleted_session_is_dropped() {
    let (backend, gate) = FakeBackend::gated();
    let backend = Arc::new(backend);
    let engine = Arc::new(test_engine(Arc::clone(&backend)));
    let id = active_id(&engine);

    let pending = {
        let engine = Arc::clone(&engine);
        let id = id.clone();
        tokio::spawn(async move { engine.send_message(&id, "What is a healthy BMI?").await })
    };
    backend.entered.notified().await;

    let new_active = engine.delete_session(&id).unwrap();
    assert_eq!(engine.send_state(&id), SendState::Sending);
    gate.add_permits(1);

    assert!(matches!(pending.await.unwrap().unwrap(), SendOutcome::Replied { .. }));
    assert_eq!(engine.tracked_send_states(), 0);
    let sessions = engine.sessions();
    assert!(sessions.session(&id).is_none());
    assert_eq!(sessions.active_session_id(), new_active);
    assert_eq!(sessions.session(&new_active).unwrap().messages.len(), 1);
}

#[tokio::test]
async fn deleting_sessions_forgets_their_send_state() {
    let engine = test_engine(Arc::new(FakeBackend::new()));
    let folder = engine.sessions().create_folder("Sleep").unwrap().id;
    let loose = active_id(&engine);
    let filed = engine.sessions().create_session(Some(folder.as_str())).unwrap().id;

    engine.send_message(&loose, "Is coffee bad for sleep?").await.unwrap();
    engine.send_message(&filed, "How long should a nap be?").await.unwrap();
    assert_eq!(engine.tracked_send_states(), 2);

    engine.delete_session(&loose).unwrap();
    assert_eq!(engine.tracked_send_states(), 1);

    assert_eq!(engine.delete_folder(&folder).unwrap(), 1);
    assert_eq!(engine.tracked_send_states(), 0);
    assert_eq!(engine.send_state(&filed), SendState::Idle);
}

#[tokio::test]
async fn slow_storage_does_not_stall_the_runtime() {
    let delay = Duration::from_millis(300);
    let storage = Arc::new(SlowStorage::new(delay));
    let engine = test_engine_with_storage(storage.clone(), Arc::new(FakeBackend::new()));
    let id = active_id(&engine);

    // Single-threaded runtime: a blocking write would hold up the ticker too.
    let start = Instant::now();
    let (outcome, ticked_at) = tokio::join!(
        engine.send_message(&id, "How much water should I drink?"),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            start.elapsed()
        }
    );
    assert!(matches!(outcome.unwrap(), SendOutcome::Replied { .. }));
    assert!(ticked_at < delay, "ticker stalled for {ticked_at:?}");

    engine.flush();
    let stored = storage.get(SESSIONS_KEY).unwrap().unwrap();
    assert!(stored.contains("How much water should I drink?"));
}

#[tokio::test]
async fn history_is_sent_in_order() {
    let backend = Arc::new(FakeBackend::new().reply("first").reply("second"));
    let engine = test_engine(Arc::clone(&backend));
    let id = active_id(&engine);

    engine.send_message(&id, "How many steps a day?").await.unwrap();
    engine.send_message(&id, "Does walking count as exercise?").await.unwrap();

    let prompt = &backend.requests()[1].prompt;
    let first_q = prompt.find("User: How many steps a day?").unwrap();
    let first_a = prompt.find("Assistant: first").unwrap();
    let second_q = prompt.find("User: Does walking count as exercise?").unwrap();
    assert!(first_q < first_a && first_a < second_q);
    assert!(prompt.trim_end().ends_with("Assistant:"));
}

#[tokio::test]
async fn discovery_switches_to_first_installed_model() {
    let backend = Arc::new(FakeBackend::new().with_models(&["mistral", "phi3"]).reply("hi"));
    let engine = test_engine(Arc::clone(&backend));
    let id = active_id(&engine);

    let models = engine.models().refresh_models().await;
    assert_eq!(models, vec!["mistral", "phi3"]);
    assert_eq!(engine.models().selected_model(), "mistral");

    engine.send_message(&id, "Is coffee bad for my heart?").await.unwrap();
    assert_eq!(backend.requests()[0].model, "mistral");
}

#[tokio::test]
async fn retrieval_can_be_disabled() {
    let backend = Arc::new(FakeBackend::new());
    let mut config = vitalchat::config::VitalConfig::default();
    config.retrieval.enabled = false;
    let engine = vitalchat::chat::ChatEngine::new(
        Arc::new(vitalchat::storage::MemoryStorage::new()),
        Arc::clone(&backend) as Arc<dyn vitalchat::model::InferenceBackend>,
        &config,
    );
    let id = active_id(&engine);

    match engine.send_message(&id, "How much sleep do I need?").await.unwrap() {
        SendOutcome::Replied { context_ids, .. } => assert!(context_ids.is_empty()),
        other => panic!("expected a reply, got {other:?}"),
    }
    assert!(!backend.requests()[0].prompt.contains("Relevant health knowledge:"));
}
