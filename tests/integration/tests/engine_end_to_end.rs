//! End-to-end tests over the assembled conversation engine.

use std::time::Duration;

use tokio::time::sleep;

use nimbus_integration_tests::{engine, TEST_DEBOUNCE};
use nimbus_orchestrator::InboundEvent;

const SETTLE: Duration = Duration::from_millis(140);

#[tokio::test]
async fn hello_turn_reaches_the_gateway_exactly_once() {
    let engine = engine();
    engine
        .orchestrator
        .handle_event(InboundEvent::text("user-1", "hello"))
        .await
        .expect("handle");

    sleep(SETTLE).await;
    let calls = engine.chat.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, "hello");
    assert_eq!(
        engine.replies.texts_for("user-1"),
        vec!["reply to: hello".to_string()]
    );
}

#[tokio::test]
async fn mixed_media_fragments_coalesce_into_one_turn() {
    let engine = engine();
    engine
        .orchestrator
        .handle_event(InboundEvent::text("user-1", "my router died"))
        .await
        .expect("text");
    engine
        .orchestrator
        .handle_event(InboundEvent::voice("user-1", b"it blinks red".to_vec()))
        .await
        .expect("voice");

    sleep(SETTLE).await;
    let calls = engine.chat.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, "my router died\nit blinks red");
}

#[tokio::test]
async fn steady_fragment_stream_defers_the_flush() {
    let engine = engine();
    for index in 0..4 {
        engine
            .orchestrator
            .handle_event(InboundEvent::text("user-1", format!("part {index}")))
            .await
            .expect("handle");
        sleep(TEST_DEBOUNCE.mul_f32(0.6)).await;
    }
    assert!(engine.chat.calls().is_empty());

    sleep(SETTLE).await;
    assert_eq!(engine.chat.calls().len(), 1);
}

#[tokio::test]
async fn contact_form_round_trip_appends_one_row() {
    let engine = engine();
    for message in ["contact", "Ada Lovelace", "ada@example.com", "billing issue"] {
        engine
            .orchestrator
            .handle_event(InboundEvent::text("user-1", message))
            .await
            .expect("handle");
    }
    sleep(SETTLE).await;

    let appended = engine.row_sink.rows.lock().expect("rows lock").clone();
    assert_eq!(
        appended,
        vec![vec![vec![
            "Ada Lovelace".to_string(),
            "ada@example.com".to_string(),
            "billing issue".to_string(),
        ]]]
    );
    // Form traffic never reaches the completion gateway.
    assert!(engine.chat.calls().is_empty());
}

#[tokio::test]
async fn admin_blocks_a_user_in_band() {
    let engine = engine();
    engine
        .orchestrator
        .handle_event(InboundEvent::text("admin-1", "block user-9"))
        .await
        .expect("admin");
    assert!(engine.access.is_blocked("user-9"));

    engine
        .orchestrator
        .handle_event(InboundEvent::text("user-9", "hello?"))
        .await
        .expect("blocked user");
    sleep(SETTLE).await;
    assert!(engine.chat.calls().is_empty());
    assert_eq!(
        engine.replies.texts_for("user-9"),
        vec!["Sorry, you are blocked.".to_string()]
    );

    engine
        .orchestrator
        .handle_event(InboundEvent::text("admin-1", "unblock user-9"))
        .await
        .expect("unblock");
    assert!(!engine.access.is_blocked("user-9"));
}

#[tokio::test]
async fn image_description_and_caption_arrive_in_order() {
    let engine = engine();
    engine
        .orchestrator
        .handle_event(InboundEvent::image(
            "user-1",
            vec![0xFF, 0xD8],
            Some("it broke this morning".to_string()),
        ))
        .await
        .expect("image");

    sleep(SETTLE).await;
    let calls = engine.chat.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].1,
        "an image of a broken router\nit broke this morning"
    );
}

#[tokio::test]
async fn users_are_batched_independently() {
    let engine = engine();
    engine
        .orchestrator
        .handle_event(InboundEvent::text("user-1", "alpha"))
        .await
        .expect("user-1");
    engine
        .orchestrator
        .handle_event(InboundEvent::text("user-2", "beta"))
        .await
        .expect("user-2");

    sleep(SETTLE).await;
    let mut batches: Vec<String> = engine.chat.calls().into_iter().map(|(_, text)| text).collect();
    batches.sort();
    assert_eq!(batches, vec!["alpha".to_string(), "beta".to_string()]);
}
