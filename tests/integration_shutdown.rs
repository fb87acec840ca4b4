#![allow(clippy::unwrap_used, clippy::panic, clippy::missing_panics_doc, clippy::must_use_candidate, missing_debug_implementations, unreachable_pub)]
use courier_server::domain::message::Message;
use courier_server::error::DeliveryError;
mod common;

#[tokio::test]
async fn test_submissions_after_shutdown_are_rejected() {
    let p1 = common::TestSender::new("Provider1", false);
    let app = common::TestApp::spawn(common::senders(&[&p1])).await;

    app.shutdown_tx.send(true).unwrap();
    // Give the worker a moment to observe the signal and close the queue.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let message = Message { to: "test@example.com".into(), subject: "Test".into(), body: "Hello".into() };
    let err = app.delivery_service.submit(message, None, "client-1").unwrap_err();

    assert_eq!(err, DeliveryError::QueueClosed);
    assert_eq!(p1.calls(), 0);
}
