mod support;

use std::time::Duration;

use application::{ApplicationError, DispatchOutcome, FileUpload, SendMessageRequest};
use domain::{Username, FILE_LOCATOR_PREFIX};
use support::TestApp;
use tokio::io::AsyncReadExt;

fn text(sender: &Username, receiver: &str, body: &str) -> SendMessageRequest {
    SendMessageRequest {
        sender: sender.clone(),
        receiver: receiver.to_owned(),
        text: Some(body.to_owned()),
        file: None,
    }
}

async fn pair(app: &TestApp) -> (Username, Username) {
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    app.befriend(&alice, &bob).await;
    (alice, bob)
}

#[tokio::test]
async fn waiting_receiver_gets_message_live() {
    let app = TestApp::new(Duration::from_secs(5));
    let (alice, bob) = pair(&app).await;

    let messaging = app.messaging.clone();
    let poller = bob.clone();
    let poll = tokio::spawn(async move { messaging.poll(&poller).await });
    app.wait_until_polling(&bob).await;

    let outcome = app.messaging.send(text(&alice, "bob", "hi bob")).await.unwrap();
    assert_eq!(outcome, DispatchOutcome::Delivered);

    let received = poll.await.unwrap().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].content.as_str(), "hi bob");
    assert_eq!(received[0].sender, alice);

    // 实时交付的消息以已送达状态落库
    let stored = app.messages.all().await;
    assert_eq!(stored.len(), 1);
    assert!(stored.iter().all(|message| message.delivered));
}

#[tokio::test]
async fn queued_messages_are_delivered_exactly_once() {
    let app = TestApp::new(Duration::from_millis(200));
    let (alice, bob) = pair(&app).await;

    for body in ["first", "second"] {
        app.clock.advance(chrono::Duration::milliseconds(10));
        let outcome = app.messaging.send(text(&alice, "bob", body)).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Queued);
    }

    let received = app.messaging.poll(&bob).await.unwrap();
    let bodies: Vec<&str> = received.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(bodies, ["first", "second"]);

    let again = app.messaging.poll(&bob).await.unwrap();
    assert!(again.is_empty());
    assert!(!app.presence.is_waiting(&bob));
}

#[tokio::test]
async fn poll_times_out_empty() {
    let app = TestApp::new(Duration::from_millis(100));
    let bob = app.register("bob").await;

    let started = std::time::Instant::now();
    let received = app.messaging.poll(&bob).await.unwrap();
    assert!(received.is_empty());
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert!(!app.presence.is_waiting(&bob));
}

#[tokio::test]
async fn routing_respects_the_receivers_friend_list() {
    let app = TestApp::new(Duration::from_millis(100));
    let (alice, _bob) = pair(&app).await;
    let mallory = app.register("mallory").await;

    let forbidden = app.messaging.send(text(&mallory, "bob", "psst")).await.unwrap();
    assert_eq!(forbidden, DispatchOutcome::Forbidden);

    let missing = app.messaging.send(text(&alice, "nobody", "hello")).await.unwrap();
    assert_eq!(missing, DispatchOutcome::ReceiverNotFound);

    assert!(app.messages.all().await.is_empty());
}

#[tokio::test]
async fn empty_message_is_rejected() {
    let app = TestApp::new(Duration::from_millis(100));
    let (alice, _bob) = pair(&app).await;

    let result = app.messaging.send(text(&alice, "bob", "   ")).await;
    assert!(matches!(result, Err(ApplicationError::InvalidRequest(_))));
}

#[tokio::test]
async fn only_the_receiver_may_fetch_a_shared_file() {
    let app = TestApp::new(Duration::from_millis(100));
    let (alice, bob) = pair(&app).await;
    let carol = app.register("carol").await;

    let outcome = app
        .messaging
        .send(SendMessageRequest {
            sender: alice.clone(),
            receiver: "bob".into(),
            text: Some("ignored when a file is attached".into()),
            file: Some(FileUpload {
                file_name: "notes.txt".into(),
                bytes: b"meeting at noon".to_vec(),
            }),
        })
        .await
        .unwrap();
    assert_eq!(outcome, DispatchOutcome::Queued);

    let received = app.messaging.poll(&bob).await.unwrap();
    assert_eq!(received.len(), 1);
    assert!(received[0].is_file);
    let stored_name = received[0]
        .content
        .as_str()
        .strip_prefix(FILE_LOCATOR_PREFIX)
        .expect("file locator")
        .to_owned();
    assert!(stored_name.ends_with("_notes.txt"));

    let mut handle = app.messaging.fetch_file(&bob, &stored_name).await.unwrap();
    let mut bytes = Vec::new();
    handle.reader.read_to_end(&mut bytes).await.unwrap();
    assert_eq!(bytes, b"meeting at noon");

    for stranger in [&alice, &carol] {
        let denied = app.messaging.fetch_file(stranger, &stored_name).await;
        assert!(matches!(denied, Err(ApplicationError::FileAccessDenied)));
    }

    let unknown = app.messaging.fetch_file(&bob, "missing.txt").await;
    assert!(matches!(unknown, Err(ApplicationError::FileAccessDenied)));
}

#[tokio::test]
async fn friend_requests_flow() {
    use application::{FriendRequestOutcome, FriendResponseOutcome};

    let app = TestApp::new(Duration::from_millis(100));
    let alice = app.register("alice").await;
    let bob = app.register("bob").await;
    let carol = app.register("carol").await;

    let sent = app.friends.send_friend_request(&alice, "bob").await.unwrap();
    assert_eq!(sent, FriendRequestOutcome::Sent);
    let repeat = app.friends.send_friend_request(&alice, "bob").await.unwrap();
    assert_eq!(repeat, FriendRequestOutcome::AlreadyPending);

    let accepted = app
        .friends
        .respond_to_friend_request(&bob, "alice", true)
        .await
        .unwrap();
    assert_eq!(accepted, FriendResponseOutcome::Accepted);
    assert_eq!(app.friends.friends(&alice).await.unwrap(), ["bob"]);
    assert_eq!(app.friends.friends(&bob).await.unwrap(), ["alice"]);

    let already = app.friends.send_friend_request(&bob, "alice").await.unwrap();
    assert_eq!(already, FriendRequestOutcome::AlreadyFriends);

    app.friends.send_friend_request(&carol, "bob").await.unwrap();
    let declined = app
        .friends
        .respond_to_friend_request(&bob, "carol", false)
        .await
        .unwrap();
    assert_eq!(declined, FriendResponseOutcome::Declined);
    assert_eq!(app.friends.friends(&bob).await.unwrap(), ["alice"]);

    let none = app
        .friends
        .respond_to_friend_request(&bob, "carol", true)
        .await
        .unwrap();
    assert_eq!(none, FriendResponseOutcome::NoSuchRequest);
}
