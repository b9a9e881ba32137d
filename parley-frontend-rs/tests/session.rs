mod support;

use std::sync::Arc;
use std::time::Duration;

use parley::data_model::{Chat, ChatId, Message, User, UserId};
use parley_frontend_rs::ChatSession;
use parley_frontend_rs::config::ClientConfig;
use parley_frontend_rs::connection::ConnectionStatus;
use parley_frontend_rs::dispatcher::Dispatch;
use parley_frontend_rs::notifications::Notice;
use parley_frontend_rs::socketio::Packet;
use serde_json::json;
use tokio::sync::mpsc;

use support::{MockApi, MockServer, MockTransport, RecordingSurface, Reply, config};

fn chat(id: &str, name: &str, members: &[&str]) -> Chat {
    Chat::new(
        ChatId::from(id),
        name,
        members.iter().map(|member| UserId::from(*member)),
    )
}

struct Harness {
    session: ChatSession,
    api: Arc<MockApi>,
    transport: Arc<MockTransport>,
    accepted: mpsc::UnboundedReceiver<MockServer>,
    notices: mpsc::UnboundedReceiver<Notice>,
}

async fn start(config: &ClientConfig, api: MockApi) -> Harness {
    let api = Arc::new(api);
    let (transport, accepted) = MockTransport::new();
    let transport = Arc::new(transport);
    let (surface, notices) = RecordingSurface::new();
    let session = ChatSession::start(
        config,
        "t0k",
        api.clone(),
        transport.clone(),
        Arc::new(surface),
    )
    .await;
    Harness {
        session,
        api,
        transport,
        accepted,
        notices,
    }
}

impl Harness {
    async fn connected_server(&mut self) -> MockServer {
        let mut server = self.accepted.recv().await.unwrap();
        server.accept().await;
        while self.session.connection_status() != ConnectionStatus::Connected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        server
    }

    async fn loaded(&self) {
        self.session
            .subscribe()
            .wait_for(|view| !view.loading)
            .await
            .unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_message_lands_in_fetched_chat() {
    let mut h = start(
        &config(),
        MockApi::with_chats(vec![chat("c1", "A", &["u1", "u2"])]),
    )
    .await;
    assert!(h.session.loading());

    h.loaded().await;
    let c1 = ChatId::from("c1");
    assert!(h.session.chats()[&c1].messages().is_empty());

    let server = h.connected_server().await;
    server.send(Packet::event(
        "chat message",
        vec![json!("c1"), json!({ "text": "hi" })],
    ));

    h.session
        .subscribe()
        .wait_for(|view| {
            view.snapshot
                .chat(&c1)
                .is_some_and(|chat| !chat.messages().is_empty())
        })
        .await
        .unwrap();
    let chats = h.session.chats();
    assert_eq!(chats[&c1].messages(), &im::vector![Message::text("hi")]);
    assert_eq!(chats[&c1].name(), "A");
    assert!(h.notices.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_chat_created_before_fetch_completes() {
    let mut h = start(
        &config(),
        MockApi {
            chat_delay: Some(Duration::from_secs(600)),
            ..MockApi::default()
        },
    )
    .await;

    let server = h.connected_server().await;
    server.send(Packet::event(
        "create chat",
        vec![json!({ "_id": "c2", "name": "B", "members": ["u3", "u4"] })],
    ));

    let c2 = ChatId::from("c2");
    h.session
        .subscribe()
        .wait_for(|view| view.snapshot.chat(&c2).is_some())
        .await
        .unwrap();

    let view = h.session.view();
    assert!(view.loading);
    let created = view.snapshot.chat(&c2).unwrap();
    assert_eq!(created.name(), "B");
    assert_eq!(
        created.members().iter().cloned().collect::<Vec<_>>(),
        vec![UserId::from("u3"), UserId::from("u4")]
    );
    assert!(created.messages().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_server_disconnect_notifies_once() {
    let mut h = start(&config(), MockApi::default()).await;
    let server = h.connected_server().await;

    server.send(Packet::Disconnect);
    assert_eq!(h.notices.recv().await, Some(Notice::NotAuthenticated));

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(h.notices.try_recv().is_err());
    assert_eq!(h.transport.opened(), 1);
    assert_eq!(h.session.connection_status(), ConnectionStatus::Closed);
    assert_eq!(
        h.session.send_message(&ChatId::from("c1"), Some("hi")),
        Dispatch::NotConnected
    );
}

#[tokio::test(start_paused = true)]
async fn test_rejected_message_is_surfaced() {
    let mut h = start(
        &config(),
        MockApi::with_chats(vec![chat("c1", "A", &["u1", "u2"])]),
    )
    .await;
    h.loaded().await;
    let before = h.session.snapshot();

    let server = h.connected_server().await;
    server.send(Packet::event("error", vec![json!("not a member")]));

    assert_eq!(
        h.notices.recv().await,
        Some(Notice::ServerError {
            title: "Error sending message".to_string(),
            description: "not a member".to_string(),
        })
    );
    assert_eq!(h.session.snapshot(), before);
}

#[tokio::test(start_paused = true)]
async fn test_message_for_unknown_chat_is_dropped() {
    let mut h = start(&config(), MockApi::default()).await;
    h.loaded().await;

    let server = h.connected_server().await;
    server.send(Packet::event(
        "chat message",
        vec![json!("nope"), json!({ "text": "lost" })],
    ));
    // malformed and unknown events are skipped too
    server.send(Packet::event("chat message", vec![json!("nope")]));
    server.send(Packet::event("typing", vec![json!("c1")]));
    server.send(Packet::event(
        "create chat",
        vec![json!({ "_id": "c9", "name": "Z", "members": ["u1", "u2"] })],
    ));

    let c9 = ChatId::from("c9");
    h.session
        .subscribe()
        .wait_for(|view| view.snapshot.chat(&c9).is_some())
        .await
        .unwrap();
    assert!(h.session.snapshot().chat(&ChatId::from("nope")).is_none());
    assert_eq!(h.session.chats().len(), 1);
    assert!(h.notices.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_failed_chat_fetch_is_silent() {
    let api = MockApi::default();
    api.chats.lock().unwrap().push_back(Reply::Status(500));
    let mut h = start(&config(), api).await;
    let _server = h.connected_server().await;

    h.loaded().await;
    assert!(h.session.chats().is_empty());
    assert!(h.notices.try_recv().is_err());
}

#[tokio::test]
async fn test_users_network_error_is_surfaced() {
    let api = MockApi::default();
    api.users.lock().unwrap().push_back(Reply::Network);
    let mut h = start(&config(), api).await;
    let _server = h.connected_server().await;

    assert_eq!(
        h.notices.recv().await,
        Some(Notice::NetworkError {
            context: "fetching users".to_string(),
        })
    );
    assert!(h.session.users().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_users_status_error_is_not_surfaced() {
    let api = MockApi::default();
    api.users.lock().unwrap().push_back(Reply::Status(503));
    let mut h = start(&config(), api).await;
    let _server = h.connected_server().await;
    h.loaded().await;

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.api.user_fetches(), 1);
    assert!(h.notices.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_connect_error_is_surfaced() {
    let (transport, _accepted) = MockTransport::refusing();
    let (surface, mut notices) = RecordingSurface::new();
    let config = ClientConfig {
        reconnection_attempts: 0,
        ..config()
    };
    let session = ChatSession::start(
        &config,
        "t0k",
        Arc::new(MockApi::default()),
        Arc::new(transport),
        Arc::new(surface),
    )
    .await;

    let connect_error = Some(Notice::NetworkError {
        context: "connect_error".to_string(),
    });
    assert_eq!(notices.recv().await, connect_error);
    // giving up is reported the same way
    assert_eq!(notices.recv().await, connect_error);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(session.connection_status(), ConnectionStatus::Closed);
    assert!(notices.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_users_are_polled_when_enabled() {
    let api = MockApi::default();
    {
        let mut users = api.users.lock().unwrap();
        users.push_back(Reply::Ok(vec![User::new(UserId::from("u1"), "Ann")]));
        users.push_back(Reply::Ok(vec![
            User::new(UserId::from("u1"), "Ann"),
            User::new(UserId::from("u2"), "Bob"),
        ]));
    }
    let config = ClientConfig {
        user_poll_interval: Some(Duration::from_secs(60)),
        ..config()
    };
    let mut h = start(&config, api).await;
    let _server = h.connected_server().await;

    let mut view = h.session.subscribe();
    view.wait_for(|view| view.snapshot.users().len() == 1)
        .await
        .unwrap();
    assert_eq!(h.api.user_fetches(), 1);

    tokio::time::sleep(Duration::from_secs(61)).await;
    view.wait_for(|view| view.snapshot.users().len() == 2)
        .await
        .unwrap();
    assert_eq!(h.api.user_fetches(), 2);
    assert_eq!(
        h.session.users()[&UserId::from("u2")].display_name,
        "Bob"
    );
}

#[tokio::test(start_paused = true)]
async fn test_users_fetched_once_when_polling_disabled() {
    let mut h = start(&config(), MockApi::default()).await;
    let _server = h.connected_server().await;

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(h.api.user_fetches(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_actions_wait_for_the_server_echo() {
    let mut h = start(
        &config(),
        MockApi::with_chats(vec![chat("c1", "A", &["u1", "u2"])]),
    )
    .await;
    let c1 = ChatId::from("c1");
    assert_eq!(
        h.session.send_message(&c1, Some("early")),
        Dispatch::NotConnected
    );

    h.loaded().await;
    let mut server = h.connected_server().await;

    assert_eq!(h.session.send_message(&c1, Some("")), Dispatch::Skipped);
    assert_eq!(
        h.session.create_chat("solo", &[UserId::from("u1")]),
        Dispatch::Skipped
    );
    assert_eq!(h.session.send_message(&c1, Some("hi")), Dispatch::Sent);
    assert_eq!(
        server.recv().await,
        Some(Packet::event(
            "chat message",
            vec![json!({ "chatId": "c1", "message": "hi" })]
        ))
    );
    // nothing changes locally until the server echoes it back
    assert!(h.session.chats()[&c1].messages().is_empty());

    server.send(Packet::event(
        "chat message",
        vec![json!("c1"), json!({ "text": "hi", "sender": "u1" })],
    ));
    h.session
        .subscribe()
        .wait_for(|view| {
            view.snapshot
                .chat(&c1)
                .is_some_and(|chat| chat.messages().len() == 1)
        })
        .await
        .unwrap();
    assert_eq!(
        h.session.chats()[&c1].messages()[0].sender_id,
        Some(UserId::from("u1"))
    );
}

#[tokio::test(start_paused = true)]
async fn test_teardown_discards_pending_results() {
    let config = ClientConfig {
        user_poll_interval: Some(Duration::from_secs(60)),
        ..config()
    };
    let api = MockApi {
        chat_delay: Some(Duration::from_secs(600)),
        ..MockApi::with_chats(vec![chat("c1", "A", &["u1", "u2"])])
    };
    let mut h = start(&config, api).await;
    let mut server = h.connected_server().await;
    let mut view = h.session.subscribe();

    let Harness { session, api, .. } = h;
    session.teardown().await;
    assert_eq!(server.recv().await, Some(Packet::Disconnect));

    let _ = view.borrow_and_update();
    assert!(view.changed().await.is_err());

    tokio::time::sleep(Duration::from_secs(601)).await;
    assert!(view.borrow().snapshot.chats().is_empty());
    assert!(view.borrow().loading);
    assert_eq!(api.user_fetches(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_rotating_token_reconnects_and_drops_stale_chats() {
    let api = MockApi {
        chat_delay: Some(Duration::from_secs(600)),
        ..MockApi::default()
    };
    {
        let mut chats = api.chats.lock().unwrap();
        chats.push_back(Reply::Ok(vec![chat("old", "Old", &["u1", "u2"])]));
        chats.push_back(Reply::Ok(vec![chat("new", "New", &["u1", "u2"])]));
    }
    let mut h = start(&config(), api).await;
    let mut old_server = h.connected_server().await;

    h.session.rotate_token("fresh").await;
    assert_eq!(old_server.recv().await, Some(Packet::Disconnect));

    let new_server = h.connected_server().await;
    assert!(new_server.url.query().unwrap().ends_with("token=fresh"));

    h.loaded().await;
    let chats = h.session.chats();
    assert!(chats.contains_key(&ChatId::from("new")));
    assert!(!chats.contains_key(&ChatId::from("old")));
    assert_eq!(
        *h.api.chat_tokens.lock().unwrap(),
        vec!["t0k".to_string(), "fresh".to_string()]
    );
    assert!(h.notices.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_network_drop_reconnects_quietly() {
    let mut h = start(&config(), MockApi::default()).await;
    let server = h.connected_server().await;

    server.hang_up();
    let mut server = h.connected_server().await;
    assert_eq!(h.transport.opened(), 2);
    assert!(h.notices.try_recv().is_err());

    // still usable after coming back
    assert_eq!(
        h.session.create_chat("B", &[UserId::from("u1"), UserId::from("u2")]),
        Dispatch::Sent
    );
    assert_eq!(
        server.recv().await,
        Some(Packet::event(
            "create chat",
            vec![json!({ "name": "B", "members": ["u1", "u2"] })]
        ))
    );
}
