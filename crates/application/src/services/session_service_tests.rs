//! 会话服务单元测试
//!
//! 通过进程内的推送中心驱动房间的创建、加入、重连、退出、关闭与断线流程，
//! 同时检查注册表状态和每个会话收到的事件。

use std::sync::Arc;
use std::time::Duration;

use domain::{Role, RoomId, SessionId, UserId, UserStatus};
use serde_json::{json, Value};

use crate::{
    ApplicationError, Clock, ContentKind, FixedClock, InboundEvent, LocalSessionHub, OutboundEvent,
    ReconnectCommand, SessionRegistry, SessionService, SessionServiceDependencies, SessionSettings,
    SessionStream, SystemClock,
};

struct Harness {
    service: Arc<SessionService>,
    hub: LocalSessionHub,
}

fn quiet_settings() -> SessionSettings {
    SessionSettings {
        close_grace: Duration::ZERO,
        min_client_version: None,
        diagnostics: true,
        broadcast_audit: false,
    }
}

fn harness_with(settings: SessionSettings) -> Harness {
    harness_with_clock(settings, Arc::new(SystemClock))
}

fn harness_with_clock(settings: SessionSettings, clock: Arc<dyn Clock>) -> Harness {
    let hub = LocalSessionHub::new();
    let service = SessionService::new(SessionServiceDependencies {
        registry: SessionRegistry::new(),
        notifier: Arc::new(hub.clone()),
        clock,
        settings,
    });
    Harness {
        service: Arc::new(service),
        hub,
    }
}

fn harness() -> Harness {
    harness_with(quiet_settings())
}

impl Harness {
    async fn connect(&self, session: &str) -> (SessionId, SessionStream) {
        let session = SessionId::from(session);
        let stream = self.hub.register(session.clone()).await;
        (session, stream)
    }

    async fn create(&self, host: &SessionId) -> RoomId {
        self.service.create_room(host, &json!({})).await.unwrap()
    }

    async fn join(&self, client: &SessionId, room_id: RoomId) -> UserId {
        self.service
            .join_room(client, &json!({"room_id": room_id.get()}))
            .await
            .unwrap()
    }

    async fn user_id(&self, session: &SessionId) -> UserId {
        self.service
            .with_registry(|registry| registry.user_by_session(session).map(|user| user.id))
            .await
            .unwrap()
    }

    async fn room_len(&self, room_id: RoomId) -> Option<usize> {
        self.service
            .with_registry(|registry| registry.room(room_id).map(|room| room.len()))
            .await
    }
}

fn room_payload(room_id: RoomId) -> Value {
    json!({"room_id": room_id.get()})
}

fn last_update(events: &[OutboundEvent]) -> domain::RoomSnapshot {
    events
        .iter()
        .rev()
        .find_map(|event| match event {
            OutboundEvent::RoomUpdate(snapshot) => Some(snapshot.clone()),
            _ => None,
        })
        .expect("expected a room/update event")
}

#[tokio::test]
async fn test_create_room_has_single_host_member() {
    let h = harness();
    let (host, mut host_rx) = h.connect("host").await;

    let room_id = h.create(&host).await;

    let (members, host_role, host_name) = h
        .service
        .with_registry(|registry| {
            let room = registry.room(room_id).unwrap();
            let host = registry.user(room.host_id()).unwrap();
            (room.len(), host.role(), host.name.to_string())
        })
        .await;
    assert_eq!(members, 1);
    assert_eq!(host_role, Role::Host);
    assert_eq!(host_name, "Host");

    let snapshot = last_update(&host_rx.drain());
    assert_eq!(snapshot.room_id, room_id);
    assert_eq!(snapshot.users_count, 1);
    assert_eq!(snapshot.users[0].role, Role::Host);
}

#[tokio::test]
async fn test_create_room_uses_supplied_name() {
    let h = harness();
    let (host, _rx) = h.connect("host").await;

    h.service
        .create_room(&host, &json!({"name": "Ms. Smith"}))
        .await
        .unwrap();

    let name = h
        .service
        .with_registry(|registry| registry.user_by_session(&host).unwrap().name.to_string())
        .await;
    assert_eq!(name, "Ms. Smith");
}

#[tokio::test]
async fn test_create_room_twice_on_same_session_conflicts() {
    let h = harness();
    let (host, _rx) = h.connect("host").await;
    let room_id = h.create(&host).await;

    let err = h.service.create_room(&host, &json!({})).await.unwrap_err();
    assert!(matches!(err, ApplicationError::StateConflict(_)));
    assert_eq!(err.to_string(), format!("User already in room (id: {room_id})"));
    assert_eq!(h.service.with_registry(|r| r.room_count()).await, 1);
}

#[tokio::test]
async fn test_create_room_requires_object_payload() {
    let h = harness();
    let (host, _rx) = h.connect("host").await;

    let err = h.service.create_room(&host, &Value::Null).await.unwrap_err();
    assert!(matches!(err, ApplicationError::MalformedPayload(_)));
    assert_eq!(err.to_string(), "payload not an object");
    assert_eq!(h.service.with_registry(|r| r.user_count()).await, 0);
}

#[tokio::test]
async fn test_join_room_adds_client_and_updates_host() {
    let h = harness();
    let (host, mut host_rx) = h.connect("host").await;
    let (client, mut client_rx) = h.connect("client").await;
    let room_id = h.create(&host).await;
    host_rx.drain();

    assert!(h
        .service
        .with_registry(|registry| registry.user_by_session(&client).is_none())
        .await);

    let user_id = h
        .service
        .join_room(&client, &json!({"room_id": room_id.get(), "name": "Ada"}))
        .await
        .unwrap();

    let (bound_room, role, name) = h
        .service
        .with_registry(|registry| {
            let user = registry.user(user_id).unwrap();
            (user.room_id(), user.role(), user.name.to_string())
        })
        .await;
    assert_eq!(bound_room, Some(room_id));
    assert_eq!(role, Role::Client);
    assert_eq!(name, "Ada");
    assert_eq!(h.room_len(room_id).await, Some(2));

    assert_eq!(
        client_rx.drain(),
        vec![OutboundEvent::RoomJoin { user_id, room_id }]
    );
    let snapshot = last_update(&host_rx.drain());
    assert_eq!(snapshot.users_count, 2);
    assert_eq!(snapshot.users[1].user_id, user_id);
}

#[tokio::test]
async fn test_join_room_missing_room_id_changes_nothing() {
    let h = harness();
    let (host, _host_rx) = h.connect("host").await;
    let (client, _client_rx) = h.connect("client").await;
    let room_id = h.create(&host).await;

    let err = h.service.join_room(&client, &json!({})).await.unwrap_err();
    assert!(matches!(err, ApplicationError::MalformedPayload(_)));
    assert_eq!(err.to_string(), "missing key: room_id");

    assert_eq!(h.room_len(room_id).await, Some(1));
    assert_eq!(h.service.with_registry(|r| r.user_count()).await, 1);
}

#[tokio::test]
async fn test_join_unknown_room_sends_error_event() {
    let h = harness();
    let (host, _host_rx) = h.connect("host").await;
    let (client, mut client_rx) = h.connect("client").await;
    let room_id = h.create(&host).await;

    h.service
        .handle_event(&client, InboundEvent::JoinRoom, json!({"room_id": 999999}))
        .await;

    assert_eq!(
        client_rx.drain(),
        vec![OutboundEvent::error(
            "400 BAD REQUEST. No room with id: 999999"
        )]
    );
    assert_eq!(h.room_len(room_id).await, Some(1));
    assert!(h
        .service
        .with_registry(|registry| registry.user_by_session(&client).is_none())
        .await);
}

#[tokio::test]
async fn test_second_join_on_same_session_conflicts() {
    let h = harness();
    let (host, _host_rx) = h.connect("host").await;
    let (client, _client_rx) = h.connect("client").await;
    let room_id = h.create(&host).await;
    h.join(&client, room_id).await;

    let err = h
        .service
        .join_room(&client, &room_payload(room_id))
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::StateConflict(_)));
    assert_eq!(err.to_string(), format!("User already in room (id: {room_id})"));
    assert_eq!(h.room_len(room_id).await, Some(2));
}

#[tokio::test]
async fn test_join_forwards_existing_room_content() {
    let h = harness();
    let (host, _host_rx) = h.connect("host").await;
    let (client, mut client_rx) = h.connect("client").await;
    let room_id = h.create(&host).await;

    let steps = json!([{"title": "intro"}, {"title": "loops"}]);
    h.service
        .set_content(
            &host,
            &json!({"room_id": room_id.get(), "content": "print('hi')"}),
            ContentKind::Exercise,
        )
        .await
        .unwrap();
    h.service
        .set_content(
            &host,
            &json!({"room_id": room_id.get(), "content": steps.clone()}),
            ContentKind::Steps,
        )
        .await
        .unwrap();
    h.service
        .set_content(
            &host,
            &json!({"room_id": room_id.get(), "content": {}}),
            ContentKind::Settings,
        )
        .await
        .unwrap();

    let user_id = h.join(&client, room_id).await;

    assert_eq!(
        client_rx.drain(),
        vec![
            OutboundEvent::RoomJoin { user_id, room_id },
            OutboundEvent::Exercise {
                content: json!("print('hi')")
            },
            OutboundEvent::StepsAll(steps),
        ]
    );
}

#[tokio::test]
async fn test_set_content_is_host_only_and_forwarded_to_clients() {
    let h = harness();
    let (host, _host_rx) = h.connect("host").await;
    let (client, mut client_rx) = h.connect("client").await;
    let room_id = h.create(&host).await;
    h.join(&client, room_id).await;
    client_rx.drain();

    let settings = json!({"theme": "dark"});
    h.service
        .set_content(
            &host,
            &json!({"room_id": room_id.get(), "content": settings.clone()}),
            ContentKind::Settings,
        )
        .await
        .unwrap();
    assert_eq!(client_rx.drain(), vec![OutboundEvent::Settings(settings)]);

    let err = h
        .service
        .set_content(
            &client,
            &json!({"room_id": room_id.get(), "content": []}),
            ContentKind::Steps,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::StateConflict(_)));

    let err = h
        .service
        .set_content(&host, &room_payload(room_id), ContentKind::Exercise)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "missing key: content");
}

#[tokio::test]
async fn test_rejoin_rebinds_session_to_same_user() {
    let h = harness();
    let (host, mut host_rx) = h.connect("host").await;
    let (old, _old_rx) = h.connect("client-1").await;
    let (new, mut new_rx) = h.connect("client-2").await;
    let room_id = h.create(&host).await;
    let user_id = h.join(&old, room_id).await;

    h.service.disconnect(&old).await;
    host_rx.drain();

    h.service
        .reconnect(
            &new,
            &json!({"room_id": room_id.get(), "user_id": user_id.get()}),
            ReconnectCommand::Rejoin,
        )
        .await
        .unwrap();

    let (by_new, by_old, status) = h
        .service
        .with_registry(|registry| {
            (
                registry.user_by_session(&new).map(|user| user.id),
                registry.user_by_session(&old).map(|user| user.id),
                registry.user(user_id).map(|user| user.status),
            )
        })
        .await;
    assert_eq!(by_new, Some(user_id));
    assert_eq!(by_old, None);
    assert_eq!(status, Some(UserStatus::Online));

    assert_eq!(
        new_rx.drain(),
        vec![OutboundEvent::RoomJoin { user_id, room_id }]
    );
    let snapshot = last_update(&host_rx.drain());
    assert_eq!(snapshot.users[1].status, UserStatus::Online);
}

#[tokio::test]
async fn test_rehost_notifies_clients_and_reloads_steps() {
    let h = harness();
    let (host, _host_rx) = h.connect("host").await;
    let (client, mut client_rx) = h.connect("client").await;
    let (new_host, mut new_host_rx) = h.connect("host-2").await;
    let room_id = h.create(&host).await;
    let host_id = h.user_id(&host).await;

    let steps = json!([{"title": "intro"}]);
    h.service
        .set_content(
            &host,
            &json!({"room_id": room_id.get(), "content": steps.clone()}),
            ContentKind::Steps,
        )
        .await
        .unwrap();
    h.join(&client, room_id).await;
    client_rx.drain();

    h.service.disconnect(&host).await;
    assert_eq!(
        client_rx.drain(),
        vec![OutboundEvent::message("STATUS: The teacher is offline!")]
    );

    h.service
        .reconnect(
            &new_host,
            &json!({"room_id": room_id.get(), "user_id": host_id.get()}),
            ReconnectCommand::Rehost,
        )
        .await
        .unwrap();

    assert_eq!(
        client_rx.drain(),
        vec![OutboundEvent::message("The teacher has reconnected!")]
    );
    let events = new_host_rx.drain();
    assert_eq!(events[0], OutboundEvent::StepsLoad(steps));
    assert_eq!(last_update(&events).host_id, host_id);
    assert_eq!(h.user_id(&new_host).await, host_id);
}

#[tokio::test]
async fn test_reconnect_with_unknown_user_is_rejected() {
    let h = harness();
    let (host, _host_rx) = h.connect("host").await;
    let (client, _client_rx) = h.connect("client").await;
    let room_id = h.create(&host).await;

    let err = h
        .service
        .reconnect(
            &client,
            &json!({"room_id": room_id.get(), "user_id": 42}),
            ReconnectCommand::Rejoin,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::UnknownReference(_)));
    assert_eq!(err.to_string(), "No such user with id 42!");

    let err = h
        .service
        .reconnect(&client, &room_payload(room_id), ReconnectCommand::Rejoin)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "missing key: user_id");
}

#[tokio::test]
async fn test_negative_user_id_is_an_unknown_user() {
    let h = harness();
    let (host, _host_rx) = h.connect("host").await;
    let (other, _other_rx) = h.connect("other").await;
    let room_id = h.create(&host).await;

    let err = h
        .service
        .reconnect(
            &other,
            &json!({"room_id": room_id.get(), "user_id": -1}),
            ReconnectCommand::Rehost,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::UnknownReference(_)));
    assert_eq!(
        err.bad_request_message(),
        "400 BAD REQUEST. No such user with id -1!"
    );

    let err = h
        .service
        .kick_user(&host, &json!({"user_id": -1}))
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::UnknownReference(_)));
    assert_eq!(err.to_string(), "No such user with id -1!");
}

#[tokio::test]
async fn test_reconnect_requires_matching_role() {
    let h = harness();
    let (host, _host_rx) = h.connect("host").await;
    let (client, _client_rx) = h.connect("client").await;
    let (other, _other_rx) = h.connect("other").await;
    let room_id = h.create(&host).await;
    let host_id = h.user_id(&host).await;
    let client_id = h.join(&client, room_id).await;

    let err = h
        .service
        .reconnect(
            &other,
            &json!({"room_id": room_id.get(), "user_id": host_id.get()}),
            ReconnectCommand::Rejoin,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::StateConflict(_)));

    let err = h
        .service
        .reconnect(
            &other,
            &json!({"room_id": room_id.get(), "user_id": client_id.get()}),
            ReconnectCommand::Rehost,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::StateConflict(_)));
    assert_eq!(h.user_id(&host).await, host_id);
}

#[tokio::test]
async fn test_reconnect_onto_foreign_session_is_rejected() {
    let h = harness();
    let (host, _host_rx) = h.connect("host").await;
    let (a, _a_rx) = h.connect("a").await;
    let (b, _b_rx) = h.connect("b").await;
    let room_id = h.create(&host).await;
    let a_id = h.join(&a, room_id).await;
    let b_id = h.join(&b, room_id).await;

    let err = h
        .service
        .reconnect(
            &b,
            &json!({"room_id": room_id.get(), "user_id": a_id.get()}),
            ReconnectCommand::Rejoin,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::StateConflict(_)));
    assert_eq!(h.user_id(&a).await, a_id);
    assert_eq!(h.user_id(&b).await, b_id);
}

#[tokio::test]
async fn test_exit_room_removes_client() {
    let h = harness();
    let (host, mut host_rx) = h.connect("host").await;
    let (client, _client_rx) = h.connect("client").await;
    let room_id = h.create(&host).await;
    h.join(&client, room_id).await;
    host_rx.drain();

    h.service
        .exit_room(&client, &room_payload(room_id))
        .await
        .unwrap();

    assert_eq!(h.room_len(room_id).await, Some(1));
    assert_eq!(last_update(&host_rx.drain()).users_count, 1);

    let err = h
        .service
        .exit_room(&client, &room_payload(room_id))
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::UnknownReference(_)));
    assert_eq!(err.to_string(), "No user registered with session: client");
}

#[tokio::test]
async fn test_exit_room_rejects_host_and_non_members() {
    let h = harness();
    let (host_a, _a_rx) = h.connect("host-a").await;
    let (host_b, _b_rx) = h.connect("host-b").await;
    let (client, _client_rx) = h.connect("client").await;
    let room_a = h.create(&host_a).await;
    let room_b = h.create(&host_b).await;
    h.join(&client, room_a).await;

    let err = h
        .service
        .exit_room(&host_a, &room_payload(room_a))
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::StateConflict(_)));

    let err = h
        .service
        .exit_room(&client, &room_payload(room_b))
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::StateConflict(_)));
    assert_eq!(err.to_string(), format!("User is not in room (id: {room_b})"));
    assert_eq!(h.room_len(room_a).await, Some(2));
}

#[tokio::test]
async fn test_close_room_unbinds_every_member() {
    let h = harness();
    let (host, _host_rx) = h.connect("host").await;
    let (a, mut a_rx) = h.connect("a").await;
    let (b, mut b_rx) = h.connect("b").await;
    let room_id = h.create(&host).await;
    h.join(&a, room_id).await;
    h.join(&b, room_id).await;
    a_rx.drain();
    b_rx.drain();

    let err = h
        .service
        .close_room(&a, &room_payload(room_id))
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::StateConflict(_)));

    h.service
        .close_room(&host, &room_payload(room_id))
        .await
        .unwrap();

    let closed = OutboundEvent::room_closed("Room closed!");
    assert_eq!(a_rx.drain(), vec![closed.clone()]);
    assert_eq!(b_rx.drain(), vec![closed]);

    let (room_exists, bound) = h
        .service
        .with_registry(|registry| {
            let bound = [&host, &a, &b]
                .into_iter()
                .filter(|session| registry.user_by_session(session).is_some())
                .count();
            (registry.room(room_id).is_some(), bound)
        })
        .await;
    assert!(!room_exists);
    assert_eq!(bound, 0);
}

#[tokio::test]
async fn test_concurrent_close_is_a_benign_late_failure() {
    let h = harness_with(SessionSettings {
        close_grace: Duration::from_millis(20),
        ..quiet_settings()
    });
    let (host, _host_rx) = h.connect("host").await;
    let room_id = h.create(&host).await;
    let payload = room_payload(room_id);

    let (first, second) = tokio::join!(
        h.service.close_room(&host, &payload),
        h.service.close_room(&host, &payload)
    );
    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(h.service.with_registry(|r| r.room_count()).await, 0);
}

#[tokio::test]
async fn test_closing_room_refuses_join_and_rejoin() {
    let h = harness_with(SessionSettings {
        close_grace: Duration::from_millis(100),
        ..quiet_settings()
    });
    let (host, _host_rx) = h.connect("host").await;
    let (client, mut client_rx) = h.connect("client").await;
    let (late, mut late_rx) = h.connect("late").await;
    let room_id = h.create(&host).await;
    let user_id = h.join(&client, room_id).await;
    client_rx.drain();

    let service = Arc::clone(&h.service);
    let closer = host.clone();
    let closing =
        tokio::spawn(async move { service.close_room(&closer, &room_payload(room_id)).await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let err = h
        .service
        .join_room(&late, &room_payload(room_id))
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::StateConflict(_)));
    assert_eq!(err.to_string(), format!("Room (id: {room_id}) is closing"));

    let (reconnected, _reconnected_rx) = h.connect("client-again").await;
    let err = h
        .service
        .reconnect(
            &reconnected,
            &json!({"room_id": room_id.get(), "user_id": user_id.get()}),
            ReconnectCommand::Rejoin,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::StateConflict(_)));

    closing.await.unwrap().unwrap();
    assert!(late_rx.drain().is_empty());
    assert_eq!(
        client_rx.drain(),
        vec![OutboundEvent::room_closed("Room closed!")]
    );
    let (rooms, late_known) = h
        .service
        .with_registry(|registry| {
            (registry.room_count(), registry.user_by_session(&late).is_some())
        })
        .await;
    assert_eq!(rooms, 0);
    assert!(!late_known);
}

#[tokio::test]
async fn test_disconnect_keeps_membership() {
    let h = harness();
    let (host, mut host_rx) = h.connect("host").await;
    let (client, _client_rx) = h.connect("client").await;
    let room_id = h.create(&host).await;
    let user_id = h.join(&client, room_id).await;
    host_rx.drain();

    h.service.disconnect(&client).await;

    assert_eq!(h.room_len(room_id).await, Some(2));
    let status = h
        .service
        .with_registry(|registry| registry.user(user_id).map(|user| user.status))
        .await;
    assert_eq!(status, Some(UserStatus::Offline));
    assert_eq!(
        last_update(&host_rx.drain()).users[1].status,
        UserStatus::Offline
    );

    h.service.disconnect(&SessionId::from("nobody")).await;
    assert_eq!(h.service.with_registry(|r| r.user_count()).await, 2);
}

#[tokio::test]
async fn test_kick_user_applies_disconnect() {
    let h = harness();
    let (host, _host_rx) = h.connect("host").await;
    let (client, _client_rx) = h.connect("client").await;
    let room_id = h.create(&host).await;
    let user_id = h.join(&client, room_id).await;

    let err = h
        .service
        .kick_user(&client, &json!({"user_id": user_id.get()}))
        .await
        .unwrap_err();
    assert!(matches!(err, ApplicationError::StateConflict(_)));

    let err = h
        .service
        .kick_user(&host, &json!({"user_id": 77}))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("No such user id 77 in the room {room_id}")
    );

    h.service
        .kick_user(&host, &json!({"user_id": user_id.get()}))
        .await
        .unwrap();
    let status = h
        .service
        .with_registry(|registry| registry.user(user_id).map(|user| user.status))
        .await;
    assert_eq!(status, Some(UserStatus::Offline));
    assert_eq!(h.room_len(room_id).await, Some(2));
}

#[tokio::test]
async fn test_room_log_reports_census() {
    let opened_at = chrono::DateTime::parse_from_rfc3339("2024-09-01T08:30:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    let h = harness_with_clock(quiet_settings(), Arc::new(FixedClock(opened_at)));
    let (a, _a_rx) = h.connect("a").await;
    let (b, _b_rx) = h.connect("b").await;
    let (observer, mut observer_rx) = h.connect("observer").await;
    h.create(&a).await;
    h.create(&b).await;

    h.service
        .handle_event(&observer, InboundEvent::RoomLog, Value::Null)
        .await;

    match observer_rx.drain().as_slice() {
        [OutboundEvent::RoomLog(census)] => {
            assert_eq!(census.total_rooms_count, 2);
            assert!(census.rooms.iter().all(|room| room.users_count == 1));
            assert!(census.rooms.iter().all(|room| room.created_at == opened_at));
        }
        other => panic!("unexpected events: {other:?}"),
    }
}

#[tokio::test]
async fn test_room_log_can_be_disabled() {
    let h = harness_with(SessionSettings {
        diagnostics: false,
        ..quiet_settings()
    });
    let (observer, _rx) = h.connect("observer").await;

    let err = h.service.room_log(&observer).await.unwrap_err();
    assert!(matches!(err, ApplicationError::StateConflict(_)));
}

#[tokio::test]
async fn test_outdated_client_is_advised_but_admitted() {
    let h = harness_with(SessionSettings {
        min_client_version: Some("1.1.0".into()),
        ..quiet_settings()
    });
    let (host, _host_rx) = h.connect("host").await;
    let (client, mut client_rx) = h.connect("client").await;
    let room_id = h.create(&host).await;

    let user_id = h
        .service
        .join_room(&client, &json!({"room_id": room_id.get(), "version": "1.0.0"}))
        .await
        .unwrap();

    let events = client_rx.drain();
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], OutboundEvent::Message { message } if message.contains("1.1.0")));
    assert_eq!(events[1], OutboundEvent::RoomJoin { user_id, room_id });
}

#[tokio::test]
async fn test_audit_lines_are_broadcast_when_enabled() {
    let h = harness_with(SessionSettings {
        broadcast_audit: true,
        ..quiet_settings()
    });
    let (host, mut host_rx) = h.connect("host").await;
    let (_bystander, mut bystander_rx) = h.connect("bystander").await;

    let room_id = h.create(&host).await;

    let audit = OutboundEvent::log(format!("User host created room (id: {room_id})"));
    let host_events = host_rx.drain();
    assert!(matches!(host_events[0], OutboundEvent::RoomUpdate(_)));
    assert_eq!(host_events[1], audit);
    assert_eq!(bystander_rx.drain(), vec![audit]);
}

#[tokio::test]
async fn test_handle_text_reports_bad_frames() {
    let h = harness();
    let (session, mut rx) = h.connect("session").await;

    h.service.handle_text(&session, "not json").await;
    h.service
        .handle_text(&session, r#"{"event": "room/destroy", "data": {}}"#)
        .await;
    h.service
        .handle_text(&session, r#"{"event": "room/create"}"#)
        .await;

    let messages: Vec<String> = rx
        .drain()
        .into_iter()
        .map(|event| match event {
            OutboundEvent::Error { message } => message,
            other => panic!("unexpected event: {other:?}"),
        })
        .collect();
    assert_eq!(messages.len(), 3);
    assert!(messages[0].starts_with("400 BAD REQUEST. invalid frame"));
    assert_eq!(messages[1], "400 BAD REQUEST. Unknown event: room/destroy");
    assert_eq!(messages[2], "400 BAD REQUEST. payload not an object");
}
