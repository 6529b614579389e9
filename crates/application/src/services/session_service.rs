use std::sync::Arc;
use std::time::Duration;

use config::AppConfig;
use domain::{DisplayName, DomainError, Role, Room, RoomId, SessionId, UserId, UserStatus};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    clock::Clock,
    compat::check_client_version,
    error::{ApplicationError, ApplicationResult},
    notifier::{Notifier, OutboundEvent, Outbox},
    protocol::{ContentKind, InboundEvent, InboundFrame, ReconnectCommand},
    registry::{RegistryError, SessionRegistry},
    validation::{self, validate},
};

const ROOM_CLOSED: &str = "Room closed!";
const TEACHER_RECONNECTED: &str = "The teacher has reconnected!";
const TEACHER_OFFLINE: &str = "STATUS: The teacher is offline!";

/// 会话服务的运行参数
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// 广播 `room/closed` 之后删除房间前的等待时间
    pub close_grace: Duration,
    pub min_client_version: Option<String>,
    /// 是否响应 `room/log`
    pub diagnostics: bool,
    /// 审计日志是否以 `log` 事件广播
    pub broadcast_audit: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            close_grace: Duration::from_secs(2),
            min_client_version: None,
            diagnostics: true,
            broadcast_audit: true,
        }
    }
}

impl From<&AppConfig> for SessionSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            close_grace: config.session.close_grace(),
            min_client_version: config.session.min_client_version.clone(),
            diagnostics: config.session.diagnostics,
            broadcast_audit: config.logging.broadcast_audit,
        }
    }
}

pub struct SessionServiceDependencies {
    pub registry: SessionRegistry,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub settings: SessionSettings,
}

/// 房间/会话生命周期处理器。
///
/// 每个处理器在注册表锁内完成校验和修改，并把要发出的消息收集到 [`Outbox`]，
/// 释放锁之后再投递。同一事件的校验与修改因此不会和其他事件交错。
pub struct SessionService {
    registry: Mutex<SessionRegistry>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
}

impl SessionService {
    pub fn new(deps: SessionServiceDependencies) -> Self {
        Self {
            registry: Mutex::new(deps.registry),
            notifier: deps.notifier,
            clock: deps.clock,
            settings: deps.settings,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// 在锁内读取注册表
    pub async fn with_registry<R>(&self, f: impl FnOnce(&SessionRegistry) -> R) -> R {
        let registry = self.registry.lock().await;
        f(&registry)
    }

    /// 解析一帧文本并分发
    pub async fn handle_text(&self, session: &SessionId, text: &str) {
        let frame: InboundFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(err) => {
                let err = ApplicationError::malformed(format!("invalid frame: {err}"));
                self.report_error(session, "frame", &err).await;
                return;
            }
        };

        match frame.event.parse::<InboundEvent>() {
            Ok(event) => self.handle_event(session, event, frame.data).await,
            Err(err) => {
                let err = ApplicationError::malformed(err.to_string());
                self.report_error(session, &frame.event, &err).await;
            }
        }
    }

    /// 分发一个入站事件；处理失败时只通知来源会话
    pub async fn handle_event(&self, session: &SessionId, event: InboundEvent, payload: Value) {
        debug!(session_id = %session, event = %event, "inbound event");

        let result = match event {
            InboundEvent::CreateRoom => self.create_room(session, &payload).await.map(drop),
            InboundEvent::JoinRoom => self.join_room(session, &payload).await.map(drop),
            InboundEvent::Reconnect(command) => self.reconnect(session, &payload, command).await,
            InboundEvent::ExitRoom => self.exit_room(session, &payload).await,
            InboundEvent::CloseRoom => self.close_room(session, &payload).await,
            InboundEvent::KickUser => self.kick_user(session, &payload).await,
            InboundEvent::RoomLog => self.room_log(session).await,
            InboundEvent::SetContent(kind) => self.set_content(session, &payload, kind).await,
        };

        if let Err(err) = result {
            self.report_error(session, event.as_str(), &err).await;
        }
    }

    async fn report_error(&self, session: &SessionId, event: &str, err: &ApplicationError) {
        error!(session_id = %session, event, error = %err, "Bad request occurred");
        if let Err(notify_err) = self
            .notifier
            .send_to(session, OutboundEvent::error(err.bad_request_message()))
            .await
        {
            warn!(session_id = %session, error = %notify_err, "failed to deliver error event");
        }
    }

    fn audit(&self, outbox: &mut Outbox, message: String) {
        info!(target: "audit", "{message}");
        if self.settings.broadcast_audit {
            outbox.everyone(OutboundEvent::log(message));
        }
    }

    pub async fn create_room(
        &self,
        session: &SessionId,
        payload: &Value,
    ) -> ApplicationResult<RoomId> {
        let mut outbox = Outbox::new();
        let room_id = {
            let mut registry = self.registry.lock().await;
            validate(payload, &[], &*registry)?;
            ensure_unbound(&registry, session)?;
            let name = display_name(payload)?;

            let room_id = registry.allocate_room_id()?;
            let host_id = registry.register_user(session.clone(), Role::Host, name)?;
            registry.open_room(room_id, host_id, self.clock.now())?;

            push_host_update(&registry, &mut outbox, room_id);
            self.audit(&mut outbox, format!("User {session} created room (id: {room_id})"));
            room_id
        };

        outbox.deliver(self.notifier.as_ref()).await;
        Ok(room_id)
    }

    pub async fn join_room(
        &self,
        session: &SessionId,
        payload: &Value,
    ) -> ApplicationResult<UserId> {
        let mut outbox = Outbox::new();
        let user_id = {
            let mut registry = self.registry.lock().await;
            validate(payload, &["room_id"], &*registry)?;
            let room_id = validation::room_id(payload)?;
            ensure_open(&registry, room_id)?;
            let advice = check_client_version(
                self.settings.min_client_version.as_deref(),
                validation::optional_str(payload, "version"),
            );
            ensure_unbound(&registry, session)?;
            let name = display_name(payload)?;

            let user_id = registry.register_user(session.clone(), Role::Client, name)?;
            registry.add_user(room_id, user_id)?;

            if let Some(notice) = advice.notice() {
                outbox.to(session, OutboundEvent::message(notice));
                self.audit(
                    &mut outbox,
                    format!("User {user_id} joined with an outdated client version"),
                );
            }
            outbox.to(session, OutboundEvent::RoomJoin { user_id, room_id });
            let room = registry
                .room(room_id)
                .ok_or(RegistryError::UnknownRoom(room_id))?;
            self.push_room_content(room, session, user_id, &mut outbox);
            push_host_update(&registry, &mut outbox, room_id);
            self.audit(
                &mut outbox,
                format!("User {user_id} has joined the Room with id: {room_id}"),
            );
            user_id
        };

        outbox.deliver(self.notifier.as_ref()).await;
        Ok(user_id)
    }

    /// 把房间里已有的练习、步骤和设置发给单个客户端
    fn push_room_content(
        &self,
        room: &Room,
        session: &SessionId,
        user_id: UserId,
        outbox: &mut Outbox,
    ) {
        if let Some(exercise) = room.exercise() {
            outbox.to(
                session,
                OutboundEvent::Exercise {
                    content: exercise.clone(),
                },
            );
            self.audit(
                outbox,
                format!("The exercise was sent to the student (id: {user_id})!"),
            );
        }
        if let Some(steps) = room.steps() {
            outbox.to(session, OutboundEvent::StepsAll(steps.clone()));
            self.audit(
                outbox,
                format!("The steps were sent to the student (id: {user_id})!"),
            );
        }
        if let Some(settings) = room.settings() {
            outbox.to(session, OutboundEvent::Settings(settings.clone()));
            self.audit(
                outbox,
                format!("The settings were sent to the student (id: {user_id})!"),
            );
        }
    }

    /// `rejoin` / `rehost`：把已有用户重新绑定到当前会话
    pub async fn reconnect(
        &self,
        session: &SessionId,
        payload: &Value,
        command: ReconnectCommand,
    ) -> ApplicationResult<()> {
        let mut outbox = Outbox::new();
        {
            let mut registry = self.registry.lock().await;
            validate(payload, &["room_id", "user_id"], &*registry)?;
            let room_id = validation::room_id(payload)?;
            let user_id = validation::user_id(payload)?;
            ensure_open(&registry, room_id)?;

            let user = registry.member(room_id, user_id).ok_or_else(|| {
                ApplicationError::unknown(format!("No such user with id {user_id}!"))
            })?;
            match (command, user.role()) {
                (ReconnectCommand::Rejoin, Role::Client)
                | (ReconnectCommand::Rehost, Role::Host) => {}
                (ReconnectCommand::Rejoin, Role::Host) => {
                    return Err(ApplicationError::conflict(format!(
                        "User {user_id} is the host of room {room_id}, use rehost"
                    )));
                }
                (ReconnectCommand::Rehost, Role::Client) => {
                    return Err(ApplicationError::conflict(format!(
                        "User {user_id} is not the host of room {room_id}"
                    )));
                }
            }
            let name = user.name.to_string();

            let previous = registry.rebind_session(user_id, session.clone())?;
            registry.set_status(user_id, UserStatus::Online)?;
            debug!(
                user_id = %user_id,
                previous_session = %previous,
                session_id = %session,
                "user reconnected"
            );

            let room = registry
                .room(room_id)
                .ok_or(RegistryError::UnknownRoom(room_id))?;
            match command {
                ReconnectCommand::Rejoin => {
                    outbox.to(session, OutboundEvent::RoomJoin { user_id, room_id });
                    self.push_room_content(room, session, user_id, &mut outbox);
                    self.audit(
                        &mut outbox,
                        format!("Student {name} with id {user_id} reconnected!"),
                    );
                }
                ReconnectCommand::Rehost => {
                    let clients = registry.client_sessions(room_id);
                    outbox.to_all(&clients, &OutboundEvent::message(TEACHER_RECONNECTED));
                    if let Some(steps) = room.steps() {
                        outbox.to(session, OutboundEvent::StepsLoad(steps.clone()));
                    }
                    self.audit(
                        &mut outbox,
                        format!("Host {name} with id {user_id} reconnected!"),
                    );
                }
            }
            push_host_update(&registry, &mut outbox, room_id);
        }

        outbox.deliver(self.notifier.as_ref()).await;
        Ok(())
    }

    /// 客户端主动离开房间，离开后用户被销毁
    pub async fn exit_room(&self, session: &SessionId, payload: &Value) -> ApplicationResult<()> {
        let mut outbox = Outbox::new();
        {
            let mut registry = self.registry.lock().await;
            validate(payload, &["room_id"], &*registry)?;
            let room_id = validation::room_id(payload)?;

            let user = registry.user_by_session(session).ok_or_else(|| {
                ApplicationError::unknown(format!("No user registered with session: {session}"))
            })?;
            let user_id = user.id;

            if !registry.remove_user(room_id, user_id)? {
                return Err(ApplicationError::conflict(
                    DomainError::UserNotInRoom { room_id }.to_string(),
                ));
            }

            push_host_update(&registry, &mut outbox, room_id);
            self.audit(
                &mut outbox,
                format!("User {user_id} has left the Room with id: {room_id}"),
            );
        }

        outbox.deliver(self.notifier.as_ref()).await;
        Ok(())
    }

    /// 主持人关闭房间：先通知客户端，等待宽限期后删除房间及全部成员
    pub async fn close_room(&self, session: &SessionId, payload: &Value) -> ApplicationResult<()> {
        let mut outbox = Outbox::new();
        let room_id = {
            let mut registry = self.registry.lock().await;
            validate(payload, &["room_id"], &*registry)?;
            let room_id = validation::room_id(payload)?;
            ensure_host(&registry, session, room_id)?;

            if let Some(room) = registry.room_mut(room_id) {
                room.mark_closing();
            }
            let clients = registry.client_sessions(room_id);
            outbox.to_all(&clients, &OutboundEvent::room_closed(ROOM_CLOSED));
            room_id
        };
        outbox.deliver(self.notifier.as_ref()).await;

        self.await_close_grace().await;

        let mut outbox = Outbox::new();
        {
            let mut registry = self.registry.lock().await;
            match registry.close_room(room_id) {
                Some(members) => {
                    debug!(room_id = %room_id, members = members.len(), "room removed");
                    self.audit(
                        &mut outbox,
                        format!("Room with id: {room_id} has been closed!"),
                    );
                }
                None => {
                    warn!(room_id = %room_id, "room disappeared during the close grace period");
                }
            }
        }
        outbox.deliver(self.notifier.as_ref()).await;
        Ok(())
    }

    /// 给已发出的 `room/closed` 留出送达时间
    async fn await_close_grace(&self) {
        if !self.settings.close_grace.is_zero() {
            tokio::time::sleep(self.settings.close_grace).await;
        }
    }

    /// 连接断开：标记离线，成员关系保持不变
    pub async fn disconnect(&self, session: &SessionId) {
        let mut outbox = Outbox::new();
        {
            let mut registry = self.registry.lock().await;
            let Some(user) = registry.user_by_session(session) else {
                debug!(session_id = %session, "disconnect from unregistered session");
                return;
            };
            let Some(room_id) = user.room_id() else {
                return;
            };
            let user_id = user.id;

            if let Err(err) = self.mark_offline(&mut registry, &mut outbox, user_id, room_id) {
                warn!(session_id = %session, error = %err, "failed to apply disconnect");
                return;
            }
        }
        outbox.deliver(self.notifier.as_ref()).await;
    }

    fn mark_offline(
        &self,
        registry: &mut SessionRegistry,
        outbox: &mut Outbox,
        user_id: UserId,
        room_id: RoomId,
    ) -> ApplicationResult<()> {
        registry.set_status(user_id, UserStatus::Offline)?;
        let is_host = registry
            .room(room_id)
            .is_some_and(|room| room.host_id() == user_id);

        if is_host {
            let clients = registry.client_sessions(room_id);
            outbox.to_all(&clients, &OutboundEvent::message(TEACHER_OFFLINE));
            self.audit(
                outbox,
                format!("Teacher disconnected (host id: {user_id}, room id: {room_id})"),
            );
        } else {
            push_host_update(registry, outbox, room_id);
            self.audit(
                outbox,
                format!("Student disconnected (id: {user_id}, room id: {room_id})"),
            );
        }
        Ok(())
    }

    /// 主持人把房间内某个用户按断线处理
    pub async fn kick_user(&self, session: &SessionId, payload: &Value) -> ApplicationResult<()> {
        let mut outbox = Outbox::new();
        {
            let mut registry = self.registry.lock().await;
            validate(payload, &["user_id"], &*registry)?;
            let target_id = validation::user_id(payload)?;

            let room_id = registry
                .user_by_session(session)
                .filter(|user| user.is_host())
                .and_then(|host| host.room_id())
                .ok_or_else(|| {
                    ApplicationError::conflict(format!(
                        "No host registered with session: {session}"
                    ))
                })?;
            if registry.member(room_id, target_id).is_none() {
                return Err(ApplicationError::unknown(format!(
                    "No such user id {target_id} in the room {room_id}"
                )));
            }

            self.mark_offline(&mut registry, &mut outbox, target_id, room_id)?;
        }

        outbox.deliver(self.notifier.as_ref()).await;
        Ok(())
    }

    /// 诊断：当前所有房间的统计
    pub async fn room_log(&self, session: &SessionId) -> ApplicationResult<()> {
        if !self.settings.diagnostics {
            return Err(ApplicationError::conflict("room/log is disabled"));
        }

        let census = self.registry.lock().await.census();
        let mut outbox = Outbox::new();
        outbox.to(session, OutboundEvent::RoomLog(census));
        outbox.deliver(self.notifier.as_ref()).await;
        Ok(())
    }

    /// 主持人设置练习、步骤或设置，原样保存并转发给所有客户端
    pub async fn set_content(
        &self,
        session: &SessionId,
        payload: &Value,
        kind: ContentKind,
    ) -> ApplicationResult<()> {
        let mut outbox = Outbox::new();
        {
            let mut registry = self.registry.lock().await;
            validate(payload, &["room_id", "content"], &*registry)?;
            let room_id = validation::room_id(payload)?;
            let content = payload.get("content").cloned().unwrap_or(Value::Null);
            ensure_host(&registry, session, room_id)?;

            let clients = registry.client_sessions(room_id);
            let room = registry
                .room_mut(room_id)
                .ok_or(RegistryError::UnknownRoom(room_id))?;
            let event = match kind {
                ContentKind::Exercise => {
                    room.set_exercise(content.clone());
                    OutboundEvent::Exercise { content }
                }
                ContentKind::Steps => {
                    room.set_steps(content.clone());
                    OutboundEvent::StepsAll(content)
                }
                ContentKind::Settings => {
                    room.set_settings(content.clone());
                    OutboundEvent::Settings(content)
                }
            };

            let name = event.name();
            outbox.to_all(&clients, &event);
            self.audit(
                &mut outbox,
                format!(
                    "Host updated {name} of room (id: {room_id}), sent to {} students",
                    clients.len()
                ),
            );
        }

        outbox.deliver(self.notifier.as_ref()).await;
        Ok(())
    }
}

/// 会话已绑定到某个房间时拒绝再次创建或加入
fn ensure_unbound(registry: &SessionRegistry, session: &SessionId) -> ApplicationResult<()> {
    match registry.user_by_session(session).and_then(|user| user.room_id()) {
        Some(room_id) => Err(ApplicationError::conflict(
            DomainError::UserAlreadyInRoom { room_id }.to_string(),
        )),
        None => Ok(()),
    }
}

/// 房间进入关闭宽限期后拒绝加入和重连
fn ensure_open(registry: &SessionRegistry, room_id: RoomId) -> ApplicationResult<()> {
    match registry.room(room_id).map(Room::ensure_open) {
        Some(Err(err)) => Err(ApplicationError::conflict(err.to_string())),
        _ => Ok(()),
    }
}

fn ensure_host(
    registry: &SessionRegistry,
    session: &SessionId,
    room_id: RoomId,
) -> ApplicationResult<()> {
    let room = registry
        .room(room_id)
        .ok_or(RegistryError::UnknownRoom(room_id))?;
    match registry.user_by_session(session) {
        Some(user) if user.id == room.host_id() => Ok(()),
        _ => Err(ApplicationError::conflict(format!(
            "Only the host can manage room (id: {room_id})"
        ))),
    }
}

fn display_name(payload: &Value) -> ApplicationResult<Option<DisplayName>> {
    validation::optional_str(payload, "name")
        .map(DisplayName::parse)
        .transpose()
        .map_err(|err| ApplicationError::malformed(err.to_string()))
}

fn push_host_update(registry: &SessionRegistry, outbox: &mut Outbox, room_id: RoomId) {
    let host = registry.host_session(room_id);
    if let (Some(host), Some(snapshot)) = (host, registry.snapshot(room_id)) {
        outbox.to(&host, OutboundEvent::RoomUpdate(snapshot));
    }
}
