//! 身份注册表
//!
//! 维护进程内的全部房间与用户：
//! - 会话标识 -> 用户 的索引
//! - 用户 / 房间标识的分配（进程生命周期内不重复）
//! - 房间成员关系的增删（用户的房间绑定与房间成员列表同步修改）
//!
//! 注册表本身不加锁，由服务层用一把互斥锁保护，保证一次事件的校验与修改不被其他事件打断。

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Range;

use domain::{
    DisplayName, DomainError, MemberSummary, Role, Room, RoomCensus, RoomId, RoomSnapshot,
    RoomSummary, SessionId, Timestamp, User, UserId, UserStatus,
};
use rand::Rng;
use thiserror::Error;
use tracing::debug;

use crate::validation::RoomDirectory;

/// 随机分配房间号的默认区间
pub const DEFAULT_ROOM_ID_RANGE: Range<u64> = 1000..100_000;

/// 随机尝试次数，超过后顺序扫描空闲房间号
const RANDOM_ROOM_ID_ATTEMPTS: usize = 64;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("No room with id: {0}")]
    UnknownRoom(RoomId),
    #[error("No such user with id {0}!")]
    UnknownUser(UserId),
    #[error("Session {session} is already bound to user {user_id}")]
    SessionInUse { session: SessionId, user_id: UserId },
    #[error("no free room identifiers left")]
    IdentifiersExhausted,
    #[error(transparent)]
    Domain(#[from] DomainError),
}

pub struct SessionRegistry {
    users: HashMap<UserId, User>,
    sessions: HashMap<SessionId, UserId>,
    rooms: BTreeMap<RoomId, Room>,
    /// 已关闭房间的标识，不再分配
    retired_rooms: HashSet<RoomId>,
    room_id_range: Range<u64>,
    next_user_id: u64,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::with_room_id_range(DEFAULT_ROOM_ID_RANGE)
    }

    pub fn with_room_id_range(room_id_range: Range<u64>) -> Self {
        Self {
            users: HashMap::new(),
            sessions: HashMap::new(),
            rooms: BTreeMap::new(),
            retired_rooms: HashSet::new(),
            room_id_range,
            next_user_id: 1,
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn user(&self, user_id: UserId) -> Option<&User> {
        self.users.get(&user_id)
    }

    pub fn user_by_session(&self, session: &SessionId) -> Option<&User> {
        self.sessions
            .get(session)
            .and_then(|user_id| self.users.get(user_id))
    }

    pub fn room(&self, room_id: RoomId) -> Option<&Room> {
        self.rooms.get(&room_id)
    }

    pub fn room_mut(&mut self, room_id: RoomId) -> Option<&mut Room> {
        self.rooms.get_mut(&room_id)
    }

    fn is_room_id_taken(&self, room_id: RoomId) -> bool {
        self.rooms.contains_key(&room_id) || self.retired_rooms.contains(&room_id)
    }

    /// 选出一个未被使用过的房间号（不占用，调用方随后用 [`open_room`](Self::open_room) 落地）
    pub fn allocate_room_id(&self) -> Result<RoomId, RegistryError> {
        let range = self.room_id_range.clone();
        if range.is_empty() {
            return Err(RegistryError::IdentifiersExhausted);
        }

        let mut rng = rand::rng();
        for _ in 0..RANDOM_ROOM_ID_ATTEMPTS {
            let candidate = RoomId::new(rng.random_range(range.clone()));
            if !self.is_room_id_taken(candidate) {
                return Ok(candidate);
            }
        }

        range
            .map(RoomId::new)
            .find(|candidate| !self.is_room_id_taken(*candidate))
            .ok_or(RegistryError::IdentifiersExhausted)
    }

    /// 创建用户并登记会话索引
    pub fn register_user(
        &mut self,
        session: SessionId,
        role: Role,
        name: Option<DisplayName>,
    ) -> Result<UserId, RegistryError> {
        if let Some(&owner) = self.sessions.get(&session) {
            return Err(RegistryError::SessionInUse {
                session,
                user_id: owner,
            });
        }

        let user_id = UserId::new(self.next_user_id);
        self.next_user_id += 1;

        let name = match name {
            Some(name) => name,
            None => default_name(role)?,
        };
        self.sessions.insert(session.clone(), user_id);
        self.users
            .insert(user_id, User::new(user_id, session, role, name));
        Ok(user_id)
    }

    /// 以 `host_id` 为主持人建立房间，并把主持人加入成员列表
    pub fn open_room(
        &mut self,
        room_id: RoomId,
        host_id: UserId,
        created_at: Timestamp,
    ) -> Result<(), RegistryError> {
        let host = self
            .users
            .get(&host_id)
            .ok_or(RegistryError::UnknownUser(host_id))?;
        if !host.is_host() {
            return Err(DomainError::invalid_argument("role", "room owner must be a host").into());
        }
        if self.is_room_id_taken(room_id) {
            return Err(RegistryError::IdentifiersExhausted);
        }

        self.rooms
            .insert(room_id, Room::new(room_id, host_id, created_at));
        self.add_user(room_id, host_id)
    }

    /// 把用户加入房间，同时设置用户的房间绑定
    pub fn add_user(&mut self, room_id: RoomId, user_id: UserId) -> Result<(), RegistryError> {
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(RegistryError::UnknownRoom(room_id))?;
        let user = self
            .users
            .get_mut(&user_id)
            .ok_or(RegistryError::UnknownUser(user_id))?;

        user.bind_room(room_id)?;
        if let Err(err) = room.add_member(user_id) {
            user.unbind_room();
            return Err(err.into());
        }
        Ok(())
    }

    /// 房间内按用户标识查找成员
    pub fn member(&self, room_id: RoomId, user_id: UserId) -> Option<&User> {
        self.rooms
            .get(&room_id)
            .filter(|room| room.contains(user_id))
            .and_then(|_| self.users.get(&user_id))
    }

    /// 从房间移除用户并销毁该用户；返回 `false` 表示不是成员
    pub fn remove_user(&mut self, room_id: RoomId, user_id: UserId) -> Result<bool, RegistryError> {
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or(RegistryError::UnknownRoom(room_id))?;
        if !room.remove_member(user_id)? {
            return Ok(false);
        }

        if let Some(mut user) = self.users.remove(&user_id) {
            user.unbind_room();
            self.drop_session_index(&user);
        }
        Ok(true)
    }

    /// 删除房间及其全部成员，返回已解除绑定的成员
    pub fn close_room(&mut self, room_id: RoomId) -> Option<Vec<User>> {
        let mut room = self.rooms.remove(&room_id)?;
        self.retired_rooms.insert(room_id);

        let mut members = Vec::with_capacity(room.len());
        for user_id in room.drain_members() {
            if let Some(mut user) = self.users.remove(&user_id) {
                user.unbind_room();
                self.drop_session_index(&user);
                members.push(user);
            }
        }
        Some(members)
    }

    fn drop_session_index(&mut self, user: &User) {
        if self.sessions.get(&user.session_id) == Some(&user.id) {
            self.sessions.remove(&user.session_id);
        }
    }

    /// 把用户重新绑定到新的会话，返回旧会话。
    ///
    /// 旧会话的索引被移除，新会话立即可解析到该用户。新会话若已属于其他用户则拒绝，且不做任何修改。
    pub fn rebind_session(
        &mut self,
        user_id: UserId,
        new_session: SessionId,
    ) -> Result<SessionId, RegistryError> {
        if !self.users.contains_key(&user_id) {
            return Err(RegistryError::UnknownUser(user_id));
        }
        if let Some(&owner) = self.sessions.get(&new_session) {
            if owner != user_id {
                return Err(RegistryError::SessionInUse {
                    session: new_session,
                    user_id: owner,
                });
            }
        }

        let user = self
            .users
            .get_mut(&user_id)
            .ok_or(RegistryError::UnknownUser(user_id))?;
        let old_session = std::mem::replace(&mut user.session_id, new_session.clone());
        if self.sessions.get(&old_session) == Some(&user_id) {
            self.sessions.remove(&old_session);
        }
        self.sessions.insert(new_session, user_id);

        debug!(user_id = %user_id, old_session = %old_session, "session rebound");
        Ok(old_session)
    }

    pub fn set_status(&mut self, user_id: UserId, status: UserStatus) -> Result<(), RegistryError> {
        let user = self
            .users
            .get_mut(&user_id)
            .ok_or(RegistryError::UnknownUser(user_id))?;
        match status {
            UserStatus::Online => user.go_online(),
            UserStatus::Offline => user.go_offline(),
        }
        Ok(())
    }

    pub fn host_session(&self, room_id: RoomId) -> Option<SessionId> {
        let room = self.rooms.get(&room_id)?;
        self.users
            .get(&room.host_id())
            .map(|host| host.session_id.clone())
    }

    /// 房间内所有客户端（非主持人）的当前会话
    pub fn client_sessions(&self, room_id: RoomId) -> Vec<SessionId> {
        let Some(room) = self.rooms.get(&room_id) else {
            return Vec::new();
        };
        room.members()
            .iter()
            .filter_map(|user_id| self.users.get(user_id))
            .filter(|user| user.role() == Role::Client)
            .map(|user| user.session_id.clone())
            .collect()
    }

    pub fn snapshot(&self, room_id: RoomId) -> Option<RoomSnapshot> {
        let room = self.rooms.get(&room_id)?;
        let users: Vec<MemberSummary> = room
            .members()
            .iter()
            .filter_map(|user_id| self.users.get(user_id))
            .map(MemberSummary::from)
            .collect();
        Some(RoomSnapshot {
            room_id,
            host_id: room.host_id(),
            users_count: users.len(),
            users,
        })
    }

    pub fn census(&self) -> RoomCensus {
        RoomCensus {
            total_rooms_count: self.rooms.len(),
            rooms: self.rooms.values().map(RoomSummary::from).collect(),
        }
    }
}

impl RoomDirectory for SessionRegistry {
    fn room_exists(&self, room_id: RoomId) -> bool {
        self.rooms.contains_key(&room_id)
    }
}

fn default_name(role: Role) -> Result<DisplayName, RegistryError> {
    let name = match role {
        Role::Host => "Host".to_owned(),
        Role::Client => {
            let mut rng = rand::rng();
            let digits: String = (0..10)
                .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
                .collect();
            format!("Guest {digits}")
        }
    };
    Ok(DisplayName::parse(name)?)
}
