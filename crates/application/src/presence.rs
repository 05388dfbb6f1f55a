use std::collections::HashMap;

use domain::{ConnectionId, UserId};

/// 在线状态注册表：用户 -> 当前活动连接
///
/// 注册表由事件循环独占持有，所有变更都在同一轮事件处理中同步完成，
/// 因此不需要任何锁。同一用户再次连接时后到者覆盖先到者。
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    entries: HashMap<UserId, ConnectionId>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入或替换映射，返回被替换掉的旧连接
    pub fn register(&mut self, user_id: UserId, connection_id: ConnectionId) -> Option<ConnectionId> {
        let replaced = self.entries.insert(user_id, connection_id);
        if let Some(previous) = replaced.filter(|previous| *previous != connection_id) {
            tracing::debug!(
                user_id = %user_id,
                previous = %previous,
                connection_id = %connection_id,
                "新连接覆盖旧的在线映射"
            );
        }
        replaced
    }

    /// 仅当存储的连接仍是 `connection_id` 时才移除，防止旧连接关闭时误删新映射
    pub fn unregister(&mut self, user_id: UserId, connection_id: ConnectionId) -> bool {
        match self.entries.get(&user_id) {
            Some(current) if *current == connection_id => {
                self.entries.remove(&user_id);
                true
            }
            Some(current) => {
                tracing::debug!(
                    user_id = %user_id,
                    closing = %connection_id,
                    current = %current,
                    "忽略过期连接的注销"
                );
                false
            }
            None => false,
        }
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.entries.contains_key(&user_id)
    }

    pub fn connection_of(&self, user_id: UserId) -> Option<ConnectionId> {
        self.entries.get(&user_id).copied()
    }

    /// 当前在线用户的有序快照
    pub fn snapshot(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.entries.keys().copied().collect();
        users.sort();
        users
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_then_stale_close_keeps_user_online() {
        let mut registry = PresenceRegistry::new();
        let u1 = UserId::generate();
        let c1 = ConnectionId::generate();
        let c2 = ConnectionId::generate();

        registry.register(u1, c1);
        assert_eq!(registry.register(u1, c2), Some(c1));

        assert!(!registry.unregister(u1, c1));
        assert!(registry.is_online(u1));
        assert_eq!(registry.connection_of(u1), Some(c2));

        assert!(registry.unregister(u1, c2));
        assert!(!registry.is_online(u1));
    }

    #[test]
    fn unregister_unknown_user_is_noop() {
        let mut registry = PresenceRegistry::new();
        assert!(!registry.unregister(UserId::generate(), ConnectionId::generate()));
        assert!(registry.is_empty());
    }

    #[test]
    fn snapshot_is_sorted_and_complete() {
        let mut registry = PresenceRegistry::new();
        let mut users: Vec<UserId> = (0..5).map(|_| UserId::generate()).collect();
        for user in &users {
            registry.register(*user, ConnectionId::generate());
        }
        users.sort();

        assert_eq!(registry.snapshot(), users);
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn last_write_wins_over_operation_sequences() {
        // 用一个朴素模型对照随机操作序列
        let users: Vec<UserId> = (0..4).map(|_| UserId::generate()).collect();
        let connections: Vec<ConnectionId> = (0..6).map(|_| ConnectionId::generate()).collect();
        let mut registry = PresenceRegistry::new();
        let mut model: HashMap<UserId, ConnectionId> = HashMap::new();

        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        for _ in 0..500 {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            let user = users[(seed % users.len() as u64) as usize];
            let connection = connections[((seed >> 8) % connections.len() as u64) as usize];

            if (seed >> 16) % 2 == 0 {
                registry.register(user, connection);
                model.insert(user, connection);
            } else {
                let expected = model.get(&user) == Some(&connection);
                if expected {
                    model.remove(&user);
                }
                assert_eq!(registry.unregister(user, connection), expected);
            }

            for user in &users {
                assert_eq!(registry.is_online(*user), model.contains_key(user));
                assert_eq!(registry.connection_of(*user), model.get(user).copied());
            }
        }
    }
}
