//! 连接生命周期：打开时登记在线并广播快照，关闭时按守卫条件注销并广播快照。

use domain::{Connection, DomainError, Timestamp};

use crate::events::{EventSink, ServerEvent};
use crate::presence::PresenceRegistry;

/// 连接进入 Open。带身份的连接登记到注册表；无论是否匿名都广播一次在线快照。
pub fn on_open<S: EventSink>(
    registry: &mut PresenceRegistry,
    sink: &mut S,
    connection: &mut Connection,
    now: Timestamp,
) -> Result<(), DomainError> {
    connection.open(now)?;

    match connection.user_id {
        Some(user_id) => {
            registry.register(user_id, connection.id);
            tracing::info!(
                user_id = %user_id,
                connection_id = %connection.id,
                online = registry.len(),
                "用户上线"
            );
        }
        None => {
            tracing::debug!(connection_id = %connection.id, "匿名连接已打开");
        }
    }

    let receivers = sink.broadcast(&ServerEvent::OnlineUsers(registry.snapshot()));
    tracing::debug!(receivers, "已广播在线用户快照");
    Ok(())
}

/// 连接进入 Closed。只有当注册表中存的仍是这条连接时才移除映射，
/// 带身份的连接关闭后总是广播一次快照。
pub fn on_close<S: EventSink>(
    registry: &mut PresenceRegistry,
    sink: &mut S,
    connection: &mut Connection,
) -> Result<(), DomainError> {
    connection.close()?;

    let Some(user_id) = connection.user_id else {
        tracing::debug!(connection_id = %connection.id, "匿名连接已关闭");
        return Ok(());
    };

    if registry.unregister(user_id, connection.id) {
        tracing::info!(
            user_id = %user_id,
            connection_id = %connection.id,
            online = registry.len(),
            "用户下线"
        );
    }

    sink.broadcast(&ServerEvent::OnlineUsers(registry.snapshot()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::testing::RecordingSink;
    use chrono::Utc;
    use domain::{ConnectionId, UserId};

    fn snapshots(sink: &RecordingSink, connection_id: ConnectionId) -> Vec<Vec<UserId>> {
        sink.events_for(connection_id)
            .into_iter()
            .filter_map(|event| match event {
                ServerEvent::OnlineUsers(users) => Some(users.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn two_users_see_each_other_come_online() {
        let mut registry = PresenceRegistry::new();
        let u1 = UserId::generate();
        let u2 = UserId::generate();
        let mut c1 = Connection::new(ConnectionId::generate(), Some(u1));
        let mut c2 = Connection::new(ConnectionId::generate(), Some(u2));

        let mut sink = RecordingSink::with_open(&[c1.id]);
        on_open(&mut registry, &mut sink, &mut c1, Utc::now()).unwrap();
        assert_eq!(snapshots(&sink, c1.id), vec![vec![u1]]);

        sink.open.insert(c2.id);
        on_open(&mut registry, &mut sink, &mut c2, Utc::now()).unwrap();

        let mut both = vec![u1, u2];
        both.sort();
        assert_eq!(snapshots(&sink, c1.id).last(), Some(&both));
        assert_eq!(snapshots(&sink, c2.id), vec![both]);
    }

    #[test]
    fn anonymous_connection_is_not_registered_but_still_receives_snapshot() {
        let mut registry = PresenceRegistry::new();
        let mut anonymous = Connection::new(ConnectionId::generate(), None);
        let mut sink = RecordingSink::with_open(&[anonymous.id]);

        on_open(&mut registry, &mut sink, &mut anonymous, Utc::now()).unwrap();

        assert!(registry.is_empty());
        assert_eq!(snapshots(&sink, anonymous.id), vec![Vec::<UserId>::new()]);

        sink.pushed.clear();
        on_close(&mut registry, &mut sink, &mut anonymous).unwrap();
        assert!(sink.pushed.is_empty());
    }

    #[test]
    fn stale_close_leaves_newer_connection_registered() {
        let mut registry = PresenceRegistry::new();
        let user = UserId::generate();
        let mut old = Connection::new(ConnectionId::generate(), Some(user));
        let mut new = Connection::new(ConnectionId::generate(), Some(user));
        let mut sink = RecordingSink::with_open(&[old.id, new.id]);

        on_open(&mut registry, &mut sink, &mut old, Utc::now()).unwrap();
        on_open(&mut registry, &mut sink, &mut new, Utc::now()).unwrap();

        sink.open.remove(&old.id);
        sink.pushed.clear();
        on_close(&mut registry, &mut sink, &mut old).unwrap();

        assert_eq!(registry.connection_of(user), Some(new.id));
        assert_eq!(snapshots(&sink, new.id), vec![vec![user]]);
    }

    #[test]
    fn last_close_broadcasts_empty_snapshot_to_remaining_listeners() {
        let mut registry = PresenceRegistry::new();
        let user = UserId::generate();
        let mut connection = Connection::new(ConnectionId::generate(), Some(user));
        let observer = ConnectionId::generate();
        let mut sink = RecordingSink::with_open(&[connection.id, observer]);

        on_open(&mut registry, &mut sink, &mut connection, Utc::now()).unwrap();
        sink.open.remove(&connection.id);
        on_close(&mut registry, &mut sink, &mut connection).unwrap();

        assert!(!registry.is_online(user));
        assert_eq!(snapshots(&sink, observer).last(), Some(&Vec::new()));
    }

    #[test]
    fn reopening_a_closed_connection_fails() {
        let mut registry = PresenceRegistry::new();
        let mut sink = RecordingSink::default();
        let mut connection = Connection::new(ConnectionId::generate(), Some(UserId::generate()));

        on_open(&mut registry, &mut sink, &mut connection, Utc::now()).unwrap();
        on_close(&mut registry, &mut sink, &mut connection).unwrap();

        assert!(on_open(&mut registry, &mut sink, &mut connection, Utc::now()).is_err());
        assert!(registry.is_empty());
    }
}
