//! 实时连接实体
//!
//! 每个连接遵循 `Connecting -> Open -> Closed` 状态机，Closed 为终态。
//! 握手未完成即放弃时允许 `Connecting -> Closed`。

use crate::errors::DomainError;
use crate::value_objects::{ConnectionId, Timestamp, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub id: ConnectionId,
    /// 握手时携带的身份；缺失时为匿名连接
    pub user_id: Option<UserId>,
    pub opened_at: Option<Timestamp>,
    state: ConnectionState,
}

impl Connection {
    pub fn new(id: ConnectionId, user_id: Option<UserId>) -> Self {
        Self {
            id,
            user_id,
            opened_at: None,
            state: ConnectionState::Connecting,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn open(&mut self, now: Timestamp) -> Result<(), DomainError> {
        self.transition(ConnectionState::Open)?;
        self.opened_at = Some(now);
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), DomainError> {
        self.transition(ConnectionState::Closed)
    }

    fn transition(&mut self, to: ConnectionState) -> Result<(), DomainError> {
        let allowed = matches!(
            (self.state, to),
            (ConnectionState::Connecting, ConnectionState::Open)
                | (ConnectionState::Connecting, ConnectionState::Closed)
                | (ConnectionState::Open, ConnectionState::Closed)
        );
        if !allowed {
            return Err(DomainError::InvalidConnectionTransition {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn follows_connecting_open_closed() {
        let mut connection = Connection::new(ConnectionId::generate(), Some(UserId::generate()));
        assert!(!connection.is_open());
        assert!(connection.opened_at.is_none());

        connection.open(Utc::now()).unwrap();
        assert!(connection.is_open());
        assert!(connection.opened_at.is_some());

        connection.close().unwrap();
        assert!(!connection.is_open());
        assert_eq!(
            connection.close(),
            Err(DomainError::InvalidConnectionTransition {
                from: ConnectionState::Closed,
                to: ConnectionState::Closed,
            })
        );
    }

    #[test]
    fn closed_is_terminal() {
        let mut connection = Connection::new(ConnectionId::generate(), None);
        connection.close().unwrap();

        assert_eq!(
            connection.open(Utc::now()),
            Err(DomainError::InvalidConnectionTransition {
                from: ConnectionState::Closed,
                to: ConnectionState::Open,
            })
        );
        assert!(connection.close().is_err());
    }

    #[test]
    fn cannot_open_twice() {
        let mut connection = Connection::new(ConnectionId::generate(), None);
        connection.open(Utc::now()).unwrap();
        assert_eq!(
            connection.open(Utc::now()),
            Err(DomainError::InvalidConnectionTransition {
                from: ConnectionState::Open,
                to: ConnectionState::Open,
            })
        );
    }
}
