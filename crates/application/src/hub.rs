//! 在线状态事件循环
//!
//! 注册表、连接表和推送通道都由一个任务独占持有，外部只能通过
//! [`HubHandle`] 投递命令。连接打开、关闭、消息路由和已读回执因此在同一个
//! 队列里严格串行执行，不存在对注册表的并发读写。

use std::collections::HashMap;
use std::sync::Arc;

use domain::{Connection, ConnectionId, Message, UserId};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::delivery::{self, RouteOutcome};
use crate::error::ApplicationError;
use crate::events::{EventSink, SeenAck, ServerEvent};
use crate::lifecycle;
use crate::presence::PresenceRegistry;
use crate::seen;

#[derive(Debug)]
enum HubCommand {
    Connect {
        connection_id: ConnectionId,
        user_id: Option<UserId>,
        outbound: mpsc::UnboundedSender<ServerEvent>,
    },
    Disconnect {
        connection_id: ConnectionId,
    },
    Route {
        message: Message,
        reply: oneshot::Sender<RouteOutcome>,
    },
    Acknowledge {
        ack: SeenAck,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<UserId>>,
    },
}

/// 事件循环的句柄，可以随意克隆
#[derive(Debug, Clone)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    /// 登记一条新连接，返回连接标识和该连接的出站事件流
    pub fn connect(
        &self,
        user_id: Option<UserId>,
    ) -> Result<(ConnectionId, mpsc::UnboundedReceiver<ServerEvent>), ApplicationError> {
        let connection_id = ConnectionId::generate();
        let (outbound, events) = mpsc::unbounded_channel();
        self.send(HubCommand::Connect {
            connection_id,
            user_id,
            outbound,
        })?;
        Ok((connection_id, events))
    }

    pub fn disconnect(&self, connection_id: ConnectionId) -> Result<(), ApplicationError> {
        self.send(HubCommand::Disconnect { connection_id })
    }

    /// 把已持久化的消息推送给收件人的当前连接
    pub async fn route(&self, message: Message) -> Result<RouteOutcome, ApplicationError> {
        let (reply, outcome) = oneshot::channel();
        self.send(HubCommand::Route { message, reply })?;
        outcome.await.map_err(|_| ApplicationError::HubUnavailable)
    }

    pub fn acknowledge(&self, ack: SeenAck) -> Result<(), ApplicationError> {
        self.send(HubCommand::Acknowledge { ack })
    }

    pub async fn online_users(&self) -> Result<Vec<UserId>, ApplicationError> {
        let (reply, users) = oneshot::channel();
        self.send(HubCommand::Snapshot { reply })?;
        users.await.map_err(|_| ApplicationError::HubUnavailable)
    }

    fn send(&self, command: HubCommand) -> Result<(), ApplicationError> {
        self.commands
            .send(command)
            .map_err(|_| ApplicationError::HubUnavailable)
    }
}

/// 每条连接的出站通道
#[derive(Debug, Default)]
struct OutboundTable {
    senders: HashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>,
}

impl EventSink for OutboundTable {
    fn push(&mut self, connection_id: ConnectionId, event: ServerEvent) -> bool {
        let Some(sender) = self.senders.get(&connection_id) else {
            return false;
        };
        let name = event.name();
        if sender.send(event).is_err() {
            tracing::debug!(connection_id = %connection_id, event = name, "出站通道已关闭");
            return false;
        }
        true
    }

    fn broadcast(&mut self, event: &ServerEvent) -> usize {
        self.senders
            .values()
            .filter(|sender| sender.send(event.clone()).is_ok())
            .count()
    }
}

pub struct PresenceHub {
    registry: PresenceRegistry,
    connections: HashMap<ConnectionId, Connection>,
    outbound: OutboundTable,
    commands: mpsc::UnboundedReceiver<HubCommand>,
    clock: Arc<dyn Clock>,
}

impl PresenceHub {
    pub fn new(clock: Arc<dyn Clock>) -> (Self, HubHandle) {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let hub = Self {
            registry: PresenceRegistry::new(),
            connections: HashMap::new(),
            outbound: OutboundTable::default(),
            commands,
            clock,
        };
        (hub, HubHandle { commands: commands_tx })
    }

    /// 创建事件循环并在当前 tokio 运行时上启动
    pub fn spawn(clock: Arc<dyn Clock>) -> (HubHandle, JoinHandle<()>) {
        let (hub, handle) = Self::new(clock);
        let task = tokio::spawn(hub.run());
        (handle, task)
    }

    /// 处理命令直到所有句柄被丢弃
    pub async fn run(mut self) {
        tracing::info!("在线状态事件循环已启动");
        while let Some(command) = self.commands.recv().await {
            self.handle(command);
        }
        tracing::info!(open_connections = self.connections.len(), "在线状态事件循环已退出");
    }

    fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Connect {
                connection_id,
                user_id,
                outbound,
            } => self.on_connect(connection_id, user_id, outbound),
            HubCommand::Disconnect { connection_id } => self.on_disconnect(connection_id),
            HubCommand::Route { message, reply } => {
                let outcome = delivery::route(&self.registry, &mut self.outbound, &message);
                // 调用方可能已经放弃等待
                let _ = reply.send(outcome);
            }
            HubCommand::Acknowledge { ack } => {
                seen::acknowledge(&self.registry, &mut self.outbound, ack);
            }
            HubCommand::Snapshot { reply } => {
                let _ = reply.send(self.registry.snapshot());
            }
        }
    }

    fn on_connect(
        &mut self,
        connection_id: ConnectionId,
        user_id: Option<UserId>,
        outbound: mpsc::UnboundedSender<ServerEvent>,
    ) {
        self.outbound.senders.insert(connection_id, outbound);
        let mut connection = Connection::new(connection_id, user_id);
        if let Err(error) = lifecycle::on_open(
            &mut self.registry,
            &mut self.outbound,
            &mut connection,
            self.clock.now(),
        ) {
            tracing::warn!(connection_id = %connection_id, error = %error, "连接打开失败");
            self.outbound.senders.remove(&connection_id);
            return;
        }
        self.connections.insert(connection_id, connection);
    }

    fn on_disconnect(&mut self, connection_id: ConnectionId) {
        // 先摘掉出站通道，关闭中的连接不再收到广播
        self.outbound.senders.remove(&connection_id);
        let Some(mut connection) = self.connections.remove(&connection_id) else {
            tracing::debug!(connection_id = %connection_id, "重复的断开请求");
            return;
        };
        if let Err(error) = lifecycle::on_close(&mut self.registry, &mut self.outbound, &mut connection) {
            tracing::warn!(connection_id = %connection_id, error = %error, "连接关闭失败");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use chrono::Utc;
    use domain::{MessageBody, MessageId};
    use std::time::Duration;
    use tokio::time::timeout;

    fn start() -> HubHandle {
        let (handle, _task) = PresenceHub::spawn(Arc::new(SystemClock));
        handle
    }

    async fn next(events: &mut mpsc::UnboundedReceiver<ServerEvent>) -> ServerEvent {
        timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed")
    }

    fn sorted(mut users: Vec<UserId>) -> Vec<UserId> {
        users.sort();
        users
    }

    fn message(sender: UserId, recipient: UserId) -> Message {
        Message::new(
            MessageId::generate(),
            sender,
            recipient,
            MessageBody::new(Some("hi".into()), None).unwrap(),
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn connect_broadcasts_snapshot_to_everyone() {
        let hub = start();
        let (u1, u2) = (UserId::generate(), UserId::generate());

        let (_c1, mut e1) = hub.connect(Some(u1)).unwrap();
        assert_eq!(next(&mut e1).await, ServerEvent::OnlineUsers(vec![u1]));

        let (_c2, mut e2) = hub.connect(Some(u2)).unwrap();
        let both = sorted(vec![u1, u2]);
        assert_eq!(next(&mut e1).await, ServerEvent::OnlineUsers(both.clone()));
        assert_eq!(next(&mut e2).await, ServerEvent::OnlineUsers(both));
    }

    #[tokio::test]
    async fn stale_disconnect_keeps_user_online() {
        let hub = start();
        let user = UserId::generate();

        let (old, _old_events) = hub.connect(Some(user)).unwrap();
        let (new, mut new_events) = hub.connect(Some(user)).unwrap();
        hub.disconnect(old).unwrap();

        assert_eq!(hub.online_users().await.unwrap(), vec![user]);

        // 新连接依然能收到消息
        let outcome = hub.route(message(UserId::generate(), user)).await.unwrap();
        assert_eq!(outcome, RouteOutcome::Pushed(new));
        let mut saw_message = false;
        while let Ok(Some(event)) = timeout(Duration::from_millis(200), new_events.recv()).await {
            if matches!(event, ServerEvent::NewMessage(_)) {
                saw_message = true;
                break;
            }
        }
        assert!(saw_message);

        hub.disconnect(new).unwrap();
        assert!(hub.online_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn offline_route_and_duplicate_disconnect_are_harmless() {
        let hub = start();
        let user = UserId::generate();

        let outcome = hub.route(message(UserId::generate(), user)).await.unwrap();
        assert_eq!(outcome, RouteOutcome::Offline);

        let (connection, _events) = hub.connect(Some(user)).unwrap();
        hub.disconnect(connection).unwrap();
        hub.disconnect(connection).unwrap();
        assert!(hub.online_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dropped_receiver_makes_route_stale() {
        let hub = start();
        let user = UserId::generate();
        let (connection, events) = hub.connect(Some(user)).unwrap();
        drop(events);

        let outcome = hub.route(message(UserId::generate(), user)).await.unwrap();
        assert_eq!(outcome, RouteOutcome::Stale(connection));
    }

    #[tokio::test]
    async fn handle_fails_after_hub_stops() {
        let (hub, handle) = PresenceHub::new(Arc::new(SystemClock));
        drop(hub);

        assert!(matches!(handle.connect(None), Err(ApplicationError::HubUnavailable)));
        assert!(matches!(
            handle.online_users().await,
            Err(ApplicationError::HubUnavailable)
        ));
    }
}
