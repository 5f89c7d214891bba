//! 事件系统模块 - 处理同步核心中的各种事件
//!
//! 功能包括：
//! - 新消息推送事件
//! - 发送确认（临时 ID → 服务端 ID 绑定）事件
//! - 投递/已读状态更新事件
//! - 在线状态（Presence）事件
//! - 正在输入（Typing）事件
//! - 事件广播和订阅机制
//!
//! 事件是封闭的和类型（sum type）：新增事件种类必须穷尽所有
//! match 分支，畸形负载在这一层无法被构造出来，传输绑定负责
//! 在构造事件之前完成线上格式校验。

use crate::entities::{Message, UserStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// 投递状态（delivery:update 事件的负载）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeliveryStatus {
    Delivered,
    Read,
}

/// 聊天事件
///
/// 除 PresenceUpdate（按用户维度）外，每个事件都携带所属会话 ID，
/// 消费者据此做常数时间过滤。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChatEvent {
    /// 新消息（完整消息记录）
    MessageNew(Message),
    /// 发送确认：把临时 ID 绑定到服务端 ID
    MessageAck {
        temp_id: String,
        server_id: String,
        created_at: DateTime<Utc>,
        conversation_id: String,
    },
    /// 投递/已读状态更新
    DeliveryUpdate {
        conversation_id: String,
        message_id: String,
        status: DeliveryStatus,
        read_at: DateTime<Utc>,
    },
    /// 用户在线状态变更
    PresenceUpdate {
        user_id: String,
        status: UserStatus,
        last_seen: DateTime<Utc>,
    },
    /// 正在输入状态变更
    TypingUpdate {
        conversation_id: String,
        user_id: String,
        is_typing: bool,
    },
}

impl ChatEvent {
    /// 获取事件类型字符串（线上标签）
    pub fn event_type(&self) -> &'static str {
        match self {
            ChatEvent::MessageNew(_) => "message:new",
            ChatEvent::MessageAck { .. } => "message:ack",
            ChatEvent::DeliveryUpdate { .. } => "delivery:update",
            ChatEvent::PresenceUpdate { .. } => "presence:update",
            ChatEvent::TypingUpdate { .. } => "typing:update",
        }
    }

    /// 获取事件关联的会话 ID
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            ChatEvent::MessageNew(msg) => Some(&msg.conversation_id),
            ChatEvent::MessageAck {
                conversation_id, ..
            } => Some(conversation_id),
            ChatEvent::DeliveryUpdate {
                conversation_id, ..
            } => Some(conversation_id),
            // Presence 是用户维度的事件，没有会话信息
            ChatEvent::PresenceUpdate { .. } => None,
            ChatEvent::TypingUpdate {
                conversation_id, ..
            } => Some(conversation_id),
        }
    }

    /// 获取事件相关的用户 ID
    pub fn user_id(&self) -> Option<&str> {
        match self {
            ChatEvent::MessageNew(msg) => Some(&msg.sender_id),
            ChatEvent::MessageAck { .. } => None,
            ChatEvent::DeliveryUpdate { .. } => None,
            ChatEvent::PresenceUpdate { user_id, .. } => Some(user_id),
            ChatEvent::TypingUpdate { user_id, .. } => Some(user_id),
        }
    }
}

/// 事件过滤器
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// 事件类型过滤器
    pub event_types: Option<Vec<String>>,
    /// 会话 ID 过滤器
    pub conversation_ids: Option<Vec<String>>,
    /// 用户 ID 过滤器
    pub user_ids: Option<Vec<String>>,
}

impl EventFilter {
    /// 创建新的事件过滤器
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加事件类型过滤
    pub fn with_event_types(mut self, event_types: Vec<String>) -> Self {
        self.event_types = Some(event_types);
        self
    }

    /// 添加会话 ID 过滤
    pub fn with_conversation_ids(mut self, conversation_ids: Vec<String>) -> Self {
        self.conversation_ids = Some(conversation_ids);
        self
    }

    /// 添加用户 ID 过滤
    pub fn with_user_ids(mut self, user_ids: Vec<String>) -> Self {
        self.user_ids = Some(user_ids);
        self
    }

    /// 检查事件是否匹配过滤器
    pub fn matches(&self, event: &ChatEvent) -> bool {
        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }

        if let Some(ref conversation_ids) = self.conversation_ids {
            match event.conversation_id() {
                Some(conversation_id) => {
                    if !conversation_ids.iter().any(|c| c == conversation_id) {
                        return false;
                    }
                }
                // 事件没有会话 ID 但过滤器要求有
                None => return false,
            }
        }

        if let Some(ref user_ids) = self.user_ids {
            match event.user_id() {
                Some(user_id) => {
                    if !user_ids.iter().any(|u| u == user_id) {
                        return false;
                    }
                }
                // 事件没有用户 ID 但过滤器要求有
                None => return false,
            }
        }

        true
    }
}

/// 事件统计信息
#[derive(Debug, Clone, Default)]
pub struct EventStats {
    /// 总事件数
    pub total_events: u64,
    /// 按类型分组的事件数
    pub events_by_type: HashMap<String, u64>,
    /// 最后事件时间（UNIX 毫秒）
    pub last_event_time: Option<i64>,
}

/// 事件管理器
///
/// 基于 `tokio::sync::broadcast` 的扇出分发：每个订阅者独立收到
/// 全部事件（fan-out，不是竞争消费），过滤是各消费者自己的责任。
/// 没有中央路由表。
pub struct EventManager {
    /// 广播发送器
    sender: broadcast::Sender<ChatEvent>,
    /// 事件统计
    stats: Arc<tokio::sync::RwLock<EventStats>>,
}

impl EventManager {
    /// 创建新的事件管理器
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);

        Self {
            sender,
            stats: Arc::new(tokio::sync::RwLock::new(EventStats::default())),
        }
    }

    /// 发布事件
    ///
    /// 所有订阅者按发射顺序收到同一事件。
    pub async fn emit(&self, event: ChatEvent) {
        debug!("Emitting event: {}", event.event_type());

        // 更新统计
        {
            let mut stats = self.stats.write().await;
            stats.total_events += 1;
            *stats
                .events_by_type
                .entry(event.event_type().to_string())
                .or_insert(0) += 1;
            stats.last_event_time = Some(Utc::now().timestamp_millis());
        }

        // 广播事件（无订阅者时 send 会失败，属正常场景如无 UI 客户端，仅打 debug）
        if let Err(e) = self.sender.send(event) {
            debug!("Failed to broadcast event (no active receivers): {}", e);
        }
    }

    /// 订阅事件
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.sender.subscribe()
    }

    /// 订阅过滤后的事件
    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredEventReceiver {
        FilteredEventReceiver::new(self.sender.subscribe(), filter)
    }

    /// 获取活跃订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// 获取事件统计
    pub async fn get_stats(&self) -> EventStats {
        self.stats.read().await.clone()
    }
}

/// 过滤事件接收器
///
/// 包装一个广播接收端，跳过不匹配过滤器的事件。
pub struct FilteredEventReceiver {
    receiver: broadcast::Receiver<ChatEvent>,
    filter: EventFilter,
}

impl FilteredEventReceiver {
    /// 创建新的过滤事件接收器
    pub fn new(receiver: broadcast::Receiver<ChatEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// 接收下一个匹配的事件
    pub async fn recv(&mut self) -> Result<ChatEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// 尝试接收事件（非阻塞）
    pub fn try_recv(&mut self) -> Result<ChatEvent, broadcast::error::TryRecvError> {
        loop {
            let event = self.receiver.try_recv()?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::MessageStatus;

    fn sample_message(conversation_id: &str, sender_id: &str) -> Message {
        Message {
            id: "msg-1".to_string(),
            temp_id: None,
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            body: "hello".to_string(),
            created_at: Utc::now(),
            status: MessageStatus::Sent,
        }
    }

    #[tokio::test]
    async fn test_event_manager_basic_functionality() {
        let manager = EventManager::new(100);

        let mut receiver = manager.subscribe();

        manager
            .emit(ChatEvent::MessageNew(sample_message("conv-1", "user-2")))
            .await;

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.event_type(), "message:new");
        assert_eq!(received.conversation_id(), Some("conv-1"));

        let stats = manager.get_stats().await;
        assert_eq!(stats.total_events, 1);
        assert_eq!(stats.events_by_type.get("message:new"), Some(&1));
    }

    #[tokio::test]
    async fn test_multiple_subscribers_fan_out() {
        let manager = EventManager::new(100);

        let mut receiver1 = manager.subscribe();
        let mut receiver2 = manager.subscribe();

        assert_eq!(manager.subscriber_count(), 2);

        manager
            .emit(ChatEvent::TypingUpdate {
                conversation_id: "conv-1".to_string(),
                user_id: "user-2".to_string(),
                is_typing: true,
            })
            .await;

        // 两个订阅者都应该收到同一事件
        let event1 = receiver1.recv().await.unwrap();
        let event2 = receiver2.recv().await.unwrap();
        assert_eq!(event1.event_type(), "typing:update");
        assert_eq!(event2.event_type(), "typing:update");
    }

    #[tokio::test]
    async fn test_event_filter_by_conversation() {
        let manager = EventManager::new(100);

        let filter = EventFilter::new()
            .with_event_types(vec!["message:new".to_string()])
            .with_conversation_ids(vec!["conv-1".to_string()]);
        let mut filtered = manager.subscribe_filtered(filter);

        // 不匹配的事件（其他会话）
        manager
            .emit(ChatEvent::MessageNew(sample_message("conv-2", "user-2")))
            .await;
        // 匹配的事件
        manager
            .emit(ChatEvent::MessageNew(sample_message("conv-1", "user-2")))
            .await;

        let received = filtered.recv().await.unwrap();
        assert_eq!(received.conversation_id(), Some("conv-1"));
    }

    #[tokio::test]
    async fn test_filter_requires_user_id_presence() {
        // 要求用户 ID 的过滤器不应匹配没有用户维度的事件
        let filter = EventFilter::new().with_user_ids(vec!["user-3".to_string()]);

        let ack = ChatEvent::MessageAck {
            temp_id: "tmp-1".to_string(),
            server_id: "msg-9".to_string(),
            created_at: Utc::now(),
            conversation_id: "conv-1".to_string(),
        };
        assert!(!filter.matches(&ack));

        let presence = ChatEvent::PresenceUpdate {
            user_id: "user-3".to_string(),
            status: UserStatus::Online,
            last_seen: Utc::now(),
        };
        assert!(filter.matches(&presence));
    }

    #[test]
    fn test_event_type_tags() {
        let presence = ChatEvent::PresenceUpdate {
            user_id: "user-1".to_string(),
            status: UserStatus::Offline,
            last_seen: Utc::now(),
        };
        assert_eq!(presence.event_type(), "presence:update");
        // presence 是用户维度事件，没有会话 ID
        assert_eq!(presence.conversation_id(), None);
        assert_eq!(presence.user_id(), Some("user-1"));
    }
}
