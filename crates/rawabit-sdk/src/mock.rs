//! 参考传输实现（进程内 mock）
//!
//! 功能包括：
//! - 实例私有的内存存储（用户/会话/消息），多实例互不干扰
//! - 完整的发送流程：校验 → ack → 落库 → 推送
//! - 幂等的已读标记，逐条发出已读回执
//! - 按参与者集合 find-or-create 会话
//! - 确定性的测试发射器（替代真实服务端推送）
//! - 可选的投递/已读模拟推进（仅演示用，不构成时序保证）
//!
//! 线上格式不在本层关心：事件在这里直接以 `ChatEvent` 构造，
//! 真实传输绑定需要先完成解码与校验才能构造事件。

use crate::adapter::ChatAdapter;
use crate::entities::{
    Conversation, LastMessage, Message, MessageStatus, Paginated, Participant, UserStatus,
};
use crate::error::{RawabitSDKError, Result};
use crate::events::{ChatEvent, DeliveryStatus, EventManager, EventStats};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

/// 参考传输的叶级错误
///
/// 通过 From 汇入 `RawabitSDKError`，调用方只看到统一的错误类型。
#[derive(Debug, Clone, thiserror::Error)]
pub enum MockTransportError {
    /// 服务端消息 ID 生成失败（雪花生成器时钟回拨等）
    #[error("server id generation failed: {reason}")]
    IdGeneration { reason: String },

    /// 雪花生成器初始化失败
    #[error("snowflake initialization failed: {reason}")]
    IdGeneratorInit { reason: String },
}

impl From<MockTransportError> for RawabitSDKError {
    fn from(error: MockTransportError) -> Self {
        RawabitSDKError::Other(error.to_string())
    }
}

/// mock 适配器配置
#[derive(Debug, Clone)]
pub struct MockAdapterConfig {
    /// 事件广播缓冲区大小
    pub event_buffer_size: usize,

    /// 是否模拟投递/已读推进（演示用；测试应关闭并使用显式发射器）
    pub simulate_delivery: bool,

    /// 模拟投递延迟（毫秒）
    pub delivery_delay_ms: u64,

    /// 模拟对端已读延迟（毫秒）
    pub read_delay_ms: u64,
}

impl Default for MockAdapterConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 256,
            simulate_delivery: false,
            delivery_delay_ms: 100,
            read_delay_ms: 300,
        }
    }
}

/// 实例私有的内存存储
#[derive(Default)]
struct MockStore {
    users: HashMap<String, Participant>,
    conversations: HashMap<String, Conversation>,
    /// 每个会话的消息，按时间升序
    messages: HashMap<String, Vec<Message>>,
    /// 会话自增序号（生成 conv-N id 用）
    next_conversation_seq: u64,
}

/// 进程内参考传输
///
/// 存储归实例所有：两个 `MockChatAdapter` 实例之间没有任何共享
/// 可变状态，测试可以并行创建互不干扰的实例。
pub struct MockChatAdapter {
    /// 当前登录用户
    current_user_id: String,

    /// 内存存储
    store: Arc<RwLock<MockStore>>,

    /// 事件管理器（扇出广播）
    event_manager: Arc<EventManager>,

    /// 服务端消息 ID 生成器
    snowflake: Arc<snowflake_me::Snowflake>,

    /// 配置
    config: MockAdapterConfig,
}

impl MockChatAdapter {
    /// 创建 mock 适配器（默认配置）
    pub fn new(current_user_id: impl Into<String>) -> Result<Self> {
        Self::with_config(current_user_id, MockAdapterConfig::default())
    }

    /// 使用自定义配置创建
    pub fn with_config(
        current_user_id: impl Into<String>,
        config: MockAdapterConfig,
    ) -> Result<Self> {
        // 使用 Builder 手动指定 machine_id 和 data_center_id，避免 IP 地址检测失败
        // 注意：使用 StdRng 而不是 thread_rng()，因为 thread_rng() 不是 Send 的
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};
        let mut rng = StdRng::from_entropy();
        let machine_id: u16 = rng.gen_range(0..32);
        let data_center_id: u16 = rng.gen_range(0..32);

        let snowflake = snowflake_me::Snowflake::builder()
            .machine_id(&|| Ok(machine_id))
            .data_center_id(&|| Ok(data_center_id))
            .finalize()
            .map_err(|e| MockTransportError::IdGeneratorInit {
                reason: format!("{:?}", e),
            })?;

        Ok(Self {
            current_user_id: current_user_id.into(),
            store: Arc::new(RwLock::new(MockStore::default())),
            event_manager: Arc::new(EventManager::new(config.event_buffer_size)),
            snowflake: Arc::new(snowflake),
            config,
        })
    }

    /// 当前登录用户 ID
    pub fn current_user_id(&self) -> &str {
        &self.current_user_id
    }

    /// 生成一个服务端消息 ID
    fn next_server_id(&self) -> Result<String> {
        let id = self
            .snowflake
            .next_id()
            .map_err(|e| MockTransportError::IdGeneration {
                reason: format!("{:?}", e),
            })?;
        Ok(format!("msg-{}", id))
    }

    // ========== 数据准备 ==========

    /// 注册一个用户
    pub async fn insert_user(&self, participant: Participant) {
        let mut store = self.store.write().await;
        store.users.insert(participant.id.clone(), participant);
    }

    /// 按参与者集合查找或创建会话
    ///
    /// 同一组参与者（不计顺序）永远命中同一个会话。少于两个去重后
    /// 的参与者（自己和自己的会话）被拒绝；未注册的参与者报 NotFound。
    pub async fn find_or_create_conversation(
        &self,
        participant_ids: &[&str],
    ) -> Result<Conversation> {
        let key = Conversation::participant_key_of(participant_ids);
        if key.split('|').count() < 2 {
            return Err(RawabitSDKError::InvalidArgument(
                "conversation requires at least two distinct participants".to_string(),
            ));
        }

        let mut store = self.store.write().await;

        if let Some(existing) = store
            .conversations
            .values()
            .find(|c| c.participant_key() == key)
        {
            return Ok(existing.clone());
        }

        // 参与者必须已注册
        let mut participants = Vec::new();
        for id in key.split('|') {
            match store.users.get(id) {
                Some(user) => participants.push(user.clone()),
                None => {
                    return Err(RawabitSDKError::NotFound(format!(
                        "participant {} not found",
                        id
                    )))
                }
            }
        }

        store.next_conversation_seq += 1;
        let conversation = Conversation {
            id: format!("conv-{}", store.next_conversation_seq),
            participants,
            last_message: None,
            unread_count: 0,
        };
        store
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        store.messages.insert(conversation.id.clone(), Vec::new());

        info!("Created conversation {} ({})", conversation.id, key);
        Ok(conversation)
    }

    /// 直接写入一条历史消息（测试数据准备用，不发事件）
    pub async fn seed_message(&self, message: Message) -> Result<()> {
        let mut store = self.store.write().await;
        if !store.conversations.contains_key(&message.conversation_id) {
            return Err(RawabitSDKError::NotFound(format!(
                "conversation {} not found",
                message.conversation_id
            )));
        }

        let preview = LastMessage {
            body: message.body.clone(),
            created_at: message.created_at,
        };
        let inbound_unread =
            message.sender_id != self.current_user_id && message.status != MessageStatus::Read;

        let timeline = store.messages.entry(message.conversation_id.clone()).or_default();
        timeline.push(message.clone());
        timeline.sort_by_key(|m| m.created_at);

        let conversation = store
            .conversations
            .get_mut(&message.conversation_id)
            .expect("checked above");
        let is_newest = conversation
            .last_message
            .as_ref()
            .map(|lm| lm.created_at <= preview.created_at)
            .unwrap_or(true);
        if is_newest {
            conversation.last_message = Some(preview);
        }
        if inbound_unread {
            conversation.unread_count += 1;
        }
        Ok(())
    }

    // ========== 测试发射器（替代真实服务端推送/原型里的周期定时器） ==========

    /// 模拟对端发来一条消息：落库、更新会话、推送 message:new
    pub async fn emit_peer_message(
        &self,
        conversation_id: &str,
        sender_id: &str,
        body: &str,
    ) -> Result<Message> {
        let message = {
            let mut store = self.store.write().await;
            if !store.conversations.contains_key(conversation_id) {
                return Err(RawabitSDKError::NotFound(format!(
                    "conversation {} not found",
                    conversation_id
                )));
            }

            let message = Message {
                id: self.next_server_id()?,
                temp_id: None,
                conversation_id: conversation_id.to_string(),
                sender_id: sender_id.to_string(),
                body: body.to_string(),
                created_at: Utc::now(),
                status: MessageStatus::Sent,
            };

            store
                .messages
                .entry(conversation_id.to_string())
                .or_default()
                .push(message.clone());
            let conversation = store
                .conversations
                .get_mut(conversation_id)
                .expect("checked above");
            conversation.last_message = Some(LastMessage {
                body: message.body.clone(),
                created_at: message.created_at,
            });
            if sender_id != self.current_user_id {
                conversation.unread_count += 1;
            }
            message
        };

        self.event_manager
            .emit(ChatEvent::MessageNew(message.clone()))
            .await;
        Ok(message)
    }

    /// 模拟一次在线状态变更：改写存储中的用户记录并推送 presence:update
    pub async fn emit_presence(&self, user_id: &str, status: UserStatus) {
        let last_seen = Utc::now();
        {
            let mut store = self.store.write().await;
            if let Some(user) = store.users.get_mut(user_id) {
                user.status = status;
                user.last_seen = Some(last_seen);
            }
            for conversation in store.conversations.values_mut() {
                for participant in conversation.participants.iter_mut() {
                    if participant.id == user_id {
                        participant.status = status;
                        participant.last_seen = Some(last_seen);
                    }
                }
            }
        }

        self.event_manager
            .emit(ChatEvent::PresenceUpdate {
                user_id: user_id.to_string(),
                status,
                last_seen,
            })
            .await;
    }

    /// 模拟一条对端 typing 事件
    pub async fn emit_typing(&self, conversation_id: &str, user_id: &str, is_typing: bool) {
        self.event_manager
            .emit(ChatEvent::TypingUpdate {
                conversation_id: conversation_id.to_string(),
                user_id: user_id.to_string(),
                is_typing,
            })
            .await;
    }

    /// 模拟一条投递/已读回执：单调推进存储中的状态并推送 delivery:update
    pub async fn emit_delivery_update(
        &self,
        conversation_id: &str,
        message_id: &str,
        status: DeliveryStatus,
    ) {
        {
            let mut store = self.store.write().await;
            if let Some(timeline) = store.messages.get_mut(conversation_id) {
                if let Some(message) = timeline.iter_mut().find(|m| m.id == message_id) {
                    let target = match status {
                        DeliveryStatus::Delivered => MessageStatus::Delivered,
                        DeliveryStatus::Read => MessageStatus::Read,
                    };
                    message.status = message.status.merge_remote(target);
                }
            }
        }

        self.event_manager
            .emit(ChatEvent::DeliveryUpdate {
                conversation_id: conversation_id.to_string(),
                message_id: message_id.to_string(),
                status,
                read_at: Utc::now(),
            })
            .await;
    }

    /// 事件统计（测试观察用）
    pub async fn event_stats(&self) -> EventStats {
        self.event_manager.get_stats().await
    }

    /// 模拟投递推进：ack 之后延迟发出 Delivered / Read
    ///
    /// 仅在 `simulate_delivery` 打开时由 send_message 调用；延迟节奏
    /// 只是演示行为，不是契约的一部分。
    fn spawn_simulated_delivery(&self, conversation_id: String, server_id: String) {
        let event_manager = self.event_manager.clone();
        let store = self.store.clone();
        let delivery_delay = Duration::from_millis(self.config.delivery_delay_ms);
        let read_delay = Duration::from_millis(self.config.read_delay_ms);

        tokio::spawn(async move {
            tokio::time::sleep(delivery_delay).await;
            {
                let mut store = store.write().await;
                if let Some(timeline) = store.messages.get_mut(&conversation_id) {
                    if let Some(m) = timeline.iter_mut().find(|m| m.id == server_id) {
                        m.status = m.status.merge_remote(MessageStatus::Delivered);
                    }
                }
            }
            event_manager
                .emit(ChatEvent::DeliveryUpdate {
                    conversation_id: conversation_id.clone(),
                    message_id: server_id.clone(),
                    status: DeliveryStatus::Delivered,
                    read_at: Utc::now(),
                })
                .await;

            tokio::time::sleep(read_delay).await;
            {
                let mut store = store.write().await;
                if let Some(timeline) = store.messages.get_mut(&conversation_id) {
                    if let Some(m) = timeline.iter_mut().find(|m| m.id == server_id) {
                        m.status = m.status.merge_remote(MessageStatus::Read);
                    }
                }
            }
            event_manager
                .emit(ChatEvent::DeliveryUpdate {
                    conversation_id,
                    message_id: server_id,
                    status: DeliveryStatus::Read,
                    read_at: Utc::now(),
                })
                .await;
        });
    }
}

#[async_trait]
impl ChatAdapter for MockChatAdapter {
    async fn get_conversations(
        &self,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Paginated<Conversation>> {
        let store = self.store.read().await;

        // 当前用户参与的会话，按最近活跃倒序
        let mut conversations: Vec<Conversation> = store
            .conversations
            .values()
            .filter(|c| c.participants.iter().any(|p| p.id == self.current_user_id))
            .cloned()
            .collect();
        conversations.sort_by(|a, b| {
            let a_ts = a.last_message.as_ref().map(|lm| lm.created_at);
            let b_ts = b.last_message.as_ref().map(|lm| lm.created_at);
            b_ts.cmp(&a_ts)
        });

        let offset: usize = match cursor {
            Some(c) => c
                .parse()
                .map_err(|_| RawabitSDKError::InvalidArgument(format!("bad cursor: {}", c)))?,
            None => 0,
        };
        let page: Vec<Conversation> = conversations.iter().skip(offset).take(limit).cloned().collect();
        let next_cursor = if offset + page.len() < conversations.len() {
            Some((offset + page.len()).to_string())
        } else {
            None
        };

        Ok(Paginated {
            items: page,
            next_cursor,
        })
    }

    async fn get_messages(
        &self,
        conversation_id: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Paginated<Message>> {
        let store = self.store.read().await;
        let timeline = store.messages.get(conversation_id).ok_or_else(|| {
            RawabitSDKError::NotFound(format!("conversation {} not found", conversation_id))
        })?;

        // 游标指向某条消息：只看比它更早的历史
        let upper = match cursor {
            Some(cursor_id) => match timeline.iter().position(|m| m.id == cursor_id) {
                Some(i) => i,
                None => {
                    return Err(RawabitSDKError::InvalidArgument(format!(
                        "bad cursor: {}",
                        cursor_id
                    )))
                }
            },
            None => timeline.len(),
        };

        // 取窗口内最新的 limit 条，页内保持时间升序
        let lower = upper.saturating_sub(limit);
        let page: Vec<Message> = timeline[lower..upper].to_vec();
        let next_cursor = if lower > 0 {
            page.first().map(|m| m.id.clone())
        } else {
            None
        };

        Ok(Paginated {
            items: page,
            next_cursor,
        })
    }

    async fn send_message(&self, conversation_id: &str, temp_id: &str, body: &str) -> Result<()> {
        if body.trim().is_empty() {
            return Err(RawabitSDKError::InvalidInput(
                "message body is empty".to_string(),
            ));
        }

        let server_id = self.next_server_id()?;
        let created_at = Utc::now();

        let message = {
            let mut store = self.store.write().await;
            if !store.conversations.contains_key(conversation_id) {
                return Err(RawabitSDKError::NotFound(format!(
                    "conversation {} not found",
                    conversation_id
                )));
            }

            let message = Message {
                id: server_id.clone(),
                temp_id: Some(temp_id.to_string()),
                conversation_id: conversation_id.to_string(),
                sender_id: self.current_user_id.clone(),
                body: body.to_string(),
                created_at,
                status: MessageStatus::Sent,
            };

            store
                .messages
                .entry(conversation_id.to_string())
                .or_default()
                .push(message.clone());
            let conversation = store
                .conversations
                .get_mut(conversation_id)
                .expect("checked above");
            conversation.last_message = Some(LastMessage {
                body: body.to_string(),
                created_at,
            });
            message
        };

        // 1. 先给发送方 ack，完成临时 ID → 服务端 ID 的绑定
        self.event_manager
            .emit(ChatEvent::MessageAck {
                temp_id: temp_id.to_string(),
                server_id: server_id.clone(),
                created_at,
                conversation_id: conversation_id.to_string(),
            })
            .await;

        // 2. 再向所有参与者推送完整消息（带 temp_id，乐观回显据此去重）
        self.event_manager
            .emit(ChatEvent::MessageNew(message))
            .await;

        debug!(
            "Accepted message {} (temp {}) in {}",
            server_id, temp_id, conversation_id
        );

        // 3. 可选：模拟投递/已读推进
        if self.config.simulate_delivery {
            self.spawn_simulated_delivery(conversation_id.to_string(), server_id);
        }

        Ok(())
    }

    async fn mark_as_read(&self, conversation_id: &str) -> Result<()> {
        let read_updates = {
            let mut store = self.store.write().await;
            if !store.conversations.contains_key(conversation_id) {
                return Err(RawabitSDKError::NotFound(format!(
                    "conversation {} not found",
                    conversation_id
                )));
            }

            let mut updates = Vec::new();
            if let Some(timeline) = store.messages.get_mut(conversation_id) {
                for message in timeline.iter_mut() {
                    // 只处理对端发来、还没读的消息
                    if message.sender_id != self.current_user_id
                        && message.status != MessageStatus::Read
                    {
                        message.status = MessageStatus::Read;
                        updates.push(message.id.clone());
                    }
                }
            }
            let conversation = store
                .conversations
                .get_mut(conversation_id)
                .expect("checked above");
            conversation.unread_count = 0;
            updates
        };

        // 逐条发出已读回执（这些回执的归属方是消息的发送者）
        for message_id in read_updates {
            self.event_manager
                .emit(ChatEvent::DeliveryUpdate {
                    conversation_id: conversation_id.to_string(),
                    message_id,
                    status: DeliveryStatus::Read,
                    read_at: Utc::now(),
                })
                .await;
        }

        Ok(())
    }

    async fn send_typing_update(&self, conversation_id: &str, is_typing: bool) -> Result<()> {
        // 尽力而为：未知会话只记日志，不报错
        {
            let store = self.store.read().await;
            if !store.conversations.contains_key(conversation_id) {
                warn!(
                    "Typing update for unknown conversation {} dropped",
                    conversation_id
                );
                return Ok(());
            }
        }

        self.event_manager
            .emit(ChatEvent::TypingUpdate {
                conversation_id: conversation_id.to_string(),
                user_id: self.current_user_id.clone(),
                is_typing,
            })
            .await;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.event_manager.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn adapter_with_users(current: &str, others: &[&str]) -> MockChatAdapter {
        let adapter = MockChatAdapter::new(current).unwrap();
        adapter.insert_user(Participant::bare(current)).await;
        for id in others {
            adapter.insert_user(Participant::bare(*id)).await;
        }
        adapter
    }

    #[tokio::test]
    async fn test_find_or_create_is_order_independent() {
        let adapter = adapter_with_users("user-1", &["user-2"]).await;

        let conv_a = adapter
            .find_or_create_conversation(&["user-1", "user-2"])
            .await
            .unwrap();
        let conv_b = adapter
            .find_or_create_conversation(&["user-2", "user-1"])
            .await
            .unwrap();
        assert_eq!(conv_a.id, conv_b.id);
    }

    #[tokio::test]
    async fn test_self_conversation_rejected() {
        let adapter = adapter_with_users("user-1", &[]).await;

        let result = adapter
            .find_or_create_conversation(&["user-1", "user-1"])
            .await;
        assert!(matches!(result, Err(RawabitSDKError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_unknown_participant_rejected() {
        let adapter = adapter_with_users("user-1", &[]).await;

        let result = adapter
            .find_or_create_conversation(&["user-1", "user-404"])
            .await;
        assert!(matches!(result, Err(RawabitSDKError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_instances_are_isolated() {
        let adapter_a = adapter_with_users("user-1", &["user-2"]).await;
        let adapter_b = adapter_with_users("user-1", &["user-2"]).await;

        adapter_a
            .find_or_create_conversation(&["user-1", "user-2"])
            .await
            .unwrap();

        // B 实例看不到 A 实例的会话
        let page = adapter_b.get_conversations(None, 10).await.unwrap();
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn test_send_emits_ack_then_new() {
        let adapter = adapter_with_users("user-1", &["user-2"]).await;
        let conv = adapter
            .find_or_create_conversation(&["user-1", "user-2"])
            .await
            .unwrap();

        let mut receiver = adapter.subscribe();
        adapter
            .send_message(&conv.id, "tmp-1", "hello")
            .await
            .unwrap();

        // ack 先到
        let first = receiver.recv().await.unwrap();
        let (server_id, ack_created_at) = match first {
            ChatEvent::MessageAck {
                temp_id,
                server_id,
                created_at,
                conversation_id,
            } => {
                assert_eq!(temp_id, "tmp-1");
                assert_eq!(conversation_id, conv.id);
                (server_id, created_at)
            }
            other => panic!("expected ack, got {}", other.event_type()),
        };

        // 完整消息随后推送，引用同一逻辑消息
        let second = receiver.recv().await.unwrap();
        match second {
            ChatEvent::MessageNew(message) => {
                assert_eq!(message.id, server_id);
                assert_eq!(message.temp_id.as_deref(), Some("tmp-1"));
                assert_eq!(message.created_at, ack_created_at);
                assert_eq!(message.status, MessageStatus::Sent);
            }
            other => panic!("expected message:new, got {}", other.event_type()),
        }
    }

    #[tokio::test]
    async fn test_empty_body_rejected_without_mutation() {
        let adapter = adapter_with_users("user-1", &["user-2"]).await;
        let conv = adapter
            .find_or_create_conversation(&["user-1", "user-2"])
            .await
            .unwrap();

        let result = adapter.send_message(&conv.id, "tmp-1", "   ").await;
        assert!(matches!(result, Err(RawabitSDKError::InvalidInput(_))));

        let page = adapter.get_messages(&conv.id, None, 10).await.unwrap();
        assert!(page.items.is_empty());
        // 没有任何事件发出
        assert_eq!(adapter.event_stats().await.total_events, 0);
    }

    #[tokio::test]
    async fn test_unknown_conversation_send_rejected() {
        let adapter = adapter_with_users("user-1", &[]).await;
        let result = adapter.send_message("conv-404", "tmp-1", "hi").await;
        assert!(matches!(result, Err(RawabitSDKError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_mark_as_read_is_idempotent() {
        let adapter = adapter_with_users("user-1", &["user-2"]).await;
        let conv = adapter
            .find_or_create_conversation(&["user-1", "user-2"])
            .await
            .unwrap();
        adapter
            .emit_peer_message(&conv.id, "user-2", "first")
            .await
            .unwrap();
        adapter
            .emit_peer_message(&conv.id, "user-2", "second")
            .await
            .unwrap();

        let before = adapter.get_conversations(None, 10).await.unwrap();
        assert_eq!(before.items[0].unread_count, 2);

        let mut receiver = adapter.subscribe();
        adapter.mark_as_read(&conv.id).await.unwrap();

        // 两条入站消息各发一条已读回执
        for _ in 0..2 {
            let event = receiver.recv().await.unwrap();
            assert_eq!(event.event_type(), "delivery:update");
        }

        let after = adapter.get_conversations(None, 10).await.unwrap();
        assert_eq!(after.items[0].unread_count, 0);

        // 第二次调用：无事可做，不再发事件
        let stats_before = adapter.event_stats().await.total_events;
        adapter.mark_as_read(&conv.id).await.unwrap();
        assert_eq!(adapter.event_stats().await.total_events, stats_before);
    }

    #[tokio::test]
    async fn test_get_messages_pages_are_ascending() {
        let adapter = adapter_with_users("user-1", &["user-2"]).await;
        let conv = adapter
            .find_or_create_conversation(&["user-1", "user-2"])
            .await
            .unwrap();

        for i in 0..5 {
            adapter
                .emit_peer_message(&conv.id, "user-2", &format!("m{}", i))
                .await
                .unwrap();
        }

        // 第一页：最新的 2 条，页内升序
        let page1 = adapter.get_messages(&conv.id, None, 2).await.unwrap();
        let bodies: Vec<&str> = page1.items.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["m3", "m4"]);
        let cursor = page1.next_cursor.unwrap();

        // 第二页：更早的历史
        let page2 = adapter
            .get_messages(&conv.id, Some(&cursor), 2)
            .await
            .unwrap();
        let bodies: Vec<&str> = page2.items.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, vec!["m1", "m2"]);

        // 最后一页没有游标
        let cursor = page2.next_cursor.unwrap();
        let page3 = adapter
            .get_messages(&conv.id, Some(&cursor), 2)
            .await
            .unwrap();
        assert_eq!(page3.items.len(), 1);
        assert!(page3.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_conversations_ordered_by_recency() {
        let adapter = adapter_with_users("user-1", &["user-2", "user-3"]).await;
        let conv_a = adapter
            .find_or_create_conversation(&["user-1", "user-2"])
            .await
            .unwrap();
        let conv_b = adapter
            .find_or_create_conversation(&["user-1", "user-3"])
            .await
            .unwrap();

        adapter
            .emit_peer_message(&conv_a.id, "user-2", "older")
            .await
            .unwrap();
        adapter
            .emit_peer_message(&conv_b.id, "user-3", "newer")
            .await
            .unwrap();

        let page = adapter.get_conversations(None, 10).await.unwrap();
        let ids: Vec<&str> = page.items.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![conv_b.id.as_str(), conv_a.id.as_str()]);
    }
}
