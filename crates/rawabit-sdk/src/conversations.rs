//! 会话列表缓存模块
//!
//! 功能包括：
//! - 按最近活跃时间排序的会话列表
//! - 新消息事件的 splice-and-unshift 重排
//! - 未读数维护
//! - 在线状态写回参与者记录

use crate::entities::{Conversation, LastMessage, Message, UserStatus};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// 会话列表缓存
///
/// 有序列表，索引 0 是最近活跃的会话。缓存只通过下面的对账
/// 操作被修改，UI 只读快照。
pub struct ConversationCache {
    inner: Arc<RwLock<Vec<Conversation>>>,
}

impl ConversationCache {
    /// 创建空缓存
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// 用一次完整列表拉取的结果重置缓存（服务端已按最近活跃倒序）
    pub async fn reset(&self, conversations: Vec<Conversation>) {
        let mut list = self.inner.write().await;
        *list = conversations;
        debug!("Conversation cache reset, {} entries", list.len());
    }

    /// 获取当前列表快照
    pub async fn snapshot(&self) -> Vec<Conversation> {
        self.inner.read().await.clone()
    }

    /// 按 ID 查找会话
    pub async fn get(&self, conversation_id: &str) -> Option<Conversation> {
        let list = self.inner.read().await;
        list.iter().find(|c| c.id == conversation_id).cloned()
    }

    /// 缓存的会话数量
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// 把一个新会话插到列表头部（已存在则忽略）
    pub async fn insert_front(&self, conversation: Conversation) {
        let mut list = self.inner.write().await;
        if list.iter().any(|c| c.id == conversation.id) {
            return;
        }
        list.insert(0, conversation);
    }

    /// 应用一条新消息事件
    ///
    /// 会话不在缓存中时忽略（下一次完整列表拉取会带上它）；否则：
    /// 更新最后消息预览，发送者不是当前用户时未读数 +1，然后把该
    /// 会话移到索引 0，其余会话相对顺序保持不变。
    ///
    /// 返回是否有会话被更新。
    pub async fn apply_new_message(&self, message: &Message, current_user_id: &str) -> bool {
        let mut list = self.inner.write().await;

        let index = match list.iter().position(|c| c.id == message.conversation_id) {
            Some(i) => i,
            None => {
                debug!(
                    "Ignoring message for unknown conversation {}",
                    message.conversation_id
                );
                return false;
            }
        };

        let mut conversation = list.remove(index);
        conversation.last_message = Some(LastMessage {
            body: message.body.clone(),
            created_at: message.created_at,
        });
        if message.sender_id != current_user_id {
            conversation.unread_count += 1;
        }
        // splice + unshift：移到头部，其余会话相对顺序不变
        list.insert(0, conversation);

        true
    }

    /// 将指定会话的未读数归零
    ///
    /// 与任何进行中的消息拉取无关，立即生效。返回是否找到该会话。
    pub async fn mark_read(&self, conversation_id: &str) -> bool {
        let mut list = self.inner.write().await;
        match list.iter_mut().find(|c| c.id == conversation_id) {
            Some(conversation) => {
                conversation.unread_count = 0;
                true
            }
            None => false,
        }
    }

    /// 应用一次在线状态变更
    ///
    /// 扫描所有会话，改写包含该用户的参与者记录的 status / last_seen
    /// 字段。在这个规模下 O(会话数 × 参与者数) 的扫描可以接受，
    /// 不维护单独的参与者索引。
    ///
    /// 返回被改写的参与者记录数。
    pub async fn apply_presence(
        &self,
        user_id: &str,
        status: UserStatus,
        last_seen: DateTime<Utc>,
    ) -> usize {
        let mut list = self.inner.write().await;
        let mut updated = 0;
        for conversation in list.iter_mut() {
            for participant in conversation.participants.iter_mut() {
                if participant.id == user_id {
                    participant.status = status;
                    participant.last_seen = Some(last_seen);
                    updated += 1;
                }
            }
        }
        updated
    }
}

impl Default for ConversationCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{MessageStatus, Participant};
    use chrono::Duration;

    fn conversation(id: &str, participant_ids: &[&str]) -> Conversation {
        Conversation {
            id: id.to_string(),
            participants: participant_ids
                .iter()
                .map(|uid| Participant::bare(*uid))
                .collect(),
            last_message: None,
            unread_count: 0,
        }
    }

    fn message(conversation_id: &str, sender_id: &str, body: &str) -> Message {
        Message {
            id: format!("msg-{}", body),
            temp_id: None,
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
            status: MessageStatus::Sent,
        }
    }

    #[tokio::test]
    async fn test_new_message_moves_conversation_to_front() {
        let cache = ConversationCache::new();
        cache
            .reset(vec![
                conversation("conv-1", &["user-1", "user-2"]),
                conversation("conv-2", &["user-1", "user-3"]),
                conversation("conv-3", &["user-1", "user-4"]),
            ])
            .await;

        let applied = cache
            .apply_new_message(&message("conv-3", "user-4", "ping"), "user-1")
            .await;
        assert!(applied);

        // conv-3 移到头部，conv-1 / conv-2 相对顺序不变
        let snapshot = cache.snapshot().await;
        let ids: Vec<&str> = snapshot.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["conv-3", "conv-1", "conv-2"]);
        assert_eq!(snapshot[0].unread_count, 1);
        assert_eq!(snapshot[0].last_message.as_ref().unwrap().body, "ping");
    }

    #[tokio::test]
    async fn test_own_message_does_not_increment_unread() {
        let cache = ConversationCache::new();
        cache
            .reset(vec![conversation("conv-1", &["user-1", "user-2"])])
            .await;

        cache
            .apply_new_message(&message("conv-1", "user-1", "hello"), "user-1")
            .await;

        let snapshot = cache.snapshot().await;
        assert_eq!(snapshot[0].unread_count, 0);
        assert!(snapshot[0].last_message.is_some());
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_ignored() {
        let cache = ConversationCache::new();
        cache
            .reset(vec![conversation("conv-1", &["user-1", "user-2"])])
            .await;

        let applied = cache
            .apply_new_message(&message("conv-404", "user-2", "hi"), "user-1")
            .await;
        assert!(!applied);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_mark_read_zeroes_unread() {
        let cache = ConversationCache::new();
        let mut conv = conversation("conv-1", &["user-1", "user-2"]);
        conv.unread_count = 5;
        cache.reset(vec![conv]).await;

        assert!(cache.mark_read("conv-1").await);
        assert_eq!(cache.get("conv-1").await.unwrap().unread_count, 0);

        // 幂等
        assert!(cache.mark_read("conv-1").await);
        assert_eq!(cache.get("conv-1").await.unwrap().unread_count, 0);
    }

    #[tokio::test]
    async fn test_presence_rewrites_every_matching_participant() {
        let cache = ConversationCache::new();
        cache
            .reset(vec![
                conversation("conv-1", &["user-1", "user-2"]),
                conversation("conv-2", &["user-2", "user-3"]),
                conversation("conv-3", &["user-1", "user-3"]),
            ])
            .await;

        let last_seen = Utc::now() - Duration::minutes(1);
        let updated = cache
            .apply_presence("user-2", UserStatus::Online, last_seen)
            .await;
        // user-2 出现在 conv-1 和 conv-2 中
        assert_eq!(updated, 2);

        let conv1 = cache.get("conv-1").await.unwrap();
        let p = conv1.participant("user-2").unwrap();
        assert_eq!(p.status, UserStatus::Online);
        assert_eq!(p.last_seen, Some(last_seen));

        // 不包含 user-2 的会话不受影响
        let conv3 = cache.get("conv-3").await.unwrap();
        assert_eq!(conv3.participant("user-1").unwrap().status, UserStatus::Offline);
    }
}
