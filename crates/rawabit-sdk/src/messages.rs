//! 消息时间线缓存模块
//!
//! 功能包括：
//! - 按会话维护严格时间有序的消息序列
//! - 拉取页合并与历史分页
//! - 乐观插入与发送失败回滚
//! - 确认提升（临时 ID → 服务端 ID，采纳服务端权威时间戳）
//! - 投递/已读状态的单调推进
//! - 双键去重（服务端 ID 或临时 ID 任一命中即丢弃）
//! - 按日历日期分桶

use crate::entities::{Message, MessageStatus};
use crate::events::DeliveryStatus;
use crate::utils::{local_date, TimezoneConfig};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// 同一天的消息分组
#[derive(Debug, Clone)]
pub struct DayGroup {
    pub date: NaiveDate,
    pub messages: Vec<Message>,
}

/// 按会话组织的消息时间线缓存
///
/// 不变量：每个会话内的消息按创建时间严格有序；同一逻辑消息
/// （按服务端 ID 或临时 ID 判定）最多出现一次。
pub struct MessageCache {
    inner: Arc<RwLock<HashMap<String, Vec<Message>>>>,
}

impl MessageCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 获取指定会话的时间线快照（时间升序）
    pub async fn snapshot(&self, conversation_id: &str) -> Vec<Message> {
        let map = self.inner.read().await;
        map.get(conversation_id).cloned().unwrap_or_default()
    }

    /// 指定会话缓存的消息数量
    pub async fn len(&self, conversation_id: &str) -> usize {
        let map = self.inner.read().await;
        map.get(conversation_id).map(|v| v.len()).unwrap_or(0)
    }

    /// 合并一页拉取结果（页内已按时间升序）
    ///
    /// 已存在的条目（服务端 ID 或临时 ID 命中）被跳过，其余插入后
    /// 整条时间线保持时间有序。历史分页往前合并同样走这里。
    ///
    /// 返回实际插入的条数。
    pub async fn merge_page(&self, conversation_id: &str, page: Vec<Message>) -> usize {
        let mut map = self.inner.write().await;
        let timeline = map.entry(conversation_id.to_string()).or_default();

        let mut inserted = 0;
        for message in page {
            if timeline.iter().any(|m| m.is_same_logical(&message)) {
                continue;
            }
            timeline.push(message);
            inserted += 1;
        }
        if inserted > 0 {
            timeline.sort_by_key(|m| m.created_at);
        }
        debug!(
            "Merged page into {}: {} inserted, {} total",
            conversation_id,
            inserted,
            timeline.len()
        );
        inserted
    }

    /// 应用一条新消息事件
    ///
    /// 去重规则：缓存中已存在相同服务端 ID **或** 相同临时 ID 的
    /// 消息时丢弃本条，乐观回显与真实推送引用同一逻辑消息时
    /// 不会二次插入。
    ///
    /// 返回是否真正插入。
    pub async fn apply_new(&self, message: Message) -> bool {
        let mut map = self.inner.write().await;
        let timeline = map.entry(message.conversation_id.clone()).or_default();

        if timeline.iter().any(|m| m.is_same_logical(&message)) {
            debug!("Duplicate message {} discarded", message.id);
            return false;
        }

        // 多数情况下新消息就是最新的，直接追加；乱序到达时重排
        let needs_sort = timeline
            .last()
            .map(|last| last.created_at > message.created_at)
            .unwrap_or(false);
        timeline.push(message);
        if needs_sort {
            timeline.sort_by_key(|m| m.created_at);
        }
        true
    }

    /// 乐观插入一条本地发出的消息（状态 Sending，本地时间戳）
    pub async fn insert_optimistic(&self, message: Message) {
        let mut map = self.inner.write().await;
        let timeline = map.entry(message.conversation_id.clone()).or_default();
        timeline.push(message);
    }

    /// 回滚一条发送失败的乐观消息
    ///
    /// 整条移除，缓存恢复到提交前的内容。返回是否找到并移除。
    pub async fn rollback(&self, conversation_id: &str, temp_id: &str) -> bool {
        let mut map = self.inner.write().await;
        let timeline = match map.get_mut(conversation_id) {
            Some(t) => t,
            None => return false,
        };
        let before = timeline.len();
        timeline.retain(|m| m.temp_id.as_deref() != Some(temp_id));
        let removed = timeline.len() < before;
        if removed {
            debug!("Rolled back optimistic message {} in {}", temp_id, conversation_id);
        } else {
            warn!("Rollback target {} not found in {}", temp_id, conversation_id);
        }
        removed
    }

    /// 应用一次发送确认
    ///
    /// 按临时 ID 匹配缓存槽位：替换为服务端 ID（临时 ID 保留用于
    /// 后续去重），状态单调推进到 Sent，并采纳服务端权威时间戳；
    /// 时间戳变化导致位置移动时重排。
    ///
    /// 返回是否命中。
    pub async fn apply_ack(
        &self,
        conversation_id: &str,
        temp_id: &str,
        server_id: &str,
        created_at: DateTime<Utc>,
    ) -> bool {
        let mut map = self.inner.write().await;
        let timeline = match map.get_mut(conversation_id) {
            Some(t) => t,
            None => return false,
        };

        let index = match timeline.iter().position(|m| m.matches_id(temp_id)) {
            Some(i) => i,
            None => {
                // 视图已关闭后又重开、或确认先于乐观插入到达时会走到这里
                debug!("Ack for unknown temp id {} in {}", temp_id, conversation_id);
                return false;
            }
        };

        let message = &mut timeline[index];
        message.id = server_id.to_string();
        message.temp_id = Some(temp_id.to_string());
        let moved = message.created_at != created_at;
        message.created_at = created_at;
        message.status = message.status.merge_remote(MessageStatus::Sent);

        if moved {
            timeline.sort_by_key(|m| m.created_at);
        }
        true
    }

    /// 应用一次投递/已读状态更新
    ///
    /// 按服务端 ID 匹配，且只作用于当前用户发出的消息：对端发来
    /// 的消息不接受入站状态推进（那些事件是发给对端客户端的）。
    /// 状态做单调合并：Read 之后的 Delivered 不回退。
    ///
    /// 返回状态是否发生变化。
    pub async fn apply_delivery(
        &self,
        conversation_id: &str,
        message_id: &str,
        status: DeliveryStatus,
        current_user_id: &str,
    ) -> bool {
        let target = match status {
            DeliveryStatus::Delivered => MessageStatus::Delivered,
            DeliveryStatus::Read => MessageStatus::Read,
        };

        let mut map = self.inner.write().await;
        let timeline = match map.get_mut(conversation_id) {
            Some(t) => t,
            None => return false,
        };

        let message = match timeline.iter_mut().find(|m| m.id == message_id) {
            Some(m) => m,
            None => return false,
        };
        if message.sender_id != current_user_id {
            return false;
        }

        let merged = message.status.merge_remote(target);
        let changed = merged != message.status;
        message.status = merged;
        changed
    }

    /// 按日历日期分桶（用于聊天窗口的日期分隔条）
    ///
    /// 桶按日期升序，桶内消息保持时间线顺序。
    pub async fn grouped_by_day(&self, conversation_id: &str, tz: TimezoneConfig) -> Vec<DayGroup> {
        let timeline = self.snapshot(conversation_id).await;
        let mut groups: Vec<DayGroup> = Vec::new();

        for message in timeline {
            let date = local_date(message.created_at, tz);
            match groups.last_mut() {
                Some(group) if group.date == date => group.messages.push(message),
                _ => groups.push(DayGroup {
                    date,
                    messages: vec![message],
                }),
            }
        }
        groups
    }

    /// 丢弃指定会话的全部缓存消息
    pub async fn clear_conversation(&self, conversation_id: &str) {
        let mut map = self.inner.write().await;
        map.remove(conversation_id);
    }
}

impl Default for MessageCache {
    fn default() -> Self {
        Self::new()
    }
}
