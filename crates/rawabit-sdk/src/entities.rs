//! 数据模型模块
//!
//! 定义同步核心的领域实体：
//! - 会话（Conversation）与参与者摘要（Participant）
//! - 消息（Message）与消息状态机（MessageStatus）
//! - 分页结果（Paginated）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 用户在线状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Online,
    Offline,
}

/// 会话参与者摘要
///
/// 会话列表与聊天窗口需要的最小用户信息，presence 推送会
/// 原地改写 status / last_seen 两个字段。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub full_name: Option<String>,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub status: UserStatus,
    pub last_seen: Option<DateTime<Utc>>,
}

impl Participant {
    /// 创建一个只有 ID 的参与者（测试和占位用）
    pub fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            full_name: None,
            username: None,
            avatar_url: None,
            status: UserStatus::Offline,
            last_seen: None,
        }
    }
}

/// 会话最后一条消息预览
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastMessage {
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// 会话
///
/// 不变量：同一组参与者（不计顺序）只存在一个会话，由传输层的
/// find-or-create 保证；`participant_key` 是该不变量使用的规范化键。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub participants: Vec<Participant>,
    pub last_message: Option<LastMessage>,
    /// 未读数（非负），markAsRead 后归零
    pub unread_count: u32,
}

impl Conversation {
    /// 计算本会话的参与者集合键
    pub fn participant_key(&self) -> String {
        let ids: Vec<&str> = self.participants.iter().map(|p| p.id.as_str()).collect();
        Self::participant_key_of(&ids)
    }

    /// 参与者集合的规范化键：排序后用 `|` 连接，与传入顺序无关
    pub fn participant_key_of(ids: &[&str]) -> String {
        let mut sorted: Vec<&str> = ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        sorted.join("|")
    }

    /// 查找指定参与者
    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == user_id)
    }
}

/// 消息状态枚举
///
/// 状态流转图：
/// Sending → Sent → Delivered → Read
///    ↓
///  Failed
///
/// Failed 是终态：发送失败的乐观消息会被整条回滚移除，
/// 不做自动重试。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum MessageStatus {
    Sending = 0,   // 发送中（乐观插入）
    Sent = 1,      // 已发送（服务端已确认）
    Delivered = 2, // 已投递
    Read = 3,      // 已读
    Failed = 4,    // 发送失败
}

impl MessageStatus {
    /// 检查是否可以从当前状态转换到目标状态
    pub fn can_transition_to(&self, target: MessageStatus) -> bool {
        match (self, target) {
            (MessageStatus::Sending, MessageStatus::Sent) => true,
            (MessageStatus::Sent, MessageStatus::Delivered) => true,
            (MessageStatus::Delivered, MessageStatus::Read) => true,
            (MessageStatus::Sending, MessageStatus::Failed) => true,
            _ => false,
        }
    }

    /// 检查状态是否为最终状态（不能再转换）
    pub fn is_final_state(&self) -> bool {
        matches!(self, MessageStatus::Read | MessageStatus::Failed)
    }

    /// 投递进度序号，用于远端状态的单调合并
    ///
    /// Failed 不参与投递进度（失败的乐观记录会被整条移除），
    /// 排在所有进度之外。
    fn rank(&self) -> i32 {
        match self {
            MessageStatus::Failed => -1,
            MessageStatus::Sending => 0,
            MessageStatus::Sent => 1,
            MessageStatus::Delivered => 2,
            MessageStatus::Read => 3,
        }
    }

    /// 与远端投递状态做单调合并：只前进，不回退
    ///
    /// Read 之后收到 Delivered 时保持 Read 不变（迟到/重放的
    /// 投递事件不得让状态倒退）。
    pub fn merge_remote(self, incoming: MessageStatus) -> MessageStatus {
        if incoming.rank() > self.rank() {
            incoming
        } else {
            self
        }
    }
}

/// 消息
///
/// 双重身份标识：`id` 在服务端确认前是客户端临时 ID，确认后被
/// 替换为服务端 ID；`temp_id` 在提升后仍然保留，是乐观回显与
/// 真实推送之间去重的唯一依据。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub temp_id: Option<String>,
    pub conversation_id: String,
    pub sender_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub status: MessageStatus,
}

impl Message {
    /// 判断给定标识是否指向本条消息（服务端 ID 或临时 ID 均可命中）
    pub fn matches_id(&self, id: &str) -> bool {
        self.id == id || self.temp_id.as_deref() == Some(id)
    }

    /// 判断与另一条消息是否为同一逻辑消息（按服务端 ID 或临时 ID）
    pub fn is_same_logical(&self, other: &Message) -> bool {
        if self.id == other.id {
            return true;
        }
        match (&self.temp_id, &other.temp_id) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// 分页结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> Paginated<T> {
    /// 最后一页（无后续游标）
    pub fn last_page(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }
}
