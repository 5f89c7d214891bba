//! 传输适配器契约
//!
//! `ChatAdapter` 是同步核心与任何具体传输实现（WebSocket+REST、
//! 长轮询、进程内 mock 等）之间的唯一边界。核心不关心线上字节
//! 格式，只依赖这里定义的能力集。

use crate::entities::{Conversation, Message, Paginated};
use crate::error::Result;
use crate::events::ChatEvent;
use async_trait::async_trait;
use tokio::sync::broadcast;

/// 聊天传输适配器能力集
///
/// 契约要点：
/// - `get_conversations` 按最近活跃时间倒序返回；
/// - `get_messages` 每页内按时间升序返回（传输层负责任何反转）；
/// - `send_message` 成功只代表服务端已受理，确认（ack）以事件形式
///   异步到达，不在调用返回值里；
/// - `mark_as_read` 幂等；
/// - `send_typing_update` 尽力而为，失败不向调用方暴露；
/// - `subscribe` 返回独立的广播接收端，每个订阅者都收到全部事件
///   （扇出，不是竞争消费）。
#[async_trait]
pub trait ChatAdapter: Send + Sync {
    /// 拉取当前用户的会话列表（分页，按最近活跃倒序）
    async fn get_conversations(
        &self,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Paginated<Conversation>>;

    /// 拉取指定会话的消息（分页，页内按时间升序）
    ///
    /// `cursor` 指向更早历史的游标；未知会话返回 NotFound。
    async fn get_messages(
        &self,
        conversation_id: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<Paginated<Message>>;

    /// 发送消息
    ///
    /// `temp_id` 是客户端生成的临时 ID，服务端确认事件会带着它
    /// 回来完成 ID 绑定。空消息体或未知会话返回错误。
    async fn send_message(&self, conversation_id: &str, temp_id: &str, body: &str) -> Result<()>;

    /// 将会话内所有未读的入站消息标记为已读，未读数归零（幂等）
    async fn mark_as_read(&self, conversation_id: &str) -> Result<()>;

    /// 通知服务端当前用户的输入状态（尽力而为）
    async fn send_typing_update(&self, conversation_id: &str, is_typing: bool) -> Result<()>;

    /// 订阅实时事件流
    fn subscribe(&self) -> broadcast::Receiver<ChatEvent>;
}
