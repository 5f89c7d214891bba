//! SDK 主接口模块
//!
//! 采用分层架构：
//! - 业务逻辑层：RawabitSDK（当前类）
//! - 传输适配层：ChatAdapter（构造时注入，不使用隐藏全局）
//! - 缓存层：ConversationCache / MessageCache
//! - 协调层：TypingCoordinator / PresenceTracker
//!
//! 事件泵是唯一一个把适配器事件写进缓存的订阅者：逐条、按发射
//! 顺序、跑完一条再处理下一条。核心从不重排事件，单会话内的
//! 顺序由适配器负责保持。

use crate::adapter::ChatAdapter;
use crate::conversations::ConversationCache;
use crate::entities::{Conversation, Message, MessageStatus};
use crate::error::{RawabitSDKError, Result, SendFailureReason};
use crate::events::{ChatEvent, EventFilter, FilteredEventReceiver};
use crate::messages::{DayGroup, MessageCache};
use crate::presence::{PresenceInfo, PresenceTracker};
use crate::typing::{TypingConfig, TypingCoordinator};
use crate::utils::TimezoneConfig;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// SDK 配置
#[derive(Debug, Clone)]
pub struct RawabitConfig {
    /// 事件订阅缓冲区大小
    pub event_buffer_size: usize,

    /// 拉取会话/消息的默认页大小
    pub default_page_size: usize,

    /// 输入状态配置
    pub typing: TypingConfig,

    /// 日期分组使用的时区
    pub timezone: TimezoneConfig,
}

impl Default for RawabitConfig {
    fn default() -> Self {
        Self {
            event_buffer_size: 256,
            default_page_size: 50,
            typing: TypingConfig::default(),
            timezone: TimezoneConfig::default(),
        }
    }
}

impl RawabitConfig {
    pub fn builder() -> RawabitConfigBuilder {
        RawabitConfigBuilder::default()
    }
}

/// SDK 配置构建器
#[derive(Debug, Default)]
pub struct RawabitConfigBuilder {
    config: RawabitConfig,
}

impl RawabitConfigBuilder {
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.config.event_buffer_size = size;
        self
    }

    pub fn default_page_size(mut self, size: usize) -> Self {
        self.config.default_page_size = size;
        self
    }

    pub fn typing_config(mut self, typing: TypingConfig) -> Self {
        self.config.typing = typing;
        self
    }

    pub fn timezone(mut self, timezone: TimezoneConfig) -> Self {
        self.config.timezone = timezone;
        self
    }

    pub fn build(self) -> RawabitConfig {
        self.config
    }
}

/// 统一 SDK 主接口
pub struct RawabitSDK {
    /// SDK 配置
    config: RawabitConfig,

    /// 传输适配器（构造注入）
    adapter: Arc<dyn ChatAdapter>,

    /// 会话列表缓存
    conversations: ConversationCache,

    /// 消息时间线缓存
    messages: MessageCache,

    /// 输入状态协调器
    typing: TypingCoordinator,

    /// 在线状态跟踪器
    presence: PresenceTracker,

    /// 当前会话用户（connect 后可用）
    current_user_id: Arc<RwLock<Option<String>>>,

    /// 事件泵任务句柄
    pump_handle: RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl RawabitSDK {
    /// 初始化 SDK
    ///
    /// 适配器由调用方构造并注入，同一进程可以并存多个互不相干的
    /// SDK 实例（例如测试里两端各一个）。初始化即订阅适配器事件
    /// 流并启动事件泵。
    pub async fn initialize(config: RawabitConfig, adapter: Arc<dyn ChatAdapter>) -> Arc<Self> {
        info!("正在初始化 RawabitSDK...");

        let sdk = Arc::new(Self {
            typing: TypingCoordinator::with_config(config.typing.clone()),
            config,
            adapter,
            conversations: ConversationCache::new(),
            messages: MessageCache::new(),
            presence: PresenceTracker::new(),
            current_user_id: Arc::new(RwLock::new(None)),
            pump_handle: RwLock::new(None),
        });

        // 启动事件泵
        let receiver = sdk.adapter.subscribe();
        let handle = tokio::spawn(Self::run_event_pump(sdk.clone(), receiver));
        *sdk.pump_handle.write().await = Some(handle);

        info!("✅ RawabitSDK 初始化完成");
        sdk
    }

    /// 事件泵：按发射顺序逐条应用事件
    async fn run_event_pump(sdk: Arc<Self>, mut receiver: broadcast::Receiver<ChatEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => sdk.apply_event(event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // 缓冲区溢出：丢了事件，下一次完整拉取会补齐
                    warn!("Event pump lagged, {} events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event stream closed, pump exiting");
                    break;
                }
            }
        }
    }

    /// 把一条事件写进缓存
    ///
    /// 同步跑完，期间不让出：下一条事件开始前本条的全部缓存
    /// 变更已经完成（单会话内无并发写）。
    async fn apply_event(&self, event: ChatEvent) {
        let current_user_id = self.current_user_id.read().await.clone();
        let current_user_id = current_user_id.as_deref().unwrap_or("");

        match event {
            ChatEvent::MessageNew(message) => {
                // 时间线与会话列表是两个独立消费者：时间线按双键去重，
                // 会话列表对每条新消息都做预览更新 + 置顶
                let inserted = self.messages.apply_new(message.clone()).await;
                if !inserted {
                    debug!("Timeline dedup hit for message {}", message.id);
                }
                self.conversations
                    .apply_new_message(&message, current_user_id)
                    .await;
            }
            ChatEvent::MessageAck {
                temp_id,
                server_id,
                created_at,
                conversation_id,
            } => {
                self.messages
                    .apply_ack(&conversation_id, &temp_id, &server_id, created_at)
                    .await;
            }
            ChatEvent::DeliveryUpdate {
                conversation_id,
                message_id,
                status,
                ..
            } => {
                self.messages
                    .apply_delivery(&conversation_id, &message_id, status, current_user_id)
                    .await;
            }
            ChatEvent::PresenceUpdate {
                user_id,
                status,
                last_seen,
            } => {
                self.presence.apply(&user_id, status, last_seen).await;
                self.conversations
                    .apply_presence(&user_id, status, last_seen)
                    .await;
            }
            ChatEvent::TypingUpdate {
                conversation_id,
                user_id,
                is_typing,
            } => {
                self.typing
                    .apply_remote(&conversation_id, &user_id, is_typing, current_user_id)
                    .await;
            }
        }
    }

    // ========== 会话门禁 ==========

    /// 绑定当前会话用户
    pub async fn connect(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        info!("Connected as {}", user_id);
        *self.current_user_id.write().await = Some(user_id);
    }

    /// 解绑会话用户；缓存保留，网络操作开始同步拒绝
    pub async fn disconnect(&self) {
        *self.current_user_id.write().await = None;
        info!("Disconnected");
    }

    /// 会话检查：没有当前用户时同步拒绝，属编程契约违例，
    /// 不发起任何网络调用
    async fn ensure_connected(&self) -> Result<String> {
        self.current_user_id
            .read()
            .await
            .clone()
            .ok_or(RawabitSDKError::NotConnected)
    }

    // ========== 拉取与对账 ==========

    /// 拉取会话列表第一页并重置缓存，返回快照
    pub async fn refresh_conversations(&self) -> Result<Vec<Conversation>> {
        self.ensure_connected().await?;
        let page = self
            .adapter
            .get_conversations(None, self.config.default_page_size)
            .await?;
        self.conversations.reset(page.items).await;
        Ok(self.conversations.snapshot().await)
    }

    /// 打开会话：拉取最新一页消息合并进缓存，返回时间线快照
    /// 与指向更早历史的游标
    pub async fn open_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<(Vec<Message>, Option<String>)> {
        self.ensure_connected().await?;
        let page = self
            .adapter
            .get_messages(conversation_id, None, self.config.default_page_size)
            .await?;
        let next_cursor = page.next_cursor;
        self.messages.merge_page(conversation_id, page.items).await;
        Ok((self.messages.snapshot(conversation_id).await, next_cursor))
    }

    /// 向前加载更早的历史页，返回下一页游标
    pub async fn load_older_messages(
        &self,
        conversation_id: &str,
        cursor: &str,
    ) -> Result<Option<String>> {
        self.ensure_connected().await?;
        let page = self
            .adapter
            .get_messages(conversation_id, Some(cursor), self.config.default_page_size)
            .await?;
        let next_cursor = page.next_cursor;
        self.messages.merge_page(conversation_id, page.items).await;
        Ok(next_cursor)
    }

    /// 当前会话列表快照
    pub async fn conversation_snapshot(&self) -> Vec<Conversation> {
        self.conversations.snapshot().await
    }

    /// 指定会话的时间线快照
    pub async fn message_snapshot(&self, conversation_id: &str) -> Vec<Message> {
        self.messages.snapshot(conversation_id).await
    }

    /// 指定会话按日历日期分桶的时间线（配置时区）
    pub async fn messages_by_day(&self, conversation_id: &str) -> Vec<DayGroup> {
        self.messages
            .grouped_by_day(conversation_id, self.config.timezone)
            .await
    }

    // ========== 乐观发送生命周期 ==========

    /// 发送一条消息
    ///
    /// 流程：生成临时 ID → 乐观插入（Sending，本地时间戳）→ 结束
    /// 本地输入状态 → 调用适配器。适配器报错时整条移除乐观记录
    /// （缓存恢复到提交前内容）并把错误归类后向上传播，不做自动
    /// 重试。确认与投递推进经事件泵异步到达。
    ///
    /// 返回乐观插入时的消息记录（状态 Sending）。
    pub async fn send_message(&self, conversation_id: &str, body: &str) -> Result<Message> {
        let current_user_id = self.ensure_connected().await?;

        let temp_id = format!("tmp-{}", Uuid::new_v4());
        let optimistic = Message {
            id: temp_id.clone(),
            temp_id: Some(temp_id.clone()),
            conversation_id: conversation_id.to_string(),
            sender_id: current_user_id,
            body: body.to_string(),
            created_at: Utc::now(),
            status: MessageStatus::Sending,
        };
        self.messages.insert_optimistic(optimistic.clone()).await;

        // 提交即结束输入状态
        if self.typing.flush_stop(conversation_id).await {
            if let Err(e) = self
                .adapter
                .send_typing_update(conversation_id, false)
                .await
            {
                debug!("Typing stop signal dropped: {}", e);
            }
        }

        match self
            .adapter
            .send_message(conversation_id, &temp_id, body)
            .await
        {
            Ok(()) => Ok(optimistic),
            Err(e) => {
                // 回滚：缓存恢复到提交前内容
                self.messages.rollback(conversation_id, &temp_id).await;
                let reason = SendFailureReason::classify(&e);
                warn!(
                    "Send failed for {} ({:?}), optimistic record rolled back",
                    conversation_id, reason
                );
                Err(e)
            }
        }
    }

    /// 标记会话已读
    ///
    /// 本地未读数立即归零（不等任何进行中的拉取），然后通知服务端。
    pub async fn mark_as_read(&self, conversation_id: &str) -> Result<()> {
        self.ensure_connected().await?;
        self.conversations.mark_read(conversation_id).await;
        self.adapter.mark_as_read(conversation_id).await
    }

    // ========== 输入状态 ==========

    /// 本地输入框有击键活动
    ///
    /// 防抖窗口内的连续击键只产生一次 start 信号；信号发送尽力
    /// 而为，失败不向调用方暴露。
    pub async fn input_activity(&self, conversation_id: &str) -> Result<()> {
        self.ensure_connected().await?;
        if self.typing.note_activity(conversation_id).await {
            if let Err(e) = self.adapter.send_typing_update(conversation_id, true).await {
                debug!("Typing start signal dropped: {}", e);
            }
        }
        Ok(())
    }

    /// 本地输入框被清空：立即发送 stop 信号
    pub async fn input_cleared(&self, conversation_id: &str) -> Result<()> {
        self.ensure_connected().await?;
        if self.typing.flush_stop(conversation_id).await {
            if let Err(e) = self
                .adapter
                .send_typing_update(conversation_id, false)
                .await
            {
                debug!("Typing stop signal dropped: {}", e);
            }
        }
        Ok(())
    }

    /// 指定会话当前正在输入的对端用户
    pub async fn typing_users(&self, conversation_id: &str) -> Vec<String> {
        self.typing.typing_users(conversation_id).await
    }

    /// 关闭会话视图
    ///
    /// 丢弃该会话的临时输入状态（typing 集合）。进行中的发送不会
    /// 被取消，底层副作用照常完成，后续引用它的事件按正常对账
    /// 规则处理。
    pub async fn close_conversation(&self, conversation_id: &str) {
        self.typing.clear_conversation(conversation_id).await;
    }

    // ========== 在线状态 ==========

    /// 查询某个用户的最新在线状态
    pub async fn presence_of(&self, user_id: &str) -> Option<PresenceInfo> {
        self.presence.get(user_id).await
    }

    // ========== 订阅 ==========

    /// 订阅原始事件流（与事件泵各自独立收到全部事件）
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.adapter.subscribe()
    }

    /// 订阅过滤后的事件流（例如只看某个用户的 presence）
    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredEventReceiver {
        FilteredEventReceiver::new(self.adapter.subscribe(), filter)
    }

    /// 关闭 SDK：停掉事件泵
    pub async fn shutdown(&self) {
        if let Some(handle) = self.pump_handle.write().await.take() {
            handle.abort();
        }
        info!("RawabitSDK 已关闭");
    }
}
