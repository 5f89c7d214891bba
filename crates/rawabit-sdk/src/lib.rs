//! Rawabit SDK - 商务社交平台的实时会话同步核心
//!
//! 本 SDK 负责把本地会话/消息视图与远端事实源保持同步，包括：
//! - 🔌 传输适配器契约：任何真实传输（WebSocket+REST、长轮询）的能力集
//! - 📡 事件扇出：一个适配器实例，多个独立订阅者
//! - 💬 乐观发送生命周期：sending → sent → delivered → read，失败回滚
//! - 🔁 对账：临时 ID / 服务端 ID 双键去重，单调状态推进，splice-and-unshift 置顶
//! - ⌨️ 输入状态：出站防抖 + 入站按会话集合
//! - 🟢 在线状态：推送驱动，写回所有缓存的参与者记录
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use rawabit_sdk::{MockChatAdapter, Participant, RawabitConfig, RawabitSDK};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 构造传输适配器（真实应用注入 WebSocket+REST 绑定）
//!     let adapter = Arc::new(MockChatAdapter::new("user-1")?);
//!     adapter.insert_user(Participant::bare("user-1")).await;
//!     adapter.insert_user(Participant::bare("user-2")).await;
//!     let conv = adapter
//!         .find_or_create_conversation(&["user-1", "user-2"])
//!         .await?;
//!
//!     // 初始化 SDK（适配器显式注入，不使用隐藏全局）
//!     let sdk = RawabitSDK::initialize(RawabitConfig::default(), adapter).await;
//!     sdk.connect("user-1").await;
//!
//!     // 拉取会话列表并发送消息
//!     let conversations = sdk.refresh_conversations().await?;
//!     println!("会话数: {}", conversations.len());
//!     sdk.send_message(&conv.id, "Hello!").await?;
//!
//!     // 标记已读
//!     sdk.mark_as_read(&conv.id).await?;
//!
//!     sdk.shutdown().await;
//!     Ok(())
//! }
//! ```

// 导出核心模块
pub mod adapter;
pub mod conversations;
pub mod entities;
pub mod error;
pub mod events;
pub mod messages;
pub mod mock;
pub mod presence;
pub mod sdk;
pub mod typing;
pub mod utils;

// 常用类型再导出
pub use adapter::ChatAdapter;
pub use conversations::ConversationCache;
pub use entities::{
    Conversation, LastMessage, Message, MessageStatus, Paginated, Participant, UserStatus,
};
pub use error::{RawabitSDKError, Result, SendFailureReason};
pub use events::{
    ChatEvent, DeliveryStatus, EventFilter, EventManager, FilteredEventReceiver,
};
pub use messages::{DayGroup, MessageCache};
pub use mock::{MockAdapterConfig, MockChatAdapter, MockTransportError};
pub use presence::{PresenceInfo, PresenceTracker};
pub use sdk::{RawabitConfig, RawabitSDK};
pub use typing::{TypingConfig, TypingCoordinator};
pub use utils::TimezoneConfig;
