//! 端到端演示：mock 传输 + 完整的乐观发送生命周期
//!
//! 运行方式：
//! ```bash
//! cargo run --example demo
//! ```

use rawabit_sdk::{
    MockAdapterConfig, MockChatAdapter, Participant, RawabitConfig, RawabitSDK, UserStatus,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    // 打开模拟投递推进，演示 sent → delivered → read 的完整流转
    let adapter = Arc::new(MockChatAdapter::with_config(
        "user-1",
        MockAdapterConfig {
            simulate_delivery: true,
            ..Default::default()
        },
    )?);
    adapter.insert_user(Participant::bare("user-1")).await;
    adapter.insert_user(Participant::bare("user-2")).await;
    let conv = adapter
        .find_or_create_conversation(&["user-1", "user-2"])
        .await?;

    let sdk = RawabitSDK::initialize(RawabitConfig::default(), adapter.clone()).await;
    sdk.connect("user-1").await;
    sdk.refresh_conversations().await?;

    // 发送一条消息，观察状态推进
    info!("发送消息...");
    let optimistic = sdk.send_message(&conv.id, "你好，收到请回复").await?;
    info!("乐观插入: id={} status={:?}", optimistic.id, optimistic.status);

    tokio::time::sleep(Duration::from_millis(600)).await;
    for message in sdk.message_snapshot(&conv.id).await {
        info!("时间线: id={} status={:?}", message.id, message.status);
    }

    // 对端来一条消息并开始输入
    adapter
        .emit_peer_message(&conv.id, "user-2", "收到！")
        .await?;
    adapter.emit_typing(&conv.id, "user-2", true).await;
    adapter.emit_presence("user-2", UserStatus::Online).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let list = sdk.conversation_snapshot().await;
    info!(
        "会话 {} 未读 {} 最后一条: {:?}",
        list[0].id,
        list[0].unread_count,
        list[0].last_message.as_ref().map(|lm| lm.body.as_str())
    );
    info!("正在输入: {:?}", sdk.typing_users(&conv.id).await);
    info!(
        "user-2 在线状态: {:?}",
        sdk.presence_of("user-2").await.map(|p| p.status)
    );

    // 标记已读
    sdk.mark_as_read(&conv.id).await?;
    let list = sdk.conversation_snapshot().await;
    info!("标记已读后未读 {}", list[0].unread_count);

    sdk.shutdown().await;
    Ok(())
}
