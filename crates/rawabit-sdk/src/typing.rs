//! 输入状态协调模块
//!
//! 功能包括：
//! - 出站：按会话的防抖器，把连续击键合并为至多一次 start 信号
//! - 出站：提交/清空输入时立即发送 stop 信号
//! - 入站：按会话维护"正在输入"的用户集合（排除当前用户）
//! - 视图关闭时清空集合；可选的空闲超时清理兜底对端崩溃
//!
//! 防抖器是协调器持有的有状态组件，带显式 flush / cancel 操作，
//! 与任何 UI 重渲染周期无关。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// 输入状态配置
#[derive(Debug, Clone)]
pub struct TypingConfig {
    /// 出站防抖窗口（毫秒）- 窗口内的击键合并为一次 start 信号
    pub debounce_window_ms: u64,

    /// 入站空闲超时（秒）- 对端超过此时长没有新的 typing 事件时
    /// 自动移出集合（对端崩溃、stop 信号丢失的兜底）
    pub idle_timeout_secs: u64,

    /// 是否启动空闲清理任务
    pub enable_idle_sweep: bool,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            debounce_window_ms: 500, // 500ms 内的击键只发一次
            idle_timeout_secs: 10,   // 10 秒无事件自动清除
            enable_idle_sweep: true,
        }
    }
}

/// 出站输入状态
#[derive(Debug, Clone)]
#[allow(dead_code)]
struct OutboundTyping {
    started_at: Instant,
    last_sent_at: Instant,
}

/// 输入状态协调器
pub struct TypingCoordinator {
    /// 出站：当前正在输入的会话
    outbound: Arc<RwLock<HashMap<String, OutboundTyping>>>,

    /// 入站：按会话的正在输入用户集合（值为最近一次事件时间）
    inbound: Arc<RwLock<HashMap<String, HashMap<String, Instant>>>>,

    /// 配置
    config: TypingConfig,
}

impl TypingCoordinator {
    /// 创建协调器（默认配置）
    pub fn new() -> Self {
        Self::with_config(TypingConfig::default())
    }

    /// 使用自定义配置创建
    pub fn with_config(config: TypingConfig) -> Self {
        let coordinator = Self {
            outbound: Arc::new(RwLock::new(HashMap::new())),
            inbound: Arc::new(RwLock::new(HashMap::new())),
            config,
        };

        if coordinator.config.enable_idle_sweep {
            coordinator.start_idle_sweep();
        }

        coordinator
    }

    // ========== 出站 ==========

    /// 记录一次本地击键活动
    ///
    /// 返回 true 表示需要发送一次 start-typing 信号，false 表示在
    /// 防抖窗口内，击键已被合并。
    pub async fn note_activity(&self, conversation_id: &str) -> bool {
        let now = Instant::now();
        let mut outbound = self.outbound.write().await;

        if let Some(state) = outbound.get_mut(conversation_id) {
            let elapsed = now.duration_since(state.last_sent_at);
            if elapsed.as_millis() < self.config.debounce_window_ms as u128 {
                debug!("Typing debounced for conversation {}", conversation_id);
                return false;
            }
            state.last_sent_at = now;
            true
        } else {
            outbound.insert(
                conversation_id.to_string(),
                OutboundTyping {
                    started_at: now,
                    last_sent_at: now,
                },
            );
            true
        }
    }

    /// 立即结束本地输入状态
    ///
    /// 消息提交或输入框清空时调用。返回 true 表示之前处于输入状态，
    /// 需要立刻发送一次 stop-typing 信号。
    pub async fn flush_stop(&self, conversation_id: &str) -> bool {
        let mut outbound = self.outbound.write().await;
        let was_typing = outbound.remove(conversation_id).is_some();
        if was_typing {
            debug!("Flushed typing stop for conversation {}", conversation_id);
        }
        was_typing
    }

    /// 丢弃本地输入状态，不发出任何信号
    pub async fn cancel(&self, conversation_id: &str) {
        let mut outbound = self.outbound.write().await;
        outbound.remove(conversation_id);
    }

    // ========== 入站 ==========

    /// 应用一条远端 typing 事件
    ///
    /// 当前用户自己的事件被忽略；加入/移除在状态不变时都是 no-op
    /// （避免无意义的 UI 刷新）。返回集合成员是否发生变化。
    pub async fn apply_remote(
        &self,
        conversation_id: &str,
        user_id: &str,
        is_typing: bool,
        current_user_id: &str,
    ) -> bool {
        // 自己的输入指示不展示
        if user_id == current_user_id {
            return false;
        }

        let mut inbound = self.inbound.write().await;
        if is_typing {
            let set = inbound.entry(conversation_id.to_string()).or_default();
            let was_present = set.insert(user_id.to_string(), Instant::now()).is_some();
            // 已在集合中时只刷新时间戳，不算成员变化
            !was_present
        } else {
            match inbound.get_mut(conversation_id) {
                Some(set) => set.remove(user_id).is_some(),
                None => false,
            }
        }
    }

    /// 获取指定会话当前正在输入的用户 ID 列表
    pub async fn typing_users(&self, conversation_id: &str) -> Vec<String> {
        let inbound = self.inbound.read().await;
        match inbound.get(conversation_id) {
            Some(set) => {
                let mut users: Vec<String> = set.keys().cloned().collect();
                users.sort();
                users
            }
            None => Vec::new(),
        }
    }

    /// 清空指定会话的入站输入集合（会话视图关闭时调用）
    pub async fn clear_conversation(&self, conversation_id: &str) {
        let mut inbound = self.inbound.write().await;
        if inbound.remove(conversation_id).is_some() {
            debug!("Cleared typing set for conversation {}", conversation_id);
        }
        // 出站状态一并丢弃，视图关闭后不再发 stop 信号
        let mut outbound = self.outbound.write().await;
        outbound.remove(conversation_id);
    }

    /// 获取统计信息
    pub async fn get_stats(&self) -> TypingStats {
        let outbound = self.outbound.read().await;
        let inbound = self.inbound.read().await;
        TypingStats {
            active_outbound_count: outbound.len(),
            tracked_conversation_count: inbound.len(),
        }
    }

    /// 启动空闲清理任务
    ///
    /// 对端崩溃或 stop 信号丢失时没有服务端确认的过期机制，
    /// 这里按空闲超时兜底移除。
    fn start_idle_sweep(&self) {
        let inbound = self.inbound.clone();
        let idle_timeout = Duration::from_secs(self.config.idle_timeout_secs);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let now = Instant::now();
                let mut inbound = inbound.write().await;
                for (conversation_id, set) in inbound.iter_mut() {
                    let before = set.len();
                    set.retain(|_, last_event| now.duration_since(*last_event) < idle_timeout);
                    if set.len() < before {
                        debug!(
                            "Idle-swept {} typing entries in conversation {}",
                            before - set.len(),
                            conversation_id
                        );
                    }
                }
                inbound.retain(|_, set| !set.is_empty());
            }
        });
    }
}

impl Default for TypingCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// 输入状态统计
#[derive(Debug, Clone)]
pub struct TypingStats {
    pub active_outbound_count: usize,
    pub tracked_conversation_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn test_config() -> TypingConfig {
        TypingConfig {
            debounce_window_ms: 50,
            idle_timeout_secs: 10,
            enable_idle_sweep: false,
        }
    }

    #[tokio::test]
    async fn test_debounce_coalesces_bursts() {
        let coordinator = TypingCoordinator::with_config(test_config());

        // 第一次击键需要发送
        assert!(coordinator.note_activity("conv-1").await);
        // 窗口内的连续击键被合并
        assert!(!coordinator.note_activity("conv-1").await);
        assert!(!coordinator.note_activity("conv-1").await);

        // 窗口过后再次发送
        sleep(Duration::from_millis(60)).await;
        assert!(coordinator.note_activity("conv-1").await);
    }

    #[tokio::test]
    async fn test_flush_stop_is_immediate() {
        let coordinator = TypingCoordinator::with_config(test_config());

        coordinator.note_activity("conv-1").await;
        // 提交消息：立即发送 stop
        assert!(coordinator.flush_stop("conv-1").await);
        // 没有活动状态时不发送
        assert!(!coordinator.flush_stop("conv-1").await);
    }

    #[tokio::test]
    async fn test_cancel_emits_nothing() {
        let coordinator = TypingCoordinator::with_config(test_config());

        coordinator.note_activity("conv-1").await;
        coordinator.cancel("conv-1").await;

        // cancel 后状态已被丢弃，flush 不再要求发送
        assert!(!coordinator.flush_stop("conv-1").await);
    }

    #[tokio::test]
    async fn test_inbound_excludes_current_user() {
        let coordinator = TypingCoordinator::with_config(test_config());

        let changed = coordinator
            .apply_remote("conv-1", "user-1", true, "user-1")
            .await;
        assert!(!changed);
        assert!(coordinator.typing_users("conv-1").await.is_empty());

        let changed = coordinator
            .apply_remote("conv-1", "user-2", true, "user-1")
            .await;
        assert!(changed);
        assert_eq!(coordinator.typing_users("conv-1").await, vec!["user-2"]);
    }

    #[tokio::test]
    async fn test_inbound_noop_detection() {
        let coordinator = TypingCoordinator::with_config(test_config());

        assert!(
            coordinator
                .apply_remote("conv-1", "user-2", true, "user-1")
                .await
        );
        // 重复 start：成员未变
        assert!(
            !coordinator
                .apply_remote("conv-1", "user-2", true, "user-1")
                .await
        );
        assert!(
            coordinator
                .apply_remote("conv-1", "user-2", false, "user-1")
                .await
        );
        // 重复 stop：no-op
        assert!(
            !coordinator
                .apply_remote("conv-1", "user-2", false, "user-1")
                .await
        );
    }

    #[tokio::test]
    async fn test_clear_conversation_empties_set() {
        let coordinator = TypingCoordinator::with_config(test_config());

        coordinator
            .apply_remote("conv-1", "user-2", true, "user-1")
            .await;
        coordinator
            .apply_remote("conv-1", "user-3", true, "user-1")
            .await;
        assert_eq!(coordinator.typing_users("conv-1").await.len(), 2);

        coordinator.clear_conversation("conv-1").await;
        assert!(coordinator.typing_users("conv-1").await.is_empty());
    }

    #[tokio::test]
    async fn test_idle_sweep_removes_stale_entries() {
        let coordinator = TypingCoordinator::with_config(TypingConfig {
            debounce_window_ms: 50,
            idle_timeout_secs: 1,
            enable_idle_sweep: true,
        });

        coordinator
            .apply_remote("conv-1", "user-2", true, "user-1")
            .await;
        assert_eq!(coordinator.typing_users("conv-1").await.len(), 1);

        // 超过空闲超时后被清理（对端没发 stop 的兜底）
        sleep(Duration::from_millis(2500)).await;
        assert!(coordinator.typing_users("conv-1").await.is_empty());
    }
}
