//! 在线状态管理模块
//!
//! 功能包括：
//! - 缓存服务端推送的用户在线状态
//! - 供点查询使用的最新状态读取
//!
//! 纯被动：只消费 presence 推送事件，不做轮询。会话参与者记录的
//! 改写由事件泵通过 `ConversationCache::apply_presence` 完成；
//! 针对单个用户的点查询走按用户过滤的事件订阅。

use crate::entities::UserStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// 单个用户的在线状态信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceInfo {
    pub user_id: String,
    pub status: UserStatus,
    pub last_seen: DateTime<Utc>,
}

/// 在线状态跟踪器
pub struct PresenceTracker {
    /// 在线状态缓存
    status_cache: Arc<RwLock<HashMap<String, PresenceInfo>>>,
}

impl PresenceTracker {
    /// 创建新的在线状态跟踪器
    pub fn new() -> Self {
        Self {
            status_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 应用一次服务端推送的状态变更
    pub async fn apply(&self, user_id: &str, status: UserStatus, last_seen: DateTime<Utc>) {
        let mut cache = self.status_cache.write().await;
        cache.insert(
            user_id.to_string(),
            PresenceInfo {
                user_id: user_id.to_string(),
                status,
                last_seen,
            },
        );
        debug!("Updated presence for user {}: {:?}", user_id, status);
    }

    /// 获取用户在线状态（从缓存）
    pub async fn get(&self, user_id: &str) -> Option<PresenceInfo> {
        let cache = self.status_cache.read().await;
        cache.get(user_id).cloned()
    }

    /// 用户当前是否在线（未知用户视为离线）
    pub async fn is_online(&self, user_id: &str) -> bool {
        let cache = self.status_cache.read().await;
        cache
            .get(user_id)
            .map(|info| info.status == UserStatus::Online)
            .unwrap_or(false)
    }

    /// 已缓存的用户数
    pub async fn cached_count(&self) -> usize {
        self.status_cache.read().await.len()
    }

    /// 清空缓存
    pub async fn clear(&self) {
        let mut cache = self.status_cache.write().await;
        cache.clear();
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new()
    }
}
