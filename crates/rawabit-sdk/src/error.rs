use std::fmt;

#[derive(Debug)]
pub enum RawabitSDKError {
    InvalidArgument(String),
    NotFound(String),
    AlreadyExists(String),
    Other(String),
    Serialization(String),
    NotConnected,
    Transport(String),
    InvalidInput(String),
    InvalidOperation(String),
    Timeout(String),
    // SDK 相关错误
    Runtime(String),        // 运行时错误
    Config(String),         // 配置错误
    ShuttingDown(String),   // 正在关闭错误
}

impl fmt::Display for RawabitSDKError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawabitSDKError::InvalidArgument(e) => write!(f, "Invalid argument: {}", e),
            RawabitSDKError::NotFound(e) => write!(f, "Not found: {}", e),
            RawabitSDKError::AlreadyExists(e) => write!(f, "Already exists: {}", e),
            RawabitSDKError::Other(e) => write!(f, "Other error: {}", e),
            RawabitSDKError::Serialization(e) => write!(f, "Serialization error: {}", e),
            RawabitSDKError::NotConnected => write!(f, "Not connected"),
            RawabitSDKError::Transport(e) => write!(f, "Transport error: {}", e),
            RawabitSDKError::InvalidInput(e) => write!(f, "Invalid input: {}", e),
            RawabitSDKError::InvalidOperation(e) => write!(f, "Invalid operation: {}", e),
            RawabitSDKError::Timeout(e) => write!(f, "Timeout: {}", e),
            RawabitSDKError::Runtime(e) => write!(f, "Runtime error: {}", e),
            RawabitSDKError::Config(e) => write!(f, "Config error: {}", e),
            RawabitSDKError::ShuttingDown(e) => write!(f, "Shutting down: {}", e),
        }
    }
}

impl std::error::Error for RawabitSDKError {}

impl From<serde_json::Error> for RawabitSDKError {
    fn from(error: serde_json::Error) -> Self {
        RawabitSDKError::Serialization(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RawabitSDKError>;

/// 发送失败分类
///
/// 发送失败后本地乐观记录会被回滚，不做自动重试；分类仅用于
/// 上层提示和日志。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailureReason {
    NetworkTimeout,     // 网络超时
    NetworkUnavailable, // 无网络
    ServerError,        // 服务端错误
    InvalidMessage,     // 消息本身非法（空内容等），不重试
    Forbidden,          // 权限不足，不重试
    Unknown,            // 未分类
}

impl SendFailureReason {
    /// 从 SDK 错误归类发送失败原因
    pub fn classify(error: &RawabitSDKError) -> Self {
        match error {
            RawabitSDKError::Timeout(_) => SendFailureReason::NetworkTimeout,
            RawabitSDKError::NotConnected => SendFailureReason::NetworkUnavailable,
            RawabitSDKError::Transport(_) => SendFailureReason::ServerError,
            RawabitSDKError::InvalidInput(_) | RawabitSDKError::InvalidArgument(_) => {
                SendFailureReason::InvalidMessage
            }
            RawabitSDKError::InvalidOperation(_) => SendFailureReason::Forbidden,
            _ => SendFailureReason::Unknown,
        }
    }
}
