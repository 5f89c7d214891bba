//! 时间处理工具模块
//!
//! 提供时区配置与日历日期换算，供消息时间线按天分组使用
//!
//! # 设计原则
//!
//! - **存储层**: 所有时间字段使用 UTC（`DateTime<Utc>`）
//! - **显示层**: 根据显式传入的时区配置换算日历日期
//! - 时区配置作为参数逐层传递，不使用全局静态状态

use chrono::{DateTime, FixedOffset, Local, NaiveDate, Utc};

/// 时区配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimezoneConfig {
    /// 时区偏移（秒），例如：+08:00 = 28800, -05:00 = -18000
    pub offset_seconds: i32,
}

impl TimezoneConfig {
    /// 创建时区配置（从小时偏移）
    ///
    /// # 参数
    ///
    /// * `hours` - 时区小时偏移，例如：+8, -5
    pub fn from_hours(hours: i32) -> Self {
        Self {
            offset_seconds: hours * 3600,
        }
    }

    /// 创建时区配置（从分钟偏移）
    ///
    /// # 参数
    ///
    /// * `minutes` - 时区分钟偏移，例如：480 (+8小时), -300 (-5小时)
    pub fn from_minutes(minutes: i32) -> Self {
        Self {
            offset_seconds: minutes * 60,
        }
    }

    /// 使用系统本地时区
    pub fn local() -> Self {
        let now = Local::now();
        Self {
            offset_seconds: now.offset().local_minus_utc(),
        }
    }

    /// 获取 FixedOffset，偏移超出合法范围时返回 None
    pub fn to_fixed_offset(&self) -> Option<FixedOffset> {
        FixedOffset::east_opt(self.offset_seconds)
    }
}

impl Default for TimezoneConfig {
    fn default() -> Self {
        // UTC
        Self { offset_seconds: 0 }
    }
}

/// 将 UTC 时间换算为配置时区下的日历日期
///
/// 偏移非法时退回 UTC 日期。
pub fn local_date(ts: DateTime<Utc>, tz: TimezoneConfig) -> NaiveDate {
    match tz.to_fixed_offset() {
        Some(offset) => ts.with_timezone(&offset).date_naive(),
        None => ts.date_naive(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timezone_config() {
        let config = TimezoneConfig::from_hours(8);
        assert_eq!(config.offset_seconds, 28800);

        let config = TimezoneConfig::from_minutes(480);
        assert_eq!(config.offset_seconds, 28800);

        assert_eq!(TimezoneConfig::default().offset_seconds, 0);
    }

    #[test]
    fn test_local_date_crosses_midnight() {
        // UTC 2024-01-17 22:30 在 +08:00 时区已经是 1 月 18 日
        let ts = Utc.with_ymd_and_hms(2024, 1, 17, 22, 30, 0).unwrap();

        let utc_date = local_date(ts, TimezoneConfig::default());
        assert_eq!(utc_date, NaiveDate::from_ymd_opt(2024, 1, 17).unwrap());

        let cn_date = local_date(ts, TimezoneConfig::from_hours(8));
        assert_eq!(cn_date, NaiveDate::from_ymd_opt(2024, 1, 18).unwrap());

        // 西半球方向同理
        let ts = Utc.with_ymd_and_hms(2024, 1, 17, 2, 0, 0).unwrap();
        let ny_date = local_date(ts, TimezoneConfig::from_hours(-5));
        assert_eq!(ny_date, NaiveDate::from_ymd_opt(2024, 1, 16).unwrap());
    }
}
