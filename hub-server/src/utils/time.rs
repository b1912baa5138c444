//! 时间工具函数: 门店时区转换
//!
//! repository 层只接收 `i64` Unix millis；本地时间只用于营业窗口判断。

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;

/// 解析门店时区，失败回退 UTC
pub fn parse_tz(name: &str) -> Tz {
    name.parse().unwrap_or_else(|_| {
        tracing::warn!(timezone = %name, "Unknown timezone, falling back to UTC");
        Tz::UTC
    })
}

/// Unix millis → 门店本地时间
pub fn local_datetime(millis: i64, tz: Tz) -> NaiveDateTime {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or_default()
        .with_timezone(&tz)
        .naive_local()
}

/// 分钟 → 毫秒 (溢出时饱和)
pub fn minutes_to_millis(minutes: i64) -> i64 {
    minutes.saturating_mul(60_000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_tz_fallback() {
        assert_eq!(parse_tz("Asia/Almaty"), chrono_tz::Asia::Almaty);
        assert_eq!(parse_tz("Mars/Olympus"), Tz::UTC);
    }

    #[test]
    fn test_local_datetime() {
        // 2026-10-19T10:00:00Z
        let millis = 1_792_404_000_000;
        let local = local_datetime(millis, chrono_tz::Europe::Berlin);
        assert_eq!(local.hour(), 12);
    }

    #[test]
    fn test_minutes_to_millis_saturates() {
        assert_eq!(minutes_to_millis(30), 1_800_000);
        assert_eq!(minutes_to_millis(i64::MAX), i64::MAX);
        assert_eq!(minutes_to_millis(i64::MIN), i64::MIN);
    }
}
