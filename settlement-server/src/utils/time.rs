//! 时间工具函数 — 业务时区转换与可注入时钟
//!
//! 引擎内部统一使用 `i64` Unix millis，日期边界在业务时区下计算。

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

pub const MILLIS_PER_DAY: i64 = 86_400_000;

/// Source of "now" for the engine
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        shared::util::now_millis()
    }
}

/// Manually driven clock for tests and replays
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(now_millis),
        }
    }

    /// Clock starting at the given UTC date-time
    pub fn at(date: NaiveDate, time: NaiveTime) -> Self {
        Self::new(date.and_time(time).and_utc().timestamp_millis())
    }

    pub fn set(&self, now_millis: i64) {
        self.now.store(now_millis, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let millis = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        // Saturates instead of wrapping
        let _ = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |now| Some(now.saturating_add(millis)));
    }

    pub fn advance_days(&self, days: i64) {
        self.now.fetch_add(days * MILLIS_PER_DAY, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Unix millis → 业务日期
pub fn business_date(millis: i64, tz: Tz) -> NaiveDate {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or_default()
        .with_timezone(&tz)
        .date_naive()
}

/// 日期 → `YYYY-MM-DD`
pub fn date_label(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// 月份标签 `YYYY-MM`
pub fn month_label(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// Label of the month before `date`
pub fn previous_month_label(date: NaiveDate) -> String {
    let first = date.with_day(1).unwrap_or(date);
    let last_of_prev = first.pred_opt().unwrap_or(first);
    month_label(last_of_prev)
}

/// 日期 + cutoff 时间 → Unix millis (业务时区)
///
/// DST gap fallback: 如果本地时间不存在 (夏令时跳跃)，fallback 到 UTC。
pub fn date_cutoff_millis(date: NaiveDate, cutoff: NaiveTime, tz: Tz) -> i64 {
    let naive = date.and_time(cutoff);
    naive
        .and_local_timezone(tz)
        .latest()
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_else(|| naive.and_utc().timestamp_millis())
}

/// 解析 cutoff 时间字符串 (HH:MM)，失败返回 None
pub fn parse_cutoff(cutoff: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(cutoff, "%H:%M").ok()
}

/// Business date whose sweep is due at `now`
///
/// Before the cutoff the current day's sweep has not fired yet, so the due
/// date is yesterday.
pub fn due_sweep_date(now_millis: i64, cutoff: NaiveTime, tz: Tz) -> NaiveDate {
    let today = business_date(now_millis, tz);
    if now_millis < date_cutoff_millis(today, cutoff, tz) {
        today.pred_opt().unwrap_or(today)
    } else {
        today
    }
}

/// Time left until the next cutoff strictly after `now`
pub fn duration_until_next_cutoff(now_millis: i64, cutoff: NaiveTime, tz: Tz) -> Duration {
    let today = business_date(now_millis, tz);
    let mut next = date_cutoff_millis(today, cutoff, tz);
    if next <= now_millis {
        let tomorrow = today.succ_opt().unwrap_or(today);
        next = date_cutoff_millis(tomorrow, cutoff, tz);
    }
    Duration::from_millis((next - now_millis).max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_000);
        clock.advance_days(2);
        assert_eq!(clock.now_millis(), 1_000 + 2 * MILLIS_PER_DAY);
        clock.advance(Duration::from_secs(1));
        assert_eq!(clock.now_millis(), 1_000 + 2 * MILLIS_PER_DAY + 1_000);

        // Durations past i64 millis clamp at the end of time
        clock.advance(Duration::MAX);
        assert_eq!(clock.now_millis(), i64::MAX);
    }

    #[test]
    fn test_month_labels() {
        assert_eq!(month_label(ymd(2026, 10, 16)), "2026-10");
        assert_eq!(previous_month_label(ymd(2026, 10, 1)), "2026-09");
        assert_eq!(previous_month_label(ymd(2026, 1, 1)), "2025-12");
    }

    #[test]
    fn test_due_sweep_date() {
        let cutoff = NaiveTime::from_hms_opt(0, 5, 0).unwrap();
        let tz = chrono_tz::UTC;
        let before = date_cutoff_millis(ymd(2026, 10, 16), NaiveTime::from_hms_opt(0, 1, 0).unwrap(), tz);
        let after = date_cutoff_millis(ymd(2026, 10, 16), NaiveTime::from_hms_opt(9, 0, 0).unwrap(), tz);
        assert_eq!(due_sweep_date(before, cutoff, tz), ymd(2026, 10, 15));
        assert_eq!(due_sweep_date(after, cutoff, tz), ymd(2026, 10, 16));
    }

    #[test]
    fn test_duration_until_next_cutoff() {
        let cutoff = NaiveTime::from_hms_opt(0, 5, 0).unwrap();
        let tz = chrono_tz::UTC;
        let now = date_cutoff_millis(ymd(2026, 10, 16), NaiveTime::from_hms_opt(0, 0, 0).unwrap(), tz);
        assert_eq!(duration_until_next_cutoff(now, cutoff, tz), Duration::from_secs(300));

        let at_cutoff = date_cutoff_millis(ymd(2026, 10, 16), cutoff, tz);
        assert_eq!(
            duration_until_next_cutoff(at_cutoff, cutoff, tz),
            Duration::from_secs(86_400)
        );
    }

    #[test]
    fn test_business_date_in_timezone() {
        // 2026-10-15 23:30 UTC is already the 16th in Shanghai
        let millis = date_cutoff_millis(ymd(2026, 10, 15), NaiveTime::from_hms_opt(23, 30, 0).unwrap(), chrono_tz::UTC);
        assert_eq!(business_date(millis, chrono_tz::Asia::Shanghai), ymd(2026, 10, 16));
        assert_eq!(business_date(millis, chrono_tz::UTC), ymd(2026, 10, 15));
    }
}
