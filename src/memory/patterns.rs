//! Pattern analyzer
//!
//! Pure functions over batches of historical data - no I/O, no clock reads.
//! Derives behavioral signals (commute time, interests, quiet hours,
//! preferred notification times) that the scheduler and Think prompts
//! consume.

use chrono::{DateTime, Local, NaiveTime, Timelike};
use once_cell::sync::Lazy;
use std::collections::{BTreeMap, BTreeSet};

use crate::context::ScheduleEntry;
use crate::memory::notifications::NotificationRecord;
use crate::memory::profiles::{QuietHours, UserPatterns};
use crate::state::Reaction;

/// Interest categories keyed to the keywords that signal them.
static INTEREST_KEYWORDS: Lazy<Vec<(&str, Vec<&str>)>> = Lazy::new(|| {
    vec![
        (
            "weather",
            vec!["날씨", "비", "우산", "기온", "눈", "맑", "흐림", "weather", "rain", "umbrella"],
        ),
        (
            "schedule",
            vec!["일정", "약속", "미팅", "회의", "모임", "스케줄", "meeting", "schedule"],
        ),
        (
            "commute",
            vec!["길찾기", "출근", "퇴근", "지하철", "버스", "택시", "commute", "subway", "bus"],
        ),
        ("news", vec!["뉴스", "소식", "기사", "news"]),
    ]
});

/// Schedule titles signalling the start of a workday.
static COMMUTE_KEYWORDS: Lazy<Vec<&str>> =
    Lazy::new(|| vec!["출근", "출발", "회사", "사무실", "업무", "commute", "office"]);

/// Messages asking for notifications to stop.
static QUIET_KEYWORDS: Lazy<Vec<&str>> =
    Lazy::new(|| vec!["그만", "금지", "알림 끄", "조용", "방해", "stop notify", "quiet"]);

/// A user message with the time it was sent, for quiet-hours inference.
#[derive(Debug, Clone)]
pub struct TimedMessage {
    pub text: String,
    pub at: DateTime<Local>,
}

impl TimedMessage {
    pub fn new(text: &str, at: DateTime<Local>) -> Self {
        Self {
            text: text.to_string(),
            at,
        }
    }
}

/// Derive commute and wake-up times from schedule titles.
///
/// The commute time is the statistical mode of start times for entries whose
/// title contains a commute keyword; ties go to the first value encountered
/// in sorted iteration. Wake-up is estimated one hour before the commute,
/// floored at 06:00.
pub fn extract_from_schedules(schedules: &[ScheduleEntry]) -> UserPatterns {
    let mut patterns = UserPatterns::default();

    let mut counts: BTreeMap<NaiveTime, usize> = BTreeMap::new();
    for schedule in schedules {
        let title = schedule.title.to_lowercase();
        if COMMUTE_KEYWORDS.iter().any(|k| title.contains(k)) {
            let time = hhmm(schedule.start_time.time());
            *counts.entry(time).or_insert(0) += 1;
        }
    }

    // Mode over a BTreeMap: strict > keeps the first (smallest) time on ties.
    let mut best: Option<(NaiveTime, usize)> = None;
    for (&time, &count) in &counts {
        if best.map(|(_, c)| count > c).unwrap_or(true) {
            best = Some((time, count));
        }
    }

    if let Some((commute, _)) = best {
        patterns.commute_time = Some(commute);
        let wake_hour = (commute.hour() as i32 - 1).max(6) as u32;
        patterns.wake_up_time = NaiveTime::from_hms_opt(wake_hour, 0, 0);
    }

    patterns
}

/// Collect interest categories mentioned across raw messages.
pub fn extract_interests(messages: &[String]) -> BTreeSet<String> {
    let mut interests = BTreeSet::new();
    for message in messages {
        let lower = message.to_lowercase();
        for (category, keywords) in INTEREST_KEYWORDS.iter() {
            if keywords.iter().any(|k| lower.contains(k)) {
                interests.insert(category.to_string());
            }
        }
    }
    interests
}

/// Infer a quiet window: a stop-notifying message sent between 22:00 and
/// 07:00 yields the default 22:00-08:00 window.
pub fn extract_quiet_hours(messages: &[TimedMessage]) -> Option<QuietHours> {
    for message in messages {
        let lower = message.text.to_lowercase();
        if QUIET_KEYWORDS.iter().any(|k| lower.contains(k)) {
            let hour = message.at.hour();
            if hour >= 22 || hour < 7 {
                return Some(QuietHours::new(
                    NaiveTime::from_hms_opt(22, 0, 0)?,
                    NaiveTime::from_hms_opt(8, 0, 0)?,
                ));
            }
        }
    }
    None
}

/// Times of day at which notifications drew a positive reaction.
pub fn analyze_feedback(notifications: &[NotificationRecord]) -> BTreeSet<NaiveTime> {
    notifications
        .iter()
        .filter(|n| n.user_reaction == Some(Reaction::Positive))
        .map(|n| hhmm(n.sent_at.time()))
        .collect()
}

/// Merge newly derived patterns into existing ones: set union for interests
/// and preferred times, last-write-wins for scalars.
pub fn merge(existing: &UserPatterns, new: &UserPatterns) -> UserPatterns {
    let mut merged = existing.clone();
    if new.wake_up_time.is_some() {
        merged.wake_up_time = new.wake_up_time;
    }
    if new.commute_time.is_some() {
        merged.commute_time = new.commute_time;
    }
    merged
        .preferred_notification_times
        .extend(new.preferred_notification_times.iter().copied());
    merged.interests.extend(new.interests.iter().cloned());
    merged
}

fn hhmm(time: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time)
}
