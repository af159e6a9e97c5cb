//! Prompt templates for the Think and Reflect stages
//!
//! Both prompts demand a JSON-only reply; the parsers in `llm.rs` still
//! tolerate code fences and surrounding prose.

use chrono::Timelike;

use crate::state::AgentState;

/// Build the Think-stage decision prompt from the observed state.
pub fn think_prompt(state: &AgentState) -> String {
    let weather = state
        .weather
        .as_ref()
        .map(|w| {
            format!(
                "{} (umbrella needed: {})",
                w.description,
                if w.needs_umbrella { "yes" } else { "no" }
            )
        })
        .unwrap_or_else(|| "unknown".to_string());

    let schedules = if state.today_schedules.is_empty() {
        "none".to_string()
    } else {
        state
            .today_schedules
            .iter()
            .map(|s| format!("- {}: {}", s.start_time.format("%H:%M"), s.title))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let upcoming = match (&state.upcoming_schedule, state.minutes_to_next) {
        (Some(s), Some(minutes)) => format!("{} (in {} minutes)", s.title, minutes),
        (Some(s), None) => s.title.clone(),
        _ => "none".to_string(),
    };

    let lessons = if state.relevant_lessons.is_empty() {
        "none".to_string()
    } else {
        state
            .relevant_lessons
            .iter()
            .map(|l| format!("- {}", l.content))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"You are the judgment engine of a proactive personal assistant.
Decide whether to contact the user right now or stay silent.

## Current situation
- Time: {time} ({period})
- Weather: {weather}
- Today's schedule:
{schedules}
- Next event: {upcoming}
- Notifications already sent today: {count}

## Lessons from past mistakes
{lessons}

## Rules
1. Only contact the user when the message is genuinely useful right now.
2. When in doubt, wait. Silence is always acceptable; noise is not.
3. Respect the lessons above - they come from real user reactions.

## Response format (JSON only, no other text)
{{
  "reasoning": "why act or wait",
  "decision": "act" | "wait",
  "confidence": 0.0-1.0,
  "action": {{"type": "notify", "message": "the message to send"}} or null
}}"#,
        time = format!("{:02}:{:02}", state.current_time.hour(), state.current_time.minute()),
        period = state.time_period.as_str(),
        weather = weather,
        schedules = schedules,
        upcoming = upcoming,
        count = state.today_notification_count,
        lessons = lessons,
    )
}

/// Build the Reflect-stage lesson-extraction prompt.
pub fn reflect_prompt(state: &AgentState, reaction_text: &str) -> String {
    let (kind, message) = state
        .action
        .as_ref()
        .map(|a| (a.kind.as_str(), a.message.as_str()))
        .unwrap_or(("unknown", ""));

    let sent_at = state
        .action_result
        .as_ref()
        .map(|r| r.timestamp.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let weather = state
        .weather
        .as_ref()
        .map(|w| w.description.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let schedules = state
        .today_schedules
        .iter()
        .map(|s| s.title.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"You are the reflection engine of a proactive personal assistant.
Analyze the action just taken and the user's reaction, and extract a lesson
if there is one worth keeping.

## Action taken
- Type: {kind}
- Message: {message}
- Sent at: {sent_at}

## Situation at the time
- Time period: {period}
- Weather: {weather}
- Schedule: {schedules}

## User reaction
{reaction}

## Instructions
1. Was the reaction positive, negative or neutral?
2. If negative, work out why.
3. Extract what to avoid and what to do instead next time.

## Response format (JSON only, no other text)
{{
  "reaction_type": "positive" | "negative" | "neutral",
  "analysis": "short analysis",
  "should_save_lesson": true | false,
  "lesson": {{
    "context": "in what situation",
    "should_not": "what to avoid",
    "should_instead": "what to do instead",
    "importance": "low" | "medium" | "high"
  }}
}}"#,
        kind = kind,
        message = message,
        sent_at = sent_at,
        period = state.time_period.as_str(),
        weather = weather,
        schedules = if schedules.is_empty() { "none" } else { &schedules },
        reaction = reaction_text,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ScheduleEntry, WeatherSnapshot};
    use chrono::{Local, NaiveDate, TimeZone};

    fn state_at_ten() -> AgentState {
        let now = Local
            .from_local_datetime(
                &NaiveDate::from_ymd_opt(2025, 3, 10)
                    .unwrap()
                    .and_hms_opt(10, 0, 0)
                    .unwrap(),
            )
            .single()
            .unwrap();
        let mut state = AgentState::new("U1", now);
        state.weather = Some(WeatherSnapshot {
            description: "light rain".to_string(),
            needs_umbrella: true,
        });
        state.today_schedules = vec![ScheduleEntry::new("standup", now)];
        state
    }

    #[test]
    fn test_think_prompt_includes_observations() {
        let prompt = think_prompt(&state_at_ten());
        assert!(prompt.contains("light rain"));
        assert!(prompt.contains("standup"));
        assert!(prompt.contains("morning"));
        assert!(prompt.contains("\"decision\""));
    }

    #[test]
    fn test_think_prompt_handles_empty_context() {
        let now = Local::now();
        let prompt = think_prompt(&AgentState::new("U1", now));
        assert!(prompt.contains("unknown"));
        assert!(prompt.contains("none"));
    }
}
