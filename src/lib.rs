//! nudgebot - a proactive personal-assistant agent
//!
//! Runs an autonomous decision loop per user: observe the environment,
//! think (business rules first, then an LLM judgment), act through a
//! messenger port, and reflect on the user's reaction to learn durable
//! lessons. Long-term state lives in SQLite behind the memory
//! repositories; an adaptive scheduler decides when each user's loop runs.
//!
//! # Architecture
//!
//! ```text
//! AdaptiveScheduler ──► Agent::run_once(user)
//!                          │
//!                          ├── Observe  (weather + calendar providers, memory)
//!                          ├── Think    (rule gate, then LLM port)
//!                          ├── Act      (messenger port, notification history)
//!                          └── Reflect  (reaction classifier, lesson extraction)
//!                          │
//!                       MemoryManager (profiles + lessons + notifications)
//! ```

pub mod agent;
pub mod config;
pub mod context;
pub mod llm;
pub mod memory;
pub mod messenger;
pub mod scheduler;
pub mod state;

pub use agent::{Agent, KeywordClassifier, ReactionClassifier};
pub use config::Config;
pub use context::{CalendarProvider, ScheduleEntry, WeatherProvider, WeatherSnapshot};
pub use llm::{AnthropicLlm, LlmError, LlmPort};
pub use memory::{MemoryManager, UserContext};
pub use messenger::{ConsoleMessenger, MessengerError, MessengerPort};
pub use scheduler::{AdaptiveScheduler, SchedulerStatus};
pub use state::{AgentAction, AgentState, Decision, Reaction, TimePeriod};
