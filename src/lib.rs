// src/lib.rs
// Public library surface for integration tests (and host bots embedding the
// pipeline).

pub mod assessment;
pub mod audit;
pub mod classifier;
pub mod cleanup;
pub mod config;
pub mod context_window;
pub mod cooldown;
pub mod dedup;
pub mod enforce;
pub mod parser;
pub mod pipeline;
pub mod platform;
pub mod prompt;

// Notifications (outcome push to subscribed observers)
pub mod notify;

// ---- Re-exports for stable public API ----
pub use crate::assessment::{ReporterPenalty, ViolationAction, ViolationAssessment, ViolationLevel};
pub use crate::pipeline::{ConfigOptions, ConfigScope, ReportPipeline, ReportReply};
pub use crate::platform::{ChatPlatform, PlatformMessage, ReportSession};

// Re-export notification types for easy use in bins/tests
pub use crate::notify::{NotificationEvent, Notifier, NotifierMux, PushSeverity};
