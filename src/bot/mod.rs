// Chat-facing side: notifier seam, request state machine, Telegram transport

pub mod messages;
pub mod notifier;
pub mod orchestrator;
pub mod telegram;

pub use notifier::{ChatId, Choice, MessageId, Notifier, NotifyError, PhotoSource};
pub use orchestrator::{Inbound, RequestError, RequestOrchestrator, RequestReport, RequestState};
