//! # Vibha
//!
//! A tick-driven engine for the interactive parts of a school admissions site.
//!
//! ## Core Concepts
//!
//! - **SystemClock**: a ticker that acts as the single source of time.
//! - **Countdowns**: deadlines broken down into days, hours, minutes and
//!   seconds on every tick, with an urgency level and a one-time completion
//!   signal.
//! - **Form wizard**: the multi-step admission enquiry, validated per step and
//!   submitted to an external collaborator with a retryable failure state.
//! - **Rotators**: the testimonial carousel index, advancing on an interval
//!   unless paused.
//! - **Event-Driven**: everything the engine does is broadcast as a
//!   strongly-typed event (`CountdownEvent`, `WizardEvent`, ...).
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use vibha::prelude::*;
//! use chrono::{Duration, Utc};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = AdmissionsEngine::new(SiteConfig::default());
//!
//!     let mut countdown_events = engine.subscribe_countdown_events();
//!     tokio::spawn(async move {
//!         while let Ok(event) = countdown_events.recv().await {
//!             println!("{:?}", event);
//!         }
//!     });
//!
//!     let _deadline = engine
//!         .mount_countdown(
//!             Utc::now() + Duration::days(5),
//!             |remaining| println!("{} left", remaining),
//!             || println!("Admissions are closed."),
//!         )
//!         .await;
//!
//!     // Runs until Ctrl+C.
//!     engine.run().await?;
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Vibha Admissions Engine";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod common;
pub mod components;
pub mod config;
pub mod engine;
pub mod events;
pub mod forms;
pub mod submission;
pub mod time;

/// The most commonly used Vibha types.
pub mod prelude {
    pub use crate::common::{CountdownId, RotatorId, SessionId};
    pub use crate::components::countdown::{compute_remaining, TimeRemaining, UrgencyLevel};
    pub use crate::components::rotator::{Direction, Rotator, RotatorError};
    pub use crate::components::wizard::{FormWizard, WizardError, WizardStatus};
    pub use crate::config::{ClockResolution, SiteConfig};
    pub use crate::engine::{AdmissionsEngine, NewsletterError};
    pub use crate::events::{CountdownEvent, RotatorEvent, SystemEvent, WizardEvent};
    pub use crate::forms::FormSchema;
    pub use crate::submission::{
        Receipt, SimulatedSubmitter, SubmitError, SubmitFuture, Submission, Submitter,
    };
}
