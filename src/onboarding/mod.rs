//! The scripted onboarding conversation
//!
//! - `stages`: the four stages, their narrative text, and the stage tracker
//! - `tool`: the `selectPaymentOption` function and how its calls move the script

pub mod stages;
pub mod tool;

pub use stages::{system_instruction, OnboardingStage, StageTracker};
pub use tool::{handle_tool_call, payment_tool, PaymentOption, ToolOutcome, SELECT_PAYMENT_OPTION};
