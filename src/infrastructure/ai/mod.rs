//! Text generation backends

mod openai;
mod unconfigured;

pub use openai::{OpenAiTextGenerator, TokenPricing};
pub use unconfigured::UnconfiguredTextGenerator;
