//! Signal module - ordered rule engine producing directional signals
//!
//! Rules are evaluated in a fixed priority order; the first rule whose
//! preconditions hold supplies the signal. No rule firing is a normal
//! outcome, not an error. Raw confidence comes from a static
//! (signal_type, regime) lookup; price levels are sized from volatility
//! while preserving stop < entry < target (reversed for shorts).

mod generator;
mod rules;

pub use generator::SignalGenerator;
pub use rules::{BoxedRule, BreakoutRule, MeanReversionRule, MomentumRule, RuleMatch, SignalRule};
