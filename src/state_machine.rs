//! Turn state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions:
//! `Planning -> (ToolExecuting -> Planning)* -> Responding -> Done`, with
//! `Failed` reachable from every active phase.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use state::{TurnContext, TurnFailure, TurnPhase};
pub use transition::{transition, TransitionError};
