pub mod controller;
pub mod types;

pub use controller::TurnController;
pub use types::{SynthesisState, TurnAction, TurnEvent};
