//! One user session: phases, cached inputs, and the controller that
//! drives them.

mod controller;
mod state;

pub use controller::OrchestrationController;
pub use state::{ErrorOrigin, ErrorRecord, Phase};
