mod simulated;

pub use simulated::{InFlightMessage, SimulatedNetwork};
