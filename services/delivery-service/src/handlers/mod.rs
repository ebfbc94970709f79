pub mod agents;
pub mod deliveries;
