// Domain layer: bill/report models, API wire shapes and ports.

pub mod messages;
pub mod model;
pub mod ports;
