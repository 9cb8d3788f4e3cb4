//! Data models

pub mod telemetry;
pub mod features;
pub mod prediction;
pub mod packet_loss;
pub mod device_status;

pub use telemetry::*;
pub use features::*;
pub use prediction::*;
pub use packet_loss::*;
pub use device_status::*;
