//! Instance, surface, device and context bring-up

pub mod context;
pub mod device;
pub mod instance;
pub mod surface;
