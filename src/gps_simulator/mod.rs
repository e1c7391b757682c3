pub mod codec;
pub mod connector;
pub mod device;
pub mod fleet;
pub mod location;
