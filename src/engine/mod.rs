pub mod delivery;
pub mod gateway;
pub mod monitor;
pub mod targeting;
