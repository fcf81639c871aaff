pub mod backend;
pub mod bench;
pub mod config;
pub mod driver;
pub mod protocol;
pub mod resync;
pub mod sizes;
