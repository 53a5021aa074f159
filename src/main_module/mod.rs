//! Process-level wiring: router assembly, health, shutdown, and seeding.

mod health;
mod seed;
mod server;
mod shutdown;

pub use health::*;
pub use seed::*;
pub use server::*;
pub use shutdown::*;
