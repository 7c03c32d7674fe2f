//! Sector indicator state with actor pattern
//!
//! SectorManager owns the SectorBoard and processes messages via channels,
//! serializing every read-modify-write on the indicator store.

mod board;
mod manager;
mod messages;

pub use board::SectorBoard;
pub use manager::SectorManager;
pub use messages::SectorCommand;
