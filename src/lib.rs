pub mod clients;
pub mod config;
pub mod deserializers;
pub mod error;
pub mod extract;
pub mod fallback;
pub mod ingest;
pub mod prompts;
pub mod reference;
pub mod schemas;
pub mod session;

pub use error::{Result, WarRoomError};
pub use session::{GenerationState, Generated, SessionController};
