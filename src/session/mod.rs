pub mod context;
pub mod controller;
pub mod error;
pub mod events;
pub mod manager;
pub mod transport;

pub use context::SessionContext;
pub use controller::SessionController;
pub use error::SessionError;
pub use events::{ConnectionStatus, SessionStreamState, SessionUpdate, StreamPhase};
pub use manager::SessionManager;
pub use transport::{Transport, TransportMessage};
