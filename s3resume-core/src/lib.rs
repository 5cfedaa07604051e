pub mod chunk;
pub mod config;
pub mod errors;
pub mod identity;
pub mod models;
pub mod pending;
pub mod progress;
pub mod queue;
pub mod registry;
pub mod resume;
pub mod retry;
pub mod source;
pub mod storage;
pub mod transfer;
pub mod transport;

pub use chunk::*;
pub use config::*;
pub use errors::*;
pub use identity::*;
pub use models::*;
pub use pending::*;
pub use progress::*;
pub use queue::*;
pub use registry::*;
pub use resume::*;
pub use retry::*;
pub use source::*;
pub use storage::*;
pub use transfer::*;
pub use transport::*;
