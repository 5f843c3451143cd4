//! `PeopleBus` server: the `/api/people` HTTP tier, the request/reply bus it
//! dispatches through, and the repository workers behind the bus.

pub mod bus;
pub mod network;
pub mod repository;

pub use bus::{BusConfig, DispatchError, Dispatcher};
pub use network::{NetworkConfig, NetworkModule};
pub use repository::{PersonRepository, WorkerPool};
