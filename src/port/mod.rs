//! Port abstraction layer for serial communication.
//!
//! Provides the adapter and opener traits plus the hardware and mock
//! implementations behind them.

pub mod error;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use error::PortError;
pub use mock::{MockPortOpener, MockSerialPort};
pub use sync_port::{SyncSerialPort, SystemPortOpener};
pub use traits::*;
