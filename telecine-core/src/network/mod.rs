//! TCP transport for the scanner's frame stream.

mod connection;

pub use connection::{ScannerAddress, connect, receive};
