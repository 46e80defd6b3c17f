//! Wire-level pieces of the QDL protocol.

pub mod ack;
pub mod command;
pub mod crc;
pub mod frame;
