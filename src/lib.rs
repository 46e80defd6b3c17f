//! This crate implements the QDL download protocol used to push firmware images to
//! Qualcomm modems that boot into download mode.
//!
//! The protocol engine is `no_std` and talks to any transport implementing
//! [`core2::io::Read`] and [`core2::io::Write`]. With the `std` feature those are the
//! standard I/O traits, so a serial port or a file works directly.
//!
//! ```rust,no_run
//! # #[cfg(feature = "std")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use qdl_loader::{DirStore, LoaderConfig, TransferSession};
//!
//! let port = std::fs::OpenOptions::new().read(true).write(true).open("/dev/ttyUSB0")?;
//! let store = DirStore::new("/lib/firmware/gobi")?;
//! let mut session = TransferSession::prepare(port, &store, LoaderConfig::default())
//!     .map_err(|err| err.to_string())?;
//! session.run().map_err(|err| err.to_string())?;
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "std"))]
//! # fn main() {}
//! ```
#![no_std]
#![deny(unsafe_code, unused_import_braces)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    clippy::all,
    trivial_casts,
    trivial_numeric_casts,
    unused_qualifications
)]

extern crate alloc;
#[cfg(any(feature = "std", test))]
extern crate std;

#[macro_use]
extern crate log;

mod common;
pub mod consts;
pub mod image;
pub mod protocol;
pub mod session;
#[cfg(feature = "std")]
mod store;

pub use common::{Error, FirmwareStore, Result};
pub use image::{open_images, Chunk, Chunks, ImageKind, ImageSpec};
pub use protocol::ack::{read_ack, validate, AckCode, AckError};
pub use protocol::command::{Command, HardwareGeneration};
pub use protocol::crc::{crc16, frame_check};
pub use protocol::frame::{decode, encode, FrameError};
pub use session::{AckPolicy, LoaderConfig, Progress, State, TransferSession};
#[cfg(feature = "std")]
pub use store::{DirImage, DirStore};
