use core2::io::{self, Read};
use thiserror_no_std::Error as ThisError;

use crate::image::ImageKind;
use crate::protocol::ack::AckError;

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Everything that can stop a download.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Reading from or writing to the serial transport failed.
    #[error("serial transport failed: {0}")]
    Transport(io::Error),

    /// Reading image data from the firmware store failed.
    #[error("failed to read {kind} image: {error}")]
    ImageRead {
        /// The image being read.
        kind: ImageKind,
        /// Underlying I/O error.
        error: io::Error,
    },

    /// An image exists but could not be opened or inspected.
    #[error("failed to open firmware image {name}: {error}")]
    ImageOpen {
        /// File name that was looked up.
        name: &'static str,
        /// Underlying I/O error.
        error: io::Error,
    },

    /// A mandatory image file does not exist.
    #[error("firmware image {name} not found")]
    ImageNotFound {
        /// File name that was looked up.
        name: &'static str,
    },

    /// The image size cannot be carried by the open command.
    #[error("{kind} image is {size} bytes, which the protocol cannot describe")]
    ImageSize {
        /// The offending image.
        kind: ImageKind,
        /// Its size in bytes.
        size: u64,
    },

    /// The device answered with something other than the expected acknowledgment.
    #[error("acknowledgment rejected: {0}")]
    Ack(AckError),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Transport(err)
    }
}

impl From<AckError> for Error {
    fn from(err: AckError) -> Error {
        Error::Ack(err)
    }
}

/// Source of firmware image files.
pub trait FirmwareStore {
    /// Readable handle to one image.
    type Image: Read;

    /// Opens the image called `name`.
    ///
    /// Returns [`Error::ImageNotFound`] when no such image exists.
    fn open(&self, name: &'static str) -> Result<Self::Image>;

    /// Size of an opened image in bytes.
    fn size(&self, image: &Self::Image) -> Result<u64>;
}
