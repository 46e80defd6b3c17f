//! Fixed-layout QDL commands.
//!
//! Every command is a constant template with a few fields substituted, followed by a
//! two-byte little-endian CRC slot computed over everything before it.

use core2::io::Write;

use crate::common::Result;
use crate::consts::{CMD_CLOSE, CMD_OPEN_IMAGE, CMD_SIZE_TRAILER};
use crate::image::ImageKind;
use crate::protocol::crc::frame_check;
use crate::protocol::frame::{send_framed, send_raw};

/// Upper bound on the length of any command, CRC included.
pub const MAX_COMMAND_LEN: usize = 38;

/// Wire bytes of one command, before framing.
pub type CommandBytes = heapless::Vec<u8, MAX_COMMAND_LEN>;

const CRC_LEN: usize = 2;

const HELLO_V1: [u8; 36] = *b"\x01QCOM high speed protocol hst\0\0\0\0\x04\x04\x30";
const HELLO_V2: [u8; 36] = *b"\x01QCOM high speed protocol hst\0\0\0\0\x05\x05\x30";

const OPEN_IMAGE: [u8; 13] = [
    CMD_OPEN_IMAGE, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00,
];
const OPEN_IMAGE_TYPE_AT: usize = 1;
const OPEN_IMAGE_SIZE_AT: usize = 2;

const SIZE_TRAILER: [u8; 11] = [
    CMD_SIZE_TRAILER, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];
const SIZE_TRAILER_SIZE_AT: usize = 7;

const CLOSE: [u8; 1] = [CMD_CLOSE];

const _: () = assert!(HELLO_V1.len() + CRC_LEN <= MAX_COMMAND_LEN);

/// Download-mode hardware revision targeted by the session.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HardwareGeneration {
    /// First generation: two images, original hello marker.
    #[default]
    V1,
    /// Second generation ("Gobi 2000"): hello marker bumped, optional UQCN image.
    V2,
}

impl HardwareGeneration {
    fn hello_template(self) -> &'static [u8] {
        match self {
            Self::V1 => &HELLO_V1,
            Self::V2 => &HELLO_V2,
        }
    }
}

/// A single protocol message.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Opens the download session.
    Hello {
        /// Selects the hello template.
        generation: HardwareGeneration,
    },
    /// Announces the next image and its declared size.
    OpenImage {
        /// Which image slot is being opened.
        kind: ImageKind,
        /// Declared size in bytes.
        size: u32,
    },
    /// Repeats the declared size right after an `OpenImage`. Sent unframed.
    SizeTrailer {
        /// Declared size in bytes.
        size: u32,
    },
    /// Ends the download session.
    Close,
}

impl Command {
    /// Builds the complete byte sequence, CRC slot included.
    #[must_use]
    pub fn to_bytes(&self) -> CommandBytes {
        match *self {
            Self::Hello { generation } => seal(generation.hello_template()),
            Self::OpenImage { kind, size } => {
                let mut body = OPEN_IMAGE;
                body[OPEN_IMAGE_TYPE_AT] = kind.type_byte();
                put_u32(&mut body, OPEN_IMAGE_SIZE_AT, size);
                seal(&body)
            }
            Self::SizeTrailer { size } => {
                let mut body = SIZE_TRAILER;
                put_u32(&mut body, SIZE_TRAILER_SIZE_AT, size);
                seal(&body)
            }
            Self::Close => seal(&CLOSE),
        }
    }

    /// Whether the command is delimited and escaped on the wire.
    #[must_use]
    pub fn is_framed(&self) -> bool {
        !matches!(self, Self::SizeTrailer { .. })
    }

    /// Writes the command to `dev`, framed or raw as the protocol requires.
    pub fn send<D: Write>(&self, dev: &mut D) -> Result<()> {
        debug!("Sending {:?}", self);
        let bytes = self.to_bytes();
        if self.is_framed() {
            send_framed(dev, &bytes)
        } else {
            send_raw(dev, &bytes)
        }
    }
}

fn put_u32(body: &mut [u8], at: usize, value: u32) {
    body[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn seal(body: &[u8]) -> CommandBytes {
    let check = frame_check(body).to_le_bytes();
    body.iter().chain(check.iter()).copied().collect()
}
