//! Collection of protocol bytes for internal usage in `qdl-loader` (QDL-specific)

/// Marks the start and end of a framed message.
pub const DELIMITER: u8 = 0x7E;
/// Introduces an escaped byte inside a frame.
pub const ESCAPE: u8 = 0x7D;
/// XOR mask applied to the byte following [`ESCAPE`].
pub const ESCAPE_MASK: u8 = 0x20;

/// Hello (session open) command code.
pub const CMD_HELLO: u8 = 0x01;
/// Open-image command code.
pub const CMD_OPEN_IMAGE: u8 = 0x25;
/// Size trailer command code, sent unframed after an open.
pub const CMD_SIZE_TRAILER: u8 = 0x27;
/// Close (session end) command code.
pub const CMD_CLOSE: u8 = 0x29;

/// Image type byte for the AMSS modem image.
pub const IMAGE_AMSS: u8 = 0x05;
/// Image type byte for the APPS image.
pub const IMAGE_APPS: u8 = 0x06;
/// Image type byte for the UQCN configuration image.
pub const IMAGE_UQCN: u8 = 0x0D;

/// Bytes of image data sent per write.
pub const CHUNK_SIZE: usize = 262_144;
/// Bytes the first image withholds from both its declared size and its data.
pub const TRAILER_LEN: usize = 8;
/// Initial CRC accumulator for every command.
pub const CRC_INIT: u16 = 0xFFFF;
