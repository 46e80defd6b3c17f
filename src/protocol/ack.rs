//! Acknowledgment frames sent back by the device.
//!
//! An acknowledgment is a delimited frame whose first body byte is a response code. Its
//! CRC is not checked: the device only ever answers with short fixed replies, and a
//! mismatch in the code is what matters to the sequencer.

use core2::io::Read;
use thiserror_no_std::Error;

use crate::common::Result;
use crate::consts::DELIMITER;
use crate::protocol::frame::decode;

/// Size of the buffer an acknowledgment is read into.
pub const ACK_BUFFER_LEN: usize = 256;

const MIN_ACK_LEN: usize = 4;

/// Response codes the sequencer waits for.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum AckCode {
    Hello = 0x02,
    ImageOpened = 0x26,
    ImageReceived = 0x28,
    #[default]
    Unknown = 0xFF,
}

impl From<AckCode> for u8 {
    fn from(v: AckCode) -> Self {
        v as Self
    }
}

impl From<u8> for AckCode {
    fn from(v: u8) -> Self {
        match v {
            0x02 => Self::Hello,
            0x26 => Self::ImageOpened,
            0x28 => Self::ImageReceived,
            _ => Self::Unknown,
        }
    }
}

/// Why an acknowledgment was rejected.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AckError {
    /// Fewer bytes than the smallest possible acknowledgment.
    #[error("acknowledgment too short ({len} bytes)")]
    TooShort {
        /// Number of bytes received.
        len: usize,
    },

    /// The reply does not start and end with a delimiter.
    #[error("acknowledgment is not delimited")]
    MissingFraming,

    /// The reply carries a different response code.
    #[error("expected response {expected:#04x}, got {got:#04x}")]
    UnexpectedCode {
        /// Code received.
        got: u8,
        /// Code the sequencer was waiting for.
        expected: u8,
    },
}

/// Checks that `frame` is a delimited acknowledgment carrying `expected_code`.
pub fn validate(frame: &[u8], expected_code: u8) -> core::result::Result<(), AckError> {
    if frame.len() < MIN_ACK_LEN {
        return Err(AckError::TooShort { len: frame.len() });
    }
    if frame[0] != DELIMITER || frame[frame.len() - 1] != DELIMITER {
        return Err(AckError::MissingFraming);
    }
    if frame[1] != expected_code {
        return Err(AckError::UnexpectedCode {
            got: frame[1],
            expected: expected_code,
        });
    }
    Ok(())
}

/// Reads one acknowledgment from `dev` and validates it against `expected`.
///
/// Exactly one `read` is issued; whatever it returns is taken as the whole reply. The
/// outer `Result` carries transport failures, the inner one the verdict.
pub fn read_ack<D: Read>(
    dev: &mut D,
    expected: AckCode,
) -> Result<core::result::Result<(), AckError>> {
    let mut buf = [0u8; ACK_BUFFER_LEN];
    let n = dev.read(&mut buf)?;
    let frame = &buf[..n];

    match decode(frame) {
        Ok(body) => trace!("<- {:02x?}", body),
        Err(err) => trace!("<- {} raw bytes ({})", n, err),
    }

    Ok(validate(frame, expected.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_expected_code() {
        assert_eq!(validate(&[0x7e, 0x02, 0x6a, 0xd3, 0x7e], 0x02), Ok(()));
        assert_eq!(validate(&[0x7e, 0x26, 0x00, 0x7e], 0x26), Ok(()));
    }

    #[test]
    fn too_short() {
        assert_eq!(validate(&[], 0x02), Err(AckError::TooShort { len: 0 }));
        assert_eq!(validate(&[0x7e, 0x02, 0x7e], 0x02), Err(AckError::TooShort { len: 3 }));
    }

    #[test]
    fn missing_framing() {
        assert_eq!(validate(&[0x00, 0x02, 0x00, 0x00, 0x7e], 0x02), Err(AckError::MissingFraming));
        assert_eq!(validate(&[0x7e, 0x02, 0x00, 0x00, 0x00], 0x02), Err(AckError::MissingFraming));
    }

    #[test]
    fn unexpected_code() {
        assert_eq!(
            validate(&[0x7e, 0x0d, 0x00, 0x00, 0x7e], 0x28),
            Err(AckError::UnexpectedCode { got: 0x0d, expected: 0x28 })
        );
    }

    #[test]
    fn length_is_checked_before_framing_and_code() {
        assert_eq!(validate(&[0x00, 0x00], 0x02), Err(AckError::TooShort { len: 2 }));
        assert_eq!(validate(&[0x00, 0x13, 0x00, 0x00], 0x02), Err(AckError::MissingFraming));
    }

    #[test]
    fn crc_is_not_checked() {
        assert_eq!(validate(&[0x7e, 0x28, 0xde, 0xad, 0x7e], 0x28), Ok(()));
    }

    #[test]
    fn read_ack_issues_a_single_read() {
        let mut wire: &[u8] = &[0x7e, 0x26, 0x00, 0x00, 0x7e, 0x7e, 0x28, 0x00, 0x00, 0x7e];
        // A slice yields everything in one read; both frames are judged as one reply.
        assert_eq!(read_ack(&mut wire, AckCode::ImageOpened).unwrap(), Ok(()));
        assert!(wire.is_empty());
    }

    #[test]
    fn read_ack_reports_eof_as_too_short() {
        let mut wire: &[u8] = &[];
        assert_eq!(
            read_ack(&mut wire, AckCode::Hello).unwrap(),
            Err(AckError::TooShort { len: 0 })
        );
    }

    #[test]
    fn ack_code_round_trips_through_u8() {
        assert_eq!(AckCode::from(0x28), AckCode::ImageReceived);
        assert_eq!(u8::from(AckCode::Hello), 0x02);
        assert_eq!(AckCode::from(0x99), AckCode::Unknown);
    }
}
