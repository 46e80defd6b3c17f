//! Byte stuffing and delimiter framing.
//!
//! A framed message is `7E <escaped body> 7E`. Inside the body every `7E` is sent as
//! `7D 5E` and every `7D` as `7D 5D`. Unframed messages go out verbatim.

use alloc::vec::Vec;

use core2::io::Write;
use thiserror_no_std::Error;

use crate::common::Result;
use crate::consts::{DELIMITER, ESCAPE, ESCAPE_MASK};

/// Reasons a received frame body could not be unescaped.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// The body ended right after an escape byte.
    #[error("frame ends with a dangling escape byte")]
    DanglingEscape,

    /// A delimiter appeared inside the body.
    #[error("unescaped delimiter at offset {offset}")]
    UnexpectedDelimiter {
        /// Offset of the delimiter within the frame.
        offset: usize,
    },
}

#[inline]
fn needs_escape(byte: u8) -> bool {
    byte == DELIMITER || byte == ESCAPE
}

/// Escapes `cmd` and wraps it in delimiters.
#[must_use]
pub fn encode(cmd: &[u8]) -> Vec<u8> {
    let escaped = cmd.iter().filter(|&&b| needs_escape(b)).count();
    let mut out = Vec::with_capacity(cmd.len() + escaped + 2);

    out.push(DELIMITER);
    for &byte in cmd {
        if needs_escape(byte) {
            out.push(ESCAPE);
            out.push(byte ^ ESCAPE_MASK);
        } else {
            out.push(byte);
        }
    }
    out.push(DELIMITER);

    out
}

/// Strips the delimiters from `frame` and reverses the escaping.
///
/// Either delimiter may be absent, so a bare escaped body decodes too.
pub fn decode(frame: &[u8]) -> core::result::Result<Vec<u8>, FrameError> {
    let start = usize::from(frame.first() == Some(&DELIMITER));
    let end = if frame.len() > start && frame.last() == Some(&DELIMITER) {
        frame.len() - 1
    } else {
        frame.len()
    };

    let mut out = Vec::with_capacity(end - start);
    let mut bytes = frame[start..end].iter().enumerate();
    while let Some((i, &byte)) = bytes.next() {
        match byte {
            ESCAPE => match bytes.next() {
                Some((_, &next)) => out.push(next ^ ESCAPE_MASK),
                None => return Err(FrameError::DanglingEscape),
            },
            DELIMITER => {
                return Err(FrameError::UnexpectedDelimiter { offset: start + i });
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

/// Writes `cmd` to `dev` as one delimited, escaped frame.
pub fn send_framed<D: Write>(dev: &mut D, cmd: &[u8]) -> Result<()> {
    let frame = encode(cmd);
    trace!("-> framed {} bytes ({} on the wire)", cmd.len(), frame.len());
    dev.write_all(&frame)?;
    Ok(())
}

/// Writes `cmd` to `dev` with no delimiters and no escaping.
pub fn send_raw<D: Write>(dev: &mut D, cmd: &[u8]) -> Result<()> {
    trace!("-> raw {} bytes", cmd.len());
    dev.write_all(cmd)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use proptest::prelude::*;

    #[test]
    fn plain_bytes_are_only_delimited() {
        assert_eq!(encode(&[0x29, 0xbb, 0x4c]), vec![0x7e, 0x29, 0xbb, 0x4c, 0x7e]);
    }

    #[test]
    fn reserved_bytes_are_escaped() {
        assert_eq!(
            encode(&[0x01, 0x7e, 0x02, 0x7d, 0x03]),
            vec![0x7e, 0x01, 0x7d, 0x5e, 0x02, 0x7d, 0x5d, 0x03, 0x7e]
        );
    }

    #[test]
    fn empty_command_is_two_delimiters() {
        assert_eq!(encode(&[]), vec![0x7e, 0x7e]);
        assert_eq!(decode(&[0x7e, 0x7e]), Ok(vec![]));
    }

    #[test]
    fn decode_accepts_missing_delimiters() {
        assert_eq!(decode(&[0x02, 0x7d, 0x5e]), Ok(vec![0x02, 0x7e]));
    }

    #[test]
    fn decode_rejects_dangling_escape() {
        assert_eq!(decode(&[0x7e, 0x02, 0x7d, 0x7e]), Err(FrameError::DanglingEscape));
    }

    #[test]
    fn decode_rejects_inner_delimiter() {
        assert_eq!(
            decode(&[0x7e, 0x02, 0x7e, 0x03, 0x7e]),
            Err(FrameError::UnexpectedDelimiter { offset: 2 })
        );
    }

    #[test]
    fn send_raw_writes_verbatim() {
        let mut wire = Vec::new();
        send_raw(&mut wire, &[0x7e, 0x7d]).unwrap();
        assert_eq!(wire, vec![0x7e, 0x7d]);
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(mut body in proptest::collection::vec(any::<u8>(), 0..128)) {
            body.push(DELIMITER);
            body.insert(0, ESCAPE);

            let frame = encode(&body);
            prop_assert_eq!(frame[0], DELIMITER);
            prop_assert_eq!(frame[frame.len() - 1], DELIMITER);
            prop_assert!(!frame[1..frame.len() - 1].contains(&DELIMITER));
            prop_assert_eq!(decode(&frame).unwrap(), body);
        }
    }
}
