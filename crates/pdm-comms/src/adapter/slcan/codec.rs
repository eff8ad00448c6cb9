//! slcan ASCII frame codec

use pdm_protocol::{Frame, MAX_STANDARD_ID};
use tracing::trace;

use crate::error::TransportError;

/// Shortest line that can hold a frame: `t`, 3 id digits, 1 length digit
const MIN_LINE_LEN: usize = 5;

/// Lines longer than any frame are noise
const MAX_LINE_LEN: usize = 64;

/// Bell; the interface rejected the last command
const BELL: u8 = 0x07;

fn hex_digit(nibble: u8) -> u8 {
    if nibble < 10 {
        nibble + 0x30
    } else {
        nibble + 0x37
    }
}

fn nibble(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - 0x30),
        b'A'..=b'F' => Some(digit - 0x37),
        b'a'..=b'f' => Some(digit - 0x57),
        _ => None,
    }
}

fn parse_hex(digits: &[u8]) -> Option<u32> {
    digits
        .iter()
        .try_fold(0u32, |acc, &d| Some((acc << 4) | u32::from(nibble(d)?)))
}

/// Encode a frame as a transmit command, including the trailing `\r`
pub fn encode(frame: &Frame) -> Result<Vec<u8>, TransportError> {
    if frame.id() > MAX_STANDARD_ID {
        return Err(TransportError::InvalidFrame(format!(
            "id 0x{:X} needs an extended frame",
            frame.id()
        )));
    }

    let mut out = Vec::with_capacity(MIN_LINE_LEN + 2 * frame.len() + 1);
    out.push(b't');
    let id = frame.id();
    for shift in [8, 4, 0] {
        out.push(hex_digit(((id >> shift) & 0xF) as u8));
    }
    out.push(hex_digit(frame.len() as u8));
    for byte in frame.payload() {
        out.push(hex_digit(byte >> 4));
        out.push(hex_digit(byte & 0xF));
    }
    out.push(b'\r');
    Ok(out)
}

/// Decode one received line (without the trailing `\r`)
pub fn decode_frame(line: &[u8]) -> Option<Frame> {
    if line.len() < MIN_LINE_LEN || line[0] != b't' {
        return None;
    }

    let id = parse_hex(&line[1..4])?;
    let len = nibble(line[4])?;
    if usize::from(len) > Frame::MAX_LEN {
        return None;
    }

    let digits = line.get(MIN_LINE_LEN..MIN_LINE_LEN + 2 * usize::from(len))?;
    let mut data = [0u8; 8];
    for (byte, pair) in data.iter_mut().zip(digits.chunks_exact(2)) {
        *byte = (nibble(pair[0])? << 4) | nibble(pair[1])?;
    }
    Frame::from_raw(id, len, data).ok()
}

/// Bitrate setup command for the interface
pub fn bitrate_command(bitrate: pdm_protocol::CanBitRate) -> &'static [u8] {
    use pdm_protocol::CanBitRate;

    match bitrate {
        CanBitRate::Kbps125 => b"S4\r",
        CanBitRate::Kbps250 => b"S5\r",
        CanBitRate::Kbps500 => b"S6\r",
        CanBitRate::Kbps1000 => b"S8\r",
    }
}

/// Splits the serial byte stream into frames
///
/// Reads can end mid-line; the partial line is kept until its `\r` arrives.
#[derive(Debug, Default)]
pub struct SlcanDecoder {
    line: Vec<u8>,
    /// Current line overran `MAX_LINE_LEN`; skip to its `\r`
    discarding: bool,
}

impl SlcanDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        for &byte in bytes {
            match byte {
                b'\r' if self.discarding => self.discarding = false,
                b'\r' => {
                    if !self.line.is_empty() {
                        match decode_frame(&self.line) {
                            Some(frame) => frames.push(frame),
                            None => trace!(
                                line = %String::from_utf8_lossy(&self.line),
                                "Skipping non-frame line"
                            ),
                        }
                        self.line.clear();
                    }
                }
                b'\n' => {}
                BELL => self.reset(),
                _ if self.discarding => {}
                _ => {
                    self.line.push(byte);
                    if self.line.len() > MAX_LINE_LEN {
                        trace!("Discarding overlong line");
                        self.line.clear();
                        self.discarding = true;
                    }
                }
            }
        }
        frames
    }

    /// Bytes held back waiting for a line end
    pub fn buffered(&self) -> usize {
        self.line.len()
    }

    pub fn reset(&mut self) {
        self.line.clear();
        self.discarding = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdm_protocol::CanBitRate;
    use rstest::rstest;

    #[test]
    fn test_encode_standard_frame() {
        let frame = Frame::new(0x123, &[0x01, 0x02, 0x03]).unwrap();
        assert_eq!(encode(&frame).unwrap(), b"t1233010203\r");
    }

    #[test]
    fn test_encode_uses_uppercase_digits() {
        let frame = Frame::new(0x7AB, &[0xCD, 0xEF]).unwrap();
        assert_eq!(encode(&frame).unwrap(), b"t7AB2CDEF\r");
    }

    #[test]
    fn test_encode_rejects_extended_id() {
        let frame = Frame::new(0x800, &[1]).unwrap();
        assert!(matches!(encode(&frame), Err(TransportError::InvalidFrame(_))));
    }

    #[rstest]
    #[case(0x2D0, &[0x85, 0x01, 0xFF, 0x00, 0x10])]
    #[case(0x7D8, &[0x01, 0x2A, 0xFF])]
    fn test_round_trip(#[case] id: u32, #[case] payload: &[u8]) {
        let frame = Frame::new(id, payload).unwrap();
        let encoded = encode(&frame).unwrap();
        let decoded = decode_frame(&encoded[..encoded.len() - 1]).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_zero_length_payload() {
        let frame = decode_frame(b"t1000").unwrap();
        assert_eq!(frame.id(), 0x100);
        assert!(frame.is_empty());
        assert_eq!(frame.data(), &[0u8; 8]);
    }

    #[rstest]
    #[case::too_short(b"t10".as_slice())]
    #[case::wrong_prefix(b"T1230".as_slice())]
    #[case::bad_id_digit(b"t1G30".as_slice())]
    #[case::length_over_eight(b"t1239".as_slice())]
    #[case::missing_data(b"t1232AA".as_slice())]
    #[case::bad_data_digit(b"t1231ZZ".as_slice())]
    fn test_decode_rejects(#[case] line: &[u8]) {
        assert_eq!(decode_frame(line), None);
    }

    #[test]
    fn test_decoder_handles_split_reads() {
        let mut decoder = SlcanDecoder::new();
        assert!(decoder.feed(b"t12").is_empty());
        assert_eq!(decoder.buffered(), 3);

        let frames = decoder.feed(b"31AB\rt4560\r");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], Frame::new(0x123, &[0xAB]).unwrap());
        assert_eq!(frames[1].id(), 0x456);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_decoder_skips_malformed_lines() {
        let mut decoder = SlcanDecoder::new();
        let frames = decoder.feed(b"z\r\nV1013\rtXYZ0\rt1001FF\r");
        assert_eq!(frames, vec![Frame::new(0x100, &[0xFF]).unwrap()]);
    }

    #[test]
    fn test_decoder_bell_discards_partial_line() {
        let mut decoder = SlcanDecoder::new();
        decoder.feed(b"t1231");
        let frames = decoder.feed(&[BELL, b't', b'2', b'0', b'0', b'0', b'\r']);
        assert_eq!(frames, vec![Frame::new(0x200, &[]).unwrap()]);
    }

    #[test]
    fn test_decoder_discards_rest_of_overlong_line() {
        let mut decoder = SlcanDecoder::new();
        let mut noise = vec![b'x'; MAX_LINE_LEN + 6];
        noise.extend_from_slice(b"t1001FF\r");

        assert!(decoder.feed(&noise).is_empty());
        assert_eq!(decoder.buffered(), 0);
        assert_eq!(
            decoder.feed(b"t2000\r"),
            vec![Frame::new(0x200, &[]).unwrap()]
        );
    }

    #[rstest]
    #[case(CanBitRate::Kbps125, b"S4\r".as_slice())]
    #[case(CanBitRate::Kbps250, b"S5\r".as_slice())]
    #[case(CanBitRate::Kbps500, b"S6\r".as_slice())]
    #[case(CanBitRate::Kbps1000, b"S8\r".as_slice())]
    fn test_bitrate_command(#[case] bitrate: CanBitRate, #[case] command: &[u8]) {
        assert_eq!(bitrate_command(bitrate), command);
    }
}
