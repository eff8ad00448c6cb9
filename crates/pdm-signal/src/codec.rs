//! Bit-level extraction and insertion
//!
//! Little-endian signals start at their LSB and walk forward through the
//! buffer. Big-endian (Motorola) signals start at their MSB, walk down to bit 0
//! of that byte, then continue at bit 7 of the next byte. The two layouts are
//! not interchangeable for any span that crosses a byte boundary.

use crate::error::{SignalError, SignalResult};
use crate::types::{ByteOrder, Signal};

/// Size of a classic CAN payload
pub const FRAME_BYTES: usize = 8;

fn validate(start_bit: u8, length: u8, byte_order: ByteOrder) -> SignalResult<()> {
    if length == 0 || length > 64 {
        return Err(SignalError::InvalidSignalLength { length });
    }
    if start_bit > 63 {
        return Err(SignalError::SignalOutOfBounds { start_bit, length });
    }

    let available = match byte_order {
        ByteOrder::Little => 64 - u16::from(start_bit),
        ByteOrder::Big => {
            let byte = u16::from(start_bit / 8);
            let bit = u16::from(start_bit % 8);
            (bit + 1) + 8 * (7 - byte)
        }
    };
    if u16::from(length) > available {
        return Err(SignalError::SignalOutOfBounds { start_bit, length });
    }

    Ok(())
}

fn width_mask(length: u8) -> u64 {
    if length >= 64 {
        u64::MAX
    } else {
        (1u64 << length) - 1
    }
}

fn chunk_mask(bits: u8) -> u8 {
    ((1u16 << bits) - 1) as u8
}

fn sign_extend(raw: u64, length: u8) -> i64 {
    if length >= 64 {
        return raw as i64;
    }
    if raw & (1u64 << (length - 1)) != 0 {
        (i128::from(raw) - (1i128 << length)) as i64
    } else {
        raw as i64
    }
}

/// Read the raw unsigned bits of a signal
pub fn extract_raw(
    data: &[u8; FRAME_BYTES],
    start_bit: u8,
    length: u8,
    byte_order: ByteOrder,
) -> SignalResult<u64> {
    validate(start_bit, length, byte_order)?;

    let mut value = 0u64;
    let mut remaining = length;
    let mut byte = usize::from(start_bit / 8);

    match byte_order {
        ByteOrder::Little => {
            let mut bit = start_bit % 8;
            let mut dest = 0u8;
            while remaining > 0 {
                let take = (8 - bit).min(remaining);
                let bits = (data[byte] >> bit) & chunk_mask(take);
                value |= u64::from(bits) << dest;
                dest += take;
                remaining -= take;
                byte += 1;
                bit = 0;
            }
        }
        ByteOrder::Big => {
            let mut top = start_bit % 8;
            while remaining > 0 {
                let available = top + 1;
                let take = available.min(remaining);
                let low = available - take;
                let bits = (data[byte] >> low) & chunk_mask(take);
                remaining -= take;
                value |= u64::from(bits) << remaining;
                byte += 1;
                top = 7;
            }
        }
    }

    Ok(value)
}

/// Write raw bits into a signal, leaving all other bits untouched
///
/// `raw` is masked to the signal width.
pub fn insert_raw(
    data: &mut [u8; FRAME_BYTES],
    raw: u64,
    start_bit: u8,
    length: u8,
    byte_order: ByteOrder,
) -> SignalResult<()> {
    validate(start_bit, length, byte_order)?;

    let raw = raw & width_mask(length);
    let mut remaining = length;
    let mut byte = usize::from(start_bit / 8);

    match byte_order {
        ByteOrder::Little => {
            let mut bit = start_bit % 8;
            let mut src = 0u8;
            while remaining > 0 {
                let take = (8 - bit).min(remaining);
                let mask = chunk_mask(take) << bit;
                let chunk = ((raw >> src) as u8) & chunk_mask(take);
                data[byte] = (data[byte] & !mask) | (chunk << bit);
                src += take;
                remaining -= take;
                byte += 1;
                bit = 0;
            }
        }
        ByteOrder::Big => {
            let mut top = start_bit % 8;
            while remaining > 0 {
                let available = top + 1;
                let take = available.min(remaining);
                let low = available - take;
                remaining -= take;
                let mask = chunk_mask(take) << low;
                let chunk = ((raw >> remaining) as u8) & chunk_mask(take);
                data[byte] = (data[byte] & !mask) | (chunk << low);
                byte += 1;
                top = 7;
            }
        }
    }

    Ok(())
}

/// Decode a signal to its physical value
pub fn extract(data: &[u8; FRAME_BYTES], signal: &Signal) -> SignalResult<f64> {
    let raw = extract_raw(data, signal.start_bit, signal.length, signal.byte_order)?;
    let value = if signal.signed {
        sign_extend(raw, signal.length) as f64
    } else {
        raw as f64
    };
    Ok(value * signal.factor + signal.offset)
}

/// Encode a physical value into a signal
///
/// The value is converted with `round((value - offset) / factor)`; precision
/// below the signal's resolution is lost.
pub fn insert(data: &mut [u8; FRAME_BYTES], value: f64, signal: &Signal) -> SignalResult<()> {
    validate(signal.start_bit, signal.length, signal.byte_order)?;

    let scaled = ((value - signal.offset) / signal.factor).round();
    let (min, max) = signal.raw_range();
    if !scaled.is_finite() || scaled < min || scaled >= signal.raw_limit() {
        return Err(SignalError::ValueOutOfRange {
            value: scaled,
            min,
            max,
        });
    }

    let raw = if scaled < 0.0 {
        (scaled as i64) as u64
    } else {
        scaled as u64
    };
    insert_raw(data, raw, signal.start_bit, signal.length, signal.byte_order)
}

/// Read an unsigned integer field (factor 1, offset 0)
pub fn extract_uint(
    data: &[u8; FRAME_BYTES],
    start_bit: u8,
    length: u8,
    byte_order: ByteOrder,
) -> SignalResult<u64> {
    extract_raw(data, start_bit, length, byte_order)
}

/// Write an unsigned integer field (factor 1, offset 0)
pub fn insert_uint(
    data: &mut [u8; FRAME_BYTES],
    value: u64,
    start_bit: u8,
    length: u8,
    byte_order: ByteOrder,
) -> SignalResult<()> {
    validate(start_bit, length, byte_order)?;
    let max = width_mask(length);
    if value > max {
        return Err(SignalError::ValueOutOfRange {
            value: value as f64,
            min: 0.0,
            max: max as f64,
        });
    }
    insert_raw(data, value, start_bit, length, byte_order)
}

/// Read a two's-complement integer field
pub fn extract_int(
    data: &[u8; FRAME_BYTES],
    start_bit: u8,
    length: u8,
    byte_order: ByteOrder,
) -> SignalResult<i64> {
    let raw = extract_raw(data, start_bit, length, byte_order)?;
    Ok(sign_extend(raw, length))
}

/// Write a two's-complement integer field
pub fn insert_int(
    data: &mut [u8; FRAME_BYTES],
    value: i64,
    start_bit: u8,
    length: u8,
    byte_order: ByteOrder,
) -> SignalResult<()> {
    validate(start_bit, length, byte_order)?;
    if length < 64 {
        let half = 1i128 << (length - 1);
        let wide = i128::from(value);
        if wide < -half || wide > half - 1 {
            return Err(SignalError::ValueOutOfRange {
                value: value as f64,
                min: -(half as f64),
                max: (half - 1) as f64,
            });
        }
    }
    insert_raw(data, value as u64, start_bit, length, byte_order)
}

/// Read a single-bit flag
pub fn extract_bool(data: &[u8; FRAME_BYTES], bit: u8) -> SignalResult<bool> {
    Ok(extract_raw(data, bit, 1, ByteOrder::Little)? != 0)
}

/// Write a single-bit flag
pub fn insert_bool(data: &mut [u8; FRAME_BYTES], bit: u8, value: bool) -> SignalResult<()> {
    insert_raw(data, u64::from(value), bit, 1, ByteOrder::Little)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(0, 1, ByteOrder::Little, 1)]
    #[case(3, 5, ByteOrder::Little, 0x15)]
    #[case(4, 12, ByteOrder::Little, 0xABC)]
    #[case(12, 20, ByteOrder::Little, 0xF_1234)]
    #[case(0, 64, ByteOrder::Little, 0xDEAD_BEEF_CAFE_F00D)]
    #[case(7, 8, ByteOrder::Big, 0xA5)]
    #[case(4, 12, ByteOrder::Big, 0xABC)]
    #[case(31, 16, ByteOrder::Big, 0x1234)]
    #[case(7, 64, ByteOrder::Big, 0x0123_4567_89AB_CDEF)]
    #[case(58, 3, ByteOrder::Big, 0x5)]
    fn test_uint_round_trip(
        #[case] start_bit: u8,
        #[case] length: u8,
        #[case] order: ByteOrder,
        #[case] value: u64,
    ) {
        let mut data = [0u8; 8];
        insert_uint(&mut data, value, start_bit, length, order).unwrap();
        assert_eq!(extract_uint(&data, start_bit, length, order).unwrap(), value);
    }

    #[rstest]
    #[case(0, 4, -1)]
    #[case(0, 4, -8)]
    #[case(0, 4, 7)]
    #[case(8, 16, -12345)]
    #[case(5, 11, -1024)]
    #[case(0, 64, i64::MIN)]
    fn test_int_round_trip(#[case] start_bit: u8, #[case] length: u8, #[case] value: i64) {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let start = match order {
                // keep the big-endian span inside the buffer
                ByteOrder::Big if length == 64 => 7,
                ByteOrder::Big => start_bit | 7,
                ByteOrder::Little => start_bit,
            };
            let mut data = [0u8; 8];
            insert_int(&mut data, value, start, length, order).unwrap();
            assert_eq!(extract_int(&data, start, length, order).unwrap(), value);
        }
    }

    #[test]
    fn test_signed_minus_one_in_four_bits() {
        let signal = Signal::new(0, 4).signed();
        let mut data = [0u8; 8];
        insert(&mut data, -1.0, &signal).unwrap();
        assert_eq!(data[0], 0x0F);
        assert_eq!(extract(&data, &signal).unwrap(), -1.0);
        assert_eq!(extract(&data, &Signal::new(0, 4)).unwrap(), 15.0);
    }

    #[test]
    fn test_byte_orders_are_not_interchangeable() {
        let mut little = [0u8; 8];
        let mut big = [0u8; 8];
        insert_uint(&mut little, 0xABC, 4, 12, ByteOrder::Little).unwrap();
        insert_uint(&mut big, 0xABC, 4, 12, ByteOrder::Big).unwrap();

        assert_eq!(little, [0xC0, 0xAB, 0, 0, 0, 0, 0, 0]);
        assert_eq!(big, [0x15, 0x78, 0, 0, 0, 0, 0, 0]);
        assert_ne!(little, big);

        assert_ne!(extract_uint(&little, 4, 12, ByteOrder::Big).unwrap(), 0xABC);
    }

    #[test]
    fn test_big_endian_word() {
        let data = [0, 0, 0, 0x12, 0x34, 0, 0, 0];
        assert_eq!(extract_uint(&data, 31, 16, ByteOrder::Big).unwrap(), 0x1234);
        assert_eq!(extract_uint(&data, 24, 16, ByteOrder::Little).unwrap(), 0x3412);
    }

    #[test]
    fn test_insert_preserves_untouched_bits() {
        let mut data = [0xFFu8; 8];
        insert_uint(&mut data, 0, 0, 3, ByteOrder::Little).unwrap();
        assert_eq!(data[0], 0b1111_1000);
        assert!(data[1..].iter().all(|&b| b == 0xFF));

        let mut data = [0xFFu8; 8];
        insert_uint(&mut data, 0, 4, 12, ByteOrder::Big).unwrap();
        assert_eq!(data[0], 0xE0);
        assert_eq!(data[1], 0x01);
    }

    #[test]
    fn test_scaled_values() {
        let current = Signal::new(16, 16).scaled(0.1, 0.0);
        let mut data = [0u8; 8];
        insert(&mut data, 12.3, &current).unwrap();
        assert_eq!(extract_uint(&data, 16, 16, ByteOrder::Little).unwrap(), 123);
        assert!((extract(&data, &current).unwrap() - 12.3).abs() < 1e-9);

        let temp = Signal::new(0, 8).scaled(1.0, -40.0);
        let mut data = [0u8; 8];
        insert(&mut data, 92.0, &temp).unwrap();
        assert_eq!(data[0], 132);
        assert_eq!(extract(&data, &temp).unwrap(), 92.0);
    }

    #[test]
    fn test_rounding_loses_precision() {
        let signal = Signal::new(0, 8).scaled(10.0, 0.0);
        let mut data = [0u8; 8];
        insert(&mut data, 47.0, &signal).unwrap();
        assert_eq!(data[0], 5);
        assert_eq!(extract(&data, &signal).unwrap(), 50.0);
    }

    #[rstest]
    #[case(0)]
    #[case(65)]
    fn test_invalid_length(#[case] length: u8) {
        let mut data = [0u8; 8];
        assert_eq!(
            extract_raw(&data, 0, length, ByteOrder::Little),
            Err(SignalError::InvalidSignalLength { length })
        );
        assert_eq!(
            insert_raw(&mut data, 0, 0, length, ByteOrder::Little),
            Err(SignalError::InvalidSignalLength { length })
        );
    }

    #[test]
    fn test_out_of_bounds() {
        let data = [0u8; 8];
        assert!(matches!(
            extract_raw(&data, 60, 8, ByteOrder::Little),
            Err(SignalError::SignalOutOfBounds { .. })
        ));
        assert!(matches!(
            extract_raw(&data, 56, 9, ByteOrder::Big),
            Err(SignalError::SignalOutOfBounds { .. })
        ));
        assert!(extract_raw(&data, 7, 64, ByteOrder::Big).is_ok());
        assert!(matches!(
            extract_raw(&data, 63, 9, ByteOrder::Big),
            Err(SignalError::SignalOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_value_out_of_range() {
        let mut data = [0u8; 8];
        assert!(matches!(
            insert_uint(&mut data, 16, 0, 4, ByteOrder::Little),
            Err(SignalError::ValueOutOfRange { .. })
        ));
        assert!(matches!(
            insert(&mut data, -1.0, &Signal::new(0, 4)),
            Err(SignalError::ValueOutOfRange { .. })
        ));
        assert!(matches!(
            insert(&mut data, f64::NAN, &Signal::new(0, 4)),
            Err(SignalError::ValueOutOfRange { .. })
        ));
        assert!(matches!(
            insert_int(&mut data, 8, 0, 4, ByteOrder::Little),
            Err(SignalError::ValueOutOfRange { .. })
        ));
        assert_eq!(data, [0u8; 8]);
    }

    #[rstest]
    #[case(Signal::new(0, 64), 18_446_744_073_709_551_616.0)]
    #[case(Signal::new(0, 64), -1.0)]
    #[case(Signal::new(0, 64).signed(), 9_223_372_036_854_775_808.0)]
    #[case(Signal::new(0, 64).signed(), -9_223_372_036_854_777_856.0)]
    #[case(Signal::new(7, 64).big_endian(), 18_446_744_073_709_551_616.0)]
    fn test_full_width_value_out_of_range(#[case] signal: Signal, #[case] value: f64) {
        let mut data = [0u8; 8];
        assert!(matches!(
            insert(&mut data, value, &signal),
            Err(SignalError::ValueOutOfRange { .. })
        ));
        assert_eq!(data, [0u8; 8]);
    }

    #[test]
    fn test_full_width_boundaries() {
        let mut data = [0u8; 8];

        // largest f64 below 2^64
        let top = 18_446_744_073_709_549_568.0;
        insert(&mut data, top, &Signal::new(0, 64)).unwrap();
        assert_eq!(
            extract_uint(&data, 0, 64, ByteOrder::Little).unwrap(),
            18_446_744_073_709_549_568
        );

        let signed = Signal::new(0, 64).signed();
        insert(&mut data, -9_223_372_036_854_775_808.0, &signed).unwrap();
        assert_eq!(extract_int(&data, 0, 64, ByteOrder::Little).unwrap(), i64::MIN);

        // largest f64 below 2^63
        insert(&mut data, 9_223_372_036_854_774_784.0, &signed).unwrap();
        assert_eq!(
            extract_int(&data, 0, 64, ByteOrder::Little).unwrap(),
            9_223_372_036_854_774_784
        );
    }

    #[test]
    fn test_bool_helpers() {
        let mut data = [0u8; 8];
        insert_bool(&mut data, 9, true).unwrap();
        assert_eq!(data[1], 0x02);
        assert!(extract_bool(&data, 9).unwrap());
        assert!(!extract_bool(&data, 8).unwrap());
        insert_bool(&mut data, 9, false).unwrap();
        assert_eq!(data, [0u8; 8]);
    }
}
