//! Payload encoders and their exact inverses.
//!
//! | Tag        | Byte layout                                              |
//! |------------|----------------------------------------------------------|
//! | `ndarray`  | Little-endian element bytes, no dtype/shape header       |
//! | `protobuf` | Canonical message bytes, untouched                       |
//! | `float`    | ASCII C99 hex-float text, e.g. `0x1.91eb851eb851fp+1`    |
//! | `int`      | 8-byte little-endian two's complement                    |
//! | `str`      | UTF-8                                                    |
//! | `bytes`    | Untouched                                                |
//!
//! Floats go through hex text rather than decimal so that every finite value
//! survives bit-for-bit.  Arrays carry no header: a reader has to know the
//! dtype and shape to rebuild one.

use crate::{CodecError, RecordValue, TypeTag};

/// Width of an encoded `int` payload.
pub const INT_WIDTH: usize = 8;

const MANTISSA_BITS: u32 = 52;
const MANTISSA_MASK: u64 = (1 << MANTISSA_BITS) - 1;
const EXPONENT_BIAS: i32 = 1023;

// ─────────────────────────────────────────────────────────────────────────────
// Encoding
// ─────────────────────────────────────────────────────────────────────────────

/// Turn a [`RecordValue`] into its `(tag, payload)` pair.
///
/// Fails with [`CodecError::UnsupportedPayloadType`] when an array's byte
/// length disagrees with its dtype and shape.
pub fn encode(value: RecordValue) -> Result<(TypeTag, Vec<u8>), CodecError> {
    let tag = value.type_tag();
    let payload = match value {
        RecordValue::Float(v) => format_hex_float(v).into_bytes(),
        RecordValue::Int(v) => v.to_le_bytes().to_vec(),
        RecordValue::Text(s) => s.into_bytes(),
        RecordValue::Bytes(b) | RecordValue::Serialized(b) => b,
        RecordValue::RawArray { bytes, dtype, shape } => {
            let expected = shape
                .iter()
                .try_fold(dtype.item_size(), |acc, dim| acc.checked_mul(*dim))
                .ok_or_else(|| {
                    CodecError::UnsupportedPayloadType(format!("array shape {shape:?} overflows"))
                })?;
            if expected != bytes.len() {
                return Err(CodecError::UnsupportedPayloadType(format!(
                    "{dtype:?} array of shape {shape:?} needs {expected} bytes, got {}",
                    bytes.len()
                )));
            }
            bytes
        }
    };
    Ok((tag, payload))
}

/// Format `value` the way C99 `%a` / Python `float.hex()` do.
///
/// Normal numbers always carry 13 mantissa digits (`0x1.0000000000000p+0`),
/// subnormals use a `0x0.` lead with exponent `-1022`, zero is `0x0.0p+0`.
pub fn format_hex_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let bits = value.to_bits();
    let sign = if bits >> 63 == 1 { "-" } else { "" };
    let biased = ((bits >> MANTISSA_BITS) & 0x7ff) as i32;
    let mantissa = bits & MANTISSA_MASK;
    if biased == 0 && mantissa == 0 {
        return format!("{sign}0x0.0p+0");
    }
    let (lead, exponent) = if biased == 0 {
        (0, 1 - EXPONENT_BIAS)
    } else {
        (1, biased - EXPONENT_BIAS)
    };
    let exp_sign = if exponent >= 0 { '+' } else { '-' };
    format!(
        "{sign}0x{lead}.{mantissa:013x}p{exp_sign}{}",
        exponent.unsigned_abs()
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoding
// ─────────────────────────────────────────────────────────────────────────────

fn malformed(tag: TypeTag, reason: impl Into<String>) -> CodecError {
    CodecError::Malformed {
        tag,
        reason: reason.into(),
    }
}

/// Inverse of the `float` encoder.
pub fn decode_float(payload: &[u8]) -> Result<f64, CodecError> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| malformed(TypeTag::Float, e.to_string()))?;
    parse_hex_float(text)
        .ok_or_else(|| malformed(TypeTag::Float, format!("not a hex float: {text:?}")))
}

/// Inverse of the `int` encoder.
pub fn decode_int(payload: &[u8]) -> Result<i64, CodecError> {
    let bytes: [u8; INT_WIDTH] = payload.try_into().map_err(|_| {
        malformed(
            TypeTag::Int,
            format!("expected {INT_WIDTH} bytes, got {}", payload.len()),
        )
    })?;
    Ok(i64::from_le_bytes(bytes))
}

/// Inverse of the `str` encoder.
pub fn decode_text(payload: &[u8]) -> Result<&str, CodecError> {
    std::str::from_utf8(payload).map_err(|e| malformed(TypeTag::Str, e.to_string()))
}

/// Reinterpret headerless `ndarray` bytes as `f64` elements.
pub fn decode_f64_array(payload: &[u8]) -> Result<Vec<f64>, CodecError> {
    if payload.len() % 8 != 0 {
        return Err(malformed(
            TypeTag::NdArray,
            format!("{} bytes is not a whole number of f64 elements", payload.len()),
        ));
    }
    Ok(payload
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect())
}

/// Reinterpret headerless `ndarray` bytes as `f32` elements.
pub fn decode_f32_array(payload: &[u8]) -> Result<Vec<f32>, CodecError> {
    if payload.len() % 4 != 0 {
        return Err(malformed(
            TypeTag::NdArray,
            format!("{} bytes is not a whole number of f32 elements", payload.len()),
        ));
    }
    Ok(payload
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Parse C99 hex-float text (`[-]0xH.HHHp[+-]E`, `inf`, `nan`).
///
/// Returns `None` on anything else.  Inputs with at most 53 significant bits
/// (everything [`format_hex_float`] emits) are reproduced exactly.
pub fn parse_hex_float(text: &str) -> Option<f64> {
    let text = text.trim();
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let lower = body.to_ascii_lowercase();
    let magnitude = match lower.as_str() {
        "inf" | "infinity" => f64::INFINITY,
        "nan" => f64::NAN,
        _ => parse_hex_magnitude(&lower)?,
    };
    Some(if negative { -magnitude } else { magnitude })
}

fn parse_hex_magnitude(body: &str) -> Option<f64> {
    let body = body.strip_prefix("0x").unwrap_or(body);
    let (digits, exponent) = match body.split_once('p') {
        Some((digits, exp)) => (digits, exp.parse::<i32>().ok()?),
        None => (body, 0),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }

    // Accumulate up to 60 significant bits; digits beyond that only shift.
    let mut mantissa: u64 = 0;
    let mut scale = exponent;
    for c in int_part.chars() {
        let digit = u64::from(c.to_digit(16)?);
        if mantissa >> 56 == 0 {
            mantissa = (mantissa << 4) | digit;
        } else {
            scale = scale.checked_add(4)?;
        }
    }
    for c in frac_part.chars() {
        let digit = u64::from(c.to_digit(16)?);
        if mantissa >> 56 == 0 {
            mantissa = (mantissa << 4) | digit;
            scale = scale.checked_sub(4)?;
        }
    }
    Some(scale_by_power_of_two(mantissa as f64, scale))
}

/// `value * 2^exponent`, stepping so no intermediate power leaves range.
fn scale_by_power_of_two(mut value: f64, mut exponent: i32) -> f64 {
    let two_pow_max = f64::from_bits(0x7fe0_0000_0000_0000); // 2^1023
    let two_pow_min = f64::from_bits(0x0010_0000_0000_0000); // 2^-1022
    while exponent > EXPONENT_BIAS {
        value *= two_pow_max;
        exponent -= EXPONENT_BIAS;
        if value.is_infinite() {
            return value;
        }
    }
    while exponent < 1 - EXPONENT_BIAS {
        value *= two_pow_min;
        exponent += EXPONENT_BIAS - 1;
        if value == 0.0 {
            return value;
        }
    }
    value * f64::from_bits(((exponent + EXPONENT_BIAS) as u64) << MANTISSA_BITS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DType;

    #[test]
    fn hex_float_matches_reference_spelling() {
        assert_eq!(format_hex_float(1.1), "0x1.199999999999ap+0");
        assert_eq!(format_hex_float(1.0), "0x1.0000000000000p+0");
        assert_eq!(format_hex_float(0.1), "0x1.999999999999ap-4");
        assert_eq!(format_hex_float(-2.5), "-0x1.4000000000000p+1");
        assert_eq!(format_hex_float(0.0), "0x0.0p+0");
        assert_eq!(format_hex_float(-0.0), "-0x0.0p+0");
        assert_eq!(format_hex_float(5e-324), "0x0.0000000000001p-1022");
        assert_eq!(format_hex_float(1e300), "0x1.7e43c8800759cp+996");
        assert_eq!(format_hex_float(f64::INFINITY), "inf");
        assert_eq!(format_hex_float(f64::NEG_INFINITY), "-inf");
        assert_eq!(format_hex_float(f64::NAN), "nan");
    }

    #[test]
    fn float_payload_is_bit_exact() {
        let samples = [
            0.0,
            -0.0,
            1.0,
            1.1,
            -1.0 / 3.0,
            f64::MIN_POSITIVE,
            5e-324,
            2.225_073_858_507_201e-308,
            f64::MAX,
            f64::MIN,
            f64::EPSILON,
            123_456_789.987_654_3,
            f64::INFINITY,
            f64::NEG_INFINITY,
        ];
        for v in samples {
            let (tag, payload) = encode(RecordValue::Float(v)).unwrap();
            assert_eq!(tag, TypeTag::Float);
            let back = decode_float(&payload).unwrap();
            assert_eq!(back.to_bits(), v.to_bits(), "value {v:e} did not survive");
        }
    }

    #[test]
    fn nan_survives_as_nan() {
        let (_, payload) = encode(RecordValue::Float(f64::NAN)).unwrap();
        assert!(decode_float(&payload).unwrap().is_nan());
    }

    #[test]
    fn parses_short_hand_hex_floats() {
        assert_eq!(parse_hex_float("0x1.8p1"), Some(3.0));
        assert_eq!(parse_hex_float("0x10p-4"), Some(1.0));
        assert_eq!(parse_hex_float("-0x.8p0"), Some(-0.5));
        assert_eq!(parse_hex_float("Infinity"), Some(f64::INFINITY));
        assert_eq!(parse_hex_float("0x1p+1024"), Some(f64::INFINITY));
        assert_eq!(parse_hex_float("0x1p-1080"), Some(0.0));
    }

    #[test]
    fn rejects_garbage_floats() {
        assert_eq!(parse_hex_float(""), None);
        assert_eq!(parse_hex_float("0x"), None);
        assert_eq!(parse_hex_float("0x1.zp0"), None);
        assert_eq!(parse_hex_float("0x1p"), None);
        assert!(matches!(
            decode_float(b"3.14"),
            Err(CodecError::Malformed { tag: TypeTag::Float, .. })
        ));
    }

    #[test]
    fn int_payload_is_eight_little_endian_bytes() {
        let (tag, payload) = encode(RecordValue::Int(-2)).unwrap();
        assert_eq!(tag, TypeTag::Int);
        assert_eq!(payload, vec![0xfe, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
        for v in [0, 1, -1, 123, i64::MAX, i64::MIN] {
            let (_, payload) = encode(RecordValue::Int(v)).unwrap();
            assert_eq!(decode_int(&payload).unwrap(), v);
        }
    }

    #[test]
    fn short_int_payload_is_malformed() {
        assert!(matches!(
            decode_int(&[1, 2, 3]),
            Err(CodecError::Malformed { tag: TypeTag::Int, .. })
        ));
    }

    #[test]
    fn text_and_bytes_pass_through() {
        let (tag, payload) = encode(RecordValue::from("héllo")).unwrap();
        assert_eq!(tag, TypeTag::Str);
        assert_eq!(decode_text(&payload).unwrap(), "héllo");

        let raw = vec![0u8, 255, 10, 13];
        let (tag, payload) = encode(RecordValue::Bytes(raw.clone())).unwrap();
        assert_eq!(tag, TypeTag::Bytes);
        assert_eq!(payload, raw);

        assert!(decode_text(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn serialized_message_is_untouched() {
        let (tag, payload) = encode(RecordValue::Serialized(vec![0x0a, 0x02, 0x68, 0x69])).unwrap();
        assert_eq!(tag, TypeTag::Protobuf);
        assert_eq!(payload, vec![0x0a, 0x02, 0x68, 0x69]);
    }

    #[test]
    fn array_payload_is_headerless() {
        let values = [1.5f64, -2.0, 0.25, 8.0];
        let (tag, payload) = encode(RecordValue::f64_array(&values, vec![2, 2])).unwrap();
        assert_eq!(tag, TypeTag::NdArray);
        assert_eq!(payload.len(), 32);
        assert_eq!(decode_f64_array(&payload).unwrap(), values);

        let (_, payload) = encode(RecordValue::f32_array(&[0.5, 1.0], vec![2])).unwrap();
        assert_eq!(decode_f32_array(&payload).unwrap(), vec![0.5f32, 1.0]);
    }

    #[test]
    fn array_with_wrong_length_is_rejected() {
        let value = RecordValue::RawArray {
            bytes: vec![0; 7],
            dtype: DType::F32,
            shape: vec![2],
        };
        assert!(matches!(encode(value), Err(CodecError::UnsupportedPayloadType(_))));
        assert!(decode_f32_array(&[0; 6]).is_err());
    }

    #[test]
    fn scalar_array_has_one_element() {
        let value = RecordValue::RawArray {
            bytes: 7u16.to_le_bytes().to_vec(),
            dtype: DType::U16,
            shape: vec![],
        };
        assert_eq!(encode(value).unwrap().1, vec![7, 0]);
    }
}
