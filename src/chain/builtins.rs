//! Built-in ABI types: integers, timestamps, assets, keys.

use chrono::{DateTime, NaiveDateTime};
use ripemd::{Digest, Ripemd160};
use serde_json::Value;

use crate::chain::abi::AbiError;
use crate::chain::name::Name;
use crate::chain::serializer::{ByteReader, ByteWriter};
use crate::chain::types::TimePointSec;

/// Milliseconds between the unix epoch and the block timestamp epoch (2000-01-01).
const BLOCK_TIMESTAMP_EPOCH_MS: i64 = 946_684_800_000;
const BLOCK_INTERVAL_MS: i64 = 500;

const KEY_LEN: usize = 33;
const SIGNATURE_LEN: usize = 65;

pub const BUILTIN_TYPES: &[&str] = &[
    "bool",
    "int8",
    "uint8",
    "int16",
    "uint16",
    "int32",
    "uint32",
    "int64",
    "uint64",
    "int128",
    "uint128",
    "varint32",
    "varuint32",
    "float32",
    "float64",
    "time_point",
    "time_point_sec",
    "block_timestamp_type",
    "name",
    "bytes",
    "string",
    "checksum160",
    "checksum256",
    "checksum512",
    "symbol",
    "symbol_code",
    "asset",
    "extended_asset",
    "public_key",
    "signature",
];

pub fn is_builtin(ty: &str) -> bool {
    BUILTIN_TYPES.contains(&ty)
}

fn mismatch(ty: &str, value: &Value) -> AbiError {
    AbiError::TypeMismatch {
        ty: ty.to_string(),
        detail: format!("cannot encode {} as {}", value, ty),
    }
}

fn invalid(ty: &str, detail: impl Into<String>) -> AbiError {
    AbiError::TypeMismatch {
        ty: ty.to_string(),
        detail: detail.into(),
    }
}

fn as_i128(ty: &str, value: &Value) -> Result<i128, AbiError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .ok_or_else(|| mismatch(ty, value)),
        Value::String(s) => s.trim().parse::<i128>().map_err(|_| mismatch(ty, value)),
        _ => Err(mismatch(ty, value)),
    }
}

fn as_int<T: TryFrom<i128>>(ty: &str, value: &Value) -> Result<T, AbiError> {
    let wide = as_i128(ty, value)?;
    T::try_from(wide).map_err(|_| invalid(ty, format!("{} is out of range", wide)))
}

fn as_str<'v>(ty: &str, value: &'v Value) -> Result<&'v str, AbiError> {
    value.as_str().ok_or_else(|| mismatch(ty, value))
}

fn as_f64(ty: &str, value: &Value) -> Result<f64, AbiError> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| mismatch(ty, value)),
        Value::String(s) => s.trim().parse().map_err(|_| mismatch(ty, value)),
        _ => Err(mismatch(ty, value)),
    }
}

fn fixed_hex(ty: &str, value: &Value, len: usize) -> Result<Vec<u8>, AbiError> {
    let bytes = hex::decode(as_str(ty, value)?).map_err(|e| invalid(ty, e.to_string()))?;
    if bytes.len() != len {
        return Err(invalid(ty, format!("expected {} bytes, got {}", len, bytes.len())));
    }
    Ok(bytes)
}

fn parse_micros(ty: &str, text: &str) -> Result<i64, AbiError> {
    NaiveDateTime::parse_from_str(text.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S%.f")
        .map(|dt| dt.and_utc().timestamp_micros())
        .map_err(|e| invalid(ty, format!("'{}': {}", text, e)))
}

fn format_micros(ty: &str, micros: i64) -> Result<String, AbiError> {
    DateTime::from_timestamp_micros(micros)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string())
        .ok_or_else(|| invalid(ty, format!("{} is out of range", micros)))
}

/// Parse `"4,EOS"` into precision and code.
fn parse_symbol(text: &str) -> Result<(u8, String), AbiError> {
    let (precision, code) = text
        .split_once(',')
        .ok_or_else(|| invalid("symbol", format!("'{}' is not <precision>,<code>", text)))?;
    let precision: u8 = precision
        .trim()
        .parse()
        .map_err(|_| invalid("symbol", format!("bad precision in '{}'", text)))?;
    if precision > 18 {
        return Err(invalid("symbol", "precision must be at most 18"));
    }
    Ok((precision, code.trim().to_string()))
}

fn symbol_code_value(code: &str) -> Result<u64, AbiError> {
    if code.is_empty() || code.len() > 7 || !code.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(invalid("symbol_code", format!("'{}' is not a valid symbol code", code)));
    }
    let mut raw = [0u8; 8];
    raw[..code.len()].copy_from_slice(code.as_bytes());
    Ok(u64::from_le_bytes(raw))
}

fn symbol_code_text(value: u64) -> String {
    value
        .to_le_bytes()
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| b as char)
        .collect()
}

fn write_symbol(w: &mut ByteWriter, precision: u8, code: &str) -> Result<(), AbiError> {
    let code = symbol_code_value(code)?;
    w.write_u64((code << 8) | precision as u64);
    Ok(())
}

fn read_symbol(r: &mut ByteReader<'_>) -> Result<(u8, String), AbiError> {
    let raw = r.read_u64()?;
    Ok(((raw & 0xff) as u8, symbol_code_text(raw >> 8)))
}

/// Parse `"1.0000 EOS"` into amount, precision and code.
fn parse_asset(text: &str) -> Result<(i64, u8, String), AbiError> {
    let (amount, code) = text
        .trim()
        .split_once(' ')
        .ok_or_else(|| invalid("asset", format!("'{}' is not <amount> <code>", text)))?;
    let (negative, digits) = match amount.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, amount),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() || !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(invalid("asset", format!("bad amount in '{}'", text)));
    }
    let precision = u8::try_from(fraction.len())
        .ok()
        .filter(|p| *p <= 18)
        .ok_or_else(|| invalid("asset", "precision must be at most 18"))?;
    let mut units: i64 = format!("{}{}", whole, fraction)
        .parse()
        .map_err(|_| invalid("asset", format!("amount in '{}' is out of range", text)))?;
    if negative {
        units = -units;
    }
    Ok((units, precision, code.trim().to_string()))
}

fn format_asset(amount: i64, precision: u8, code: &str) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let digits = amount.unsigned_abs().to_string();
    let precision = precision as usize;
    if precision == 0 {
        return format!("{}{} {}", sign, digits, code);
    }
    let padded = format!("{:0>width$}", digits, width = precision + 1);
    let (whole, fraction) = padded.split_at(padded.len() - precision);
    format!("{}{}.{} {}", sign, whole, fraction, code)
}

fn checksum(data: &[u8], suffix: &str) -> [u8; 4] {
    let mut hasher = Ripemd160::new();
    hasher.update(data);
    hasher.update(suffix.as_bytes());
    let digest = hasher.finalize();
    [digest[0], digest[1], digest[2], digest[3]]
}

/// Decode a base58 payload and verify its ripemd160 checksum.
fn decode_checked(ty: &str, encoded: &str, len: usize, suffix: &str) -> Result<Vec<u8>, AbiError> {
    let raw = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| invalid(ty, format!("bad base58: {}", e)))?;
    if raw.len() != len + 4 {
        return Err(invalid(ty, format!("expected {} bytes, got {}", len + 4, raw.len())));
    }
    let (data, check) = raw.split_at(len);
    if checksum(data, suffix) != check {
        return Err(invalid(ty, "checksum mismatch"));
    }
    Ok(data.to_vec())
}

fn encode_checked(data: &[u8], suffix: &str) -> String {
    let mut raw = data.to_vec();
    raw.extend_from_slice(&checksum(data, suffix));
    bs58::encode(raw).into_string()
}

/// Parse a public key in legacy `EOS...` or `PUB_K1_`/`PUB_R1_` form.
pub fn parse_public_key(text: &str) -> Result<(u8, Vec<u8>), AbiError> {
    let ty = "public_key";
    if let Some(rest) = text.strip_prefix("PUB_K1_") {
        return Ok((0, decode_checked(ty, rest, KEY_LEN, "K1")?));
    }
    if let Some(rest) = text.strip_prefix("PUB_R1_") {
        return Ok((1, decode_checked(ty, rest, KEY_LEN, "R1")?));
    }
    let legacy = text
        .strip_prefix("EOS")
        .ok_or_else(|| invalid(ty, format!("unsupported key format '{}'", text)))?;
    Ok((0, decode_checked(ty, legacy, KEY_LEN, "")?))
}

pub fn format_public_key(key_type: u8, data: &[u8]) -> Result<String, AbiError> {
    match key_type {
        0 => Ok(format!("PUB_K1_{}", encode_checked(data, "K1"))),
        1 => Ok(format!("PUB_R1_{}", encode_checked(data, "R1"))),
        other => Err(invalid("public_key", format!("unsupported key type {}", other))),
    }
}

pub fn parse_signature(text: &str) -> Result<(u8, Vec<u8>), AbiError> {
    let ty = "signature";
    if let Some(rest) = text.strip_prefix("SIG_K1_") {
        return Ok((0, decode_checked(ty, rest, SIGNATURE_LEN, "K1")?));
    }
    if let Some(rest) = text.strip_prefix("SIG_R1_") {
        return Ok((1, decode_checked(ty, rest, SIGNATURE_LEN, "R1")?));
    }
    Err(invalid(ty, format!("unsupported signature format '{}'", text)))
}

pub fn format_signature(sig_type: u8, data: &[u8]) -> Result<String, AbiError> {
    match sig_type {
        0 => Ok(format!("SIG_K1_{}", encode_checked(data, "K1"))),
        1 => Ok(format!("SIG_R1_{}", encode_checked(data, "R1"))),
        other => Err(invalid("signature", format!("unsupported signature type {}", other))),
    }
}

fn parse_name(ty: &str, value: &Value) -> Result<Name, AbiError> {
    as_str(ty, value)?
        .parse()
        .map_err(|e: crate::chain::name::NameError| invalid(ty, e.to_string()))
}

/// Encode a built-in type. The caller guarantees `is_builtin(ty)`.
pub fn encode(ty: &str, value: &Value, w: &mut ByteWriter) -> Result<(), AbiError> {
    match ty {
        "bool" => {
            let flag = match value {
                Value::Bool(b) => *b,
                Value::Number(_) => as_int::<u8>(ty, value)? != 0,
                _ => return Err(mismatch(ty, value)),
            };
            w.write_u8(flag as u8);
        }
        "int8" => w.write_raw(&as_int::<i8>(ty, value)?.to_le_bytes()),
        "uint8" => w.write_u8(as_int(ty, value)?),
        "int16" => w.write_raw(&as_int::<i16>(ty, value)?.to_le_bytes()),
        "uint16" => w.write_u16(as_int(ty, value)?),
        "int32" => w.write_raw(&as_int::<i32>(ty, value)?.to_le_bytes()),
        "uint32" => w.write_u32(as_int(ty, value)?),
        "int64" => w.write_raw(&as_int::<i64>(ty, value)?.to_le_bytes()),
        "uint64" => w.write_u64(as_int(ty, value)?),
        "int128" => w.write_raw(&as_i128(ty, value)?.to_le_bytes()),
        "uint128" => {
            let v: u128 = match value {
                Value::String(s) => s.trim().parse().map_err(|_| mismatch(ty, value))?,
                _ => as_int(ty, value)?,
            };
            w.write_raw(&v.to_le_bytes());
        }
        "varint32" => w.write_varint32(as_int(ty, value)?),
        "varuint32" => w.write_varuint32(as_int(ty, value)?),
        "float32" => w.write_raw(&(as_f64(ty, value)? as f32).to_le_bytes()),
        "float64" => w.write_raw(&as_f64(ty, value)?.to_le_bytes()),
        "time_point" => w.write_raw(&parse_micros(ty, as_str(ty, value)?)?.to_le_bytes()),
        "time_point_sec" => {
            let t: TimePointSec = as_str(ty, value)?.parse().map_err(|e: String| invalid(ty, e))?;
            w.write_u32(t.0);
        }
        "block_timestamp_type" => {
            let millis = parse_micros(ty, as_str(ty, value)?)? / 1000;
            let slot = (millis - BLOCK_TIMESTAMP_EPOCH_MS) / BLOCK_INTERVAL_MS;
            w.write_u32(u32::try_from(slot).map_err(|_| invalid(ty, "timestamp out of range"))?);
        }
        "name" => w.write_name(parse_name(ty, value)?),
        "bytes" => {
            let bytes = hex::decode(as_str(ty, value)?).map_err(|e| invalid(ty, e.to_string()))?;
            w.write_bytes(&bytes);
        }
        "string" => w.write_string(as_str(ty, value)?),
        "checksum160" => w.write_raw(&fixed_hex(ty, value, 20)?),
        "checksum256" => w.write_raw(&fixed_hex(ty, value, 32)?),
        "checksum512" => w.write_raw(&fixed_hex(ty, value, 64)?),
        "symbol" => {
            let (precision, code) = parse_symbol(as_str(ty, value)?)?;
            write_symbol(w, precision, &code)?;
        }
        "symbol_code" => w.write_u64(symbol_code_value(as_str(ty, value)?)?),
        "asset" => {
            let (amount, precision, code) = parse_asset(as_str(ty, value)?)?;
            w.write_raw(&amount.to_le_bytes());
            write_symbol(w, precision, &code)?;
        }
        "extended_asset" => {
            let quantity = value.get("quantity").ok_or_else(|| mismatch(ty, value))?;
            let contract = value.get("contract").ok_or_else(|| mismatch(ty, value))?;
            encode("asset", quantity, w)?;
            encode("name", contract, w)?;
        }
        "public_key" => {
            let (key_type, data) = parse_public_key(as_str(ty, value)?)?;
            w.write_u8(key_type);
            w.write_raw(&data);
        }
        "signature" => {
            let (sig_type, data) = parse_signature(as_str(ty, value)?)?;
            w.write_u8(sig_type);
            w.write_raw(&data);
        }
        other => return Err(AbiError::UnknownType(other.to_string())),
    }
    Ok(())
}

/// Decode a built-in type. The caller guarantees `is_builtin(ty)`.
pub fn decode(ty: &str, r: &mut ByteReader<'_>) -> Result<Value, AbiError> {
    let value = match ty {
        "bool" => Value::Bool(r.read_u8()? != 0),
        "int8" => Value::from(r.read_u8()? as i8),
        "uint8" => Value::from(r.read_u8()?),
        "int16" => Value::from(r.read_u16()? as i16),
        "uint16" => Value::from(r.read_u16()?),
        "int32" => Value::from(r.read_u32()? as i32),
        "uint32" => Value::from(r.read_u32()?),
        "int64" => Value::from(r.read_u64()? as i64),
        "uint64" => Value::from(r.read_u64()?),
        "int128" => Value::String((r.read_u128()? as i128).to_string()),
        "uint128" => Value::String(r.read_u128()?.to_string()),
        "varint32" => Value::from(r.read_varint32()?),
        "varuint32" => Value::from(r.read_varuint32()?),
        "float32" => Value::from(f32::from_bits(r.read_u32()?) as f64),
        "float64" => Value::from(f64::from_bits(r.read_u64()?)),
        "time_point" => Value::String(format_micros(ty, r.read_u64()? as i64)?),
        "time_point_sec" => Value::String(TimePointSec(r.read_u32()?).to_string()),
        "block_timestamp_type" => {
            let millis = r.read_u32()? as i64 * BLOCK_INTERVAL_MS + BLOCK_TIMESTAMP_EPOCH_MS;
            Value::String(format_micros(ty, millis * 1000)?)
        }
        "name" => Value::String(r.read_name()?.to_string()),
        "bytes" => Value::String(hex::encode(r.read_bytes()?)),
        "string" => Value::String(r.read_string()?),
        "checksum160" => Value::String(hex::encode(r.read_raw(20)?)),
        "checksum256" => Value::String(hex::encode(r.read_raw(32)?)),
        "checksum512" => Value::String(hex::encode(r.read_raw(64)?)),
        "symbol" => {
            let (precision, code) = read_symbol(r)?;
            Value::String(format!("{},{}", precision, code))
        }
        "symbol_code" => Value::String(symbol_code_text(r.read_u64()?)),
        "asset" => {
            let amount = r.read_u64()? as i64;
            let (precision, code) = read_symbol(r)?;
            Value::String(format_asset(amount, precision, &code))
        }
        "extended_asset" => {
            let quantity = decode("asset", r)?;
            let contract = decode("name", r)?;
            serde_json::json!({ "quantity": quantity, "contract": contract })
        }
        "public_key" => {
            let key_type = r.read_u8()?;
            let data = r.read_raw(KEY_LEN)?;
            Value::String(format_public_key(key_type, data)?)
        }
        "signature" => {
            let sig_type = r.read_u8()?;
            let data = r.read_raw(SIGNATURE_LEN)?;
            Value::String(format_signature(sig_type, data)?)
        }
        other => return Err(AbiError::UnknownType(other.to_string())),
    };
    Ok(value)
}
