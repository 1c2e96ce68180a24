//! # Frame Decoder
//!
//! Walks a [`ReadBuffer`] layout over a raw 255 byte response, consuming each
//! wire field with `nom` and converting it according to its kind and scale.
//!
//! Decoding is best effort: a field that fails to parse is logged and keeps
//! its previous value, and the remaining fields are still decoded. Only a
//! frame of the wrong length is rejected outright.

use crate::constants::OMNI_FRAME_LEN;
use crate::error::MeterError;
use crate::logging::LogSink;
use crate::meter::schema::{field, format_float, FieldDescriptor, FieldKind, FieldValue, ReadBuffer, ScaleKind};
use crate::meter::types::ScaleKwh;
use crate::util::hex::encode_hex;
use log::Level;
use nom::bytes::complete::take;
use nom::IResult;

fn take_field(input: &[u8], size: usize) -> IResult<&[u8], &[u8]> {
    take(size)(input)
}

/// Divisor for `KwhDynamic` fields given a raw precision code.
///
/// Unknown codes fall back to no scaling; the caller is told so it can log.
pub fn kwh_divisor(code: i64) -> Result<f64, i64> {
    u8::try_from(code)
        .ok()
        .and_then(|c| ScaleKwh::try_from(c).ok())
        .map(ScaleKwh::divisor)
        .ok_or(code)
}

/// Reads the raw `kWh_Scale` code out of a frame without decoding the rest.
///
/// Returns `None` when the layout has no scale field, the frame has the wrong
/// length or the byte is not a digit.
pub fn read_scale_code(raw: &[u8], layout: &ReadBuffer) -> Option<i64> {
    if raw.len() != OMNI_FRAME_LEN {
        return None;
    }
    let offset = layout.wire_offset(field::KWH_SCALE)?;
    let size = layout.get(field::KWH_SCALE)?.size;
    let text = std::str::from_utf8(raw.get(offset..offset + size)?).ok()?;
    text.trim().parse().ok()
}

/// Converts the bytes of one field into its formatted and native values.
fn convert(bytes: &[u8], desc: &FieldDescriptor, kwh_code: i64, sink: &dyn LogSink, context: &str) -> Result<(String, FieldValue), String> {
    match desc.kind {
        FieldKind::Hex => {
            let hex = encode_hex(bytes);
            Ok((hex.clone(), FieldValue::Text(hex)))
        }
        FieldKind::String => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            Ok((text.clone(), FieldValue::Text(text)))
        }
        FieldKind::PowerFactor => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            Ok((text.clone(), FieldValue::Text(text)))
        }
        FieldKind::Int => {
            let text = std::str::from_utf8(bytes).map_err(|e| e.to_string())?;
            let trimmed = text.trim();
            let value: i64 = if trimmed.is_empty() {
                0
            } else {
                trimmed
                    .parse()
                    .map_err(|_| format!("not an integer: {text:?}"))?
            };
            Ok((value.to_string(), FieldValue::Int(value)))
        }
        FieldKind::Float => {
            let text = std::str::from_utf8(bytes).map_err(|e| e.to_string())?;
            let value: f64 = text
                .trim()
                .parse()
                .map_err(|_| format!("not a number: {text:?}"))?;
            let divisor = match desc.scale {
                ScaleKind::None => 1.0,
                ScaleKind::Div10 => 10.0,
                ScaleKind::Div100 => 100.0,
                ScaleKind::KwhDynamic => kwh_divisor(kwh_code).unwrap_or_else(|code| {
                    sink.log(Level::Warn, context, &format!("Unrecognized kWh scale {code}"));
                    1.0
                }),
            };
            let scaled = value / divisor;
            Ok((format_float(scaled), FieldValue::Float(scaled)))
        }
    }
}

/// Decodes `raw` into `buffer` in place.
///
/// `kwh_code` is the resolved precision code (`0`, `1` or `2`) used for
/// `KwhDynamic` fields. Calculated fields are left untouched.
pub fn decode(raw: &[u8], buffer: &mut ReadBuffer, kwh_code: i64, sink: &dyn LogSink, context: &str) -> Result<(), MeterError> {
    if raw.len() != OMNI_FRAME_LEN {
        let msg = format!("expected {} bytes, got {}", OMNI_FRAME_LEN, raw.len());
        sink.log(Level::Warn, context, &format!("Frame length mismatch: {msg}"));
        return Err(MeterError::Frame(msg));
    }

    let mut input = raw;
    for desc in buffer.iter_mut().filter(|d| !d.calculated) {
        let (rest, bytes) = match take_field(input, desc.size) {
            Ok(ok) => ok,
            Err(e) => {
                // Layout larger than the frame; nothing further can be aligned.
                let msg = format!("layout overruns frame at {}: {e}", desc.name);
                sink.log(Level::Error, context, &msg);
                return Err(MeterError::Frame(msg));
            }
        };
        input = rest;
        match convert(bytes, desc, kwh_code, sink, context) {
            Ok((formatted, native)) => desc.set(formatted, native),
            Err(reason) => sink.log(
                Level::Warn,
                context,
                &format!("Field {} not decoded: {reason}", desc.name),
            ),
        }
    }
    Ok(())
}
