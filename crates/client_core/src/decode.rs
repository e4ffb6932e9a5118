//! Strict decoding of inbound host payloads.
//!
//! Malformed replies fail closed with [`DecodeError`]; no attempt is made to
//! patch up broken JSON.

use std::collections::HashSet;

use serde_json::Value;
use shared::protocol::{BotEnvelope, InboundPayload, UserDataPayload};

use crate::error::DecodeError;

/// Returns `Ok(None)` for chat text that does not carry the reply prefix.
pub fn decode_inbound(
    payload: &InboundPayload,
    reply_prefix: &str,
) -> Result<Option<UserDataPayload>, DecodeError> {
    let decoded = match payload {
        InboundPayload::Structured(value) => decode_structured(value)?,
        InboundPayload::Text(text) => {
            let Some(body) = text.trim_start().strip_prefix(reply_prefix) else {
                return Ok(None);
            };
            let BotEnvelope::UserData(data) =
                serde_json::from_str(body.trim()).map_err(DecodeError::Malformed)?;
            data
        }
    };
    ensure_unique_horse_ids(&decoded)?;
    Ok(Some(decoded))
}

fn decode_structured(value: &Value) -> Result<UserDataPayload, DecodeError> {
    let Some(object) = value.as_object() else {
        return Err(DecodeError::UnrecognizedShape);
    };
    if object.contains_key("user") {
        return serde_json::from_value(value.clone()).map_err(DecodeError::Malformed);
    }
    if object.contains_key("type") {
        let BotEnvelope::UserData(data) =
            serde_json::from_value(value.clone()).map_err(DecodeError::Malformed)?;
        return Ok(data);
    }
    Err(DecodeError::UnrecognizedShape)
}

fn ensure_unique_horse_ids(payload: &UserDataPayload) -> Result<(), DecodeError> {
    let mut seen = HashSet::with_capacity(payload.horses.len());
    for horse in &payload.horses {
        if !seen.insert(horse.id) {
            return Err(DecodeError::DuplicateHorseId(horse.id.0));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/decode_tests.rs"]
mod tests;
