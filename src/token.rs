//! Bearer token issued by the Conso API.
//!
//! The token is a JWT whose `sub` claim lists the PRMs it grants access to. The signature is
//! never verified locally: the server does it on every request.

use std::fmt;

use base64::{
    Engine,
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, general_purpose},
};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::prelude::*;

const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    general_purpose::NO_PAD.with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Whether the string looks like a PRM: exactly 14 decimal digits.
#[must_use]
pub fn is_valid_prm(prm: &str) -> bool {
    prm.len() == 14 && prm.bytes().all(|byte| byte.is_ascii_digit())
}

#[derive(Clone)]
pub struct Token {
    raw: String,

    /// PRMs listed in the `sub` claim, [`None`] if the claim is absent.
    prms: Option<Vec<String>>,
}

impl Token {
    /// Validate the token shape and decode its claims.
    pub fn parse(raw: &str) -> Result<Self> {
        let segments: Vec<&str> = raw.split('.').collect();
        let [header, payload, _signature] = segments.as_slice() else {
            return Err(invalid(format!(
                "cannot decode token: expected 3 segments, got {}",
                segments.len(),
            )));
        };
        let _ = decode_object(header, "header")?;
        let mut claims = decode_object(payload, "payload")?;

        let prms = match claims.remove("sub") {
            None | Some(Value::Null) => None,
            Some(subject) => Some(parse_subject(subject)?),
        };
        Ok(Self { raw: raw.to_owned(), prms })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// PRMs the token claims to grant access to.
    ///
    /// [`None`] means the token does not tell, and the server has to be asked.
    #[must_use]
    pub fn prms(&self) -> Option<&[String]> {
        self.prms.as_deref()
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token").field("raw", &"<redacted>").field("prms", &self.prms).finish()
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidToken(message.into())
}

fn decode_object(segment: &str, name: &str) -> Result<Map<String, Value>> {
    if segment.is_empty() {
        return Err(invalid(format!("cannot decode token: empty {name}")));
    }
    let bytes = BASE64
        .decode(segment)
        .map_err(|error| invalid(format!("cannot decode token {name}: {error}")))?;
    match serde_json::from_slice(&bytes) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(invalid(format!("cannot decode token: {name} is not a JSON object"))),
        Err(error) => Err(invalid(format!("cannot decode token {name}: {error}"))),
    }
}

fn parse_subject(subject: Value) -> Result<Vec<String>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Subject {
        One(String),
        Many(Vec<String>),
    }

    let prms = match serde_json::from_value(subject) {
        Ok(Subject::One(prm)) => vec![prm],
        Ok(Subject::Many(prms)) => prms,
        Err(_) => return Err(invalid("token 'sub' claim is not a string or list")),
    };
    if prms.is_empty() {
        return Err(invalid("token contains no PRMs"));
    }
    if let Some(prm) = prms.iter().find(|prm| !is_valid_prm(prm)) {
        return Err(invalid(format!("token lists `{prm}`, which is not a PRM")));
    }
    Ok(prms)
}
