//! `#[serde(with)]` codec for `f64` that keeps non-finite values.
//!
//! `serde_json` writes NaN and the infinities as `null`, which does not read
//! back into an `f64`. Finite values stay plain numbers; the others are
//! written as the strings `"inf"`, `"-inf"` and `"NaN"`.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Repr {
    Number(f64),
    Text(String),
}

pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_finite() {
        serializer.serialize_f64(*value)
    } else {
        serializer.serialize_str(&value.to_string())
    }
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match Repr::deserialize(deserializer)? {
        Repr::Number(v) => Ok(v),
        Repr::Text(s) => s
            .parse()
            .map_err(|_| D::Error::custom(format!("invalid float `{s}`"))),
    }
}
