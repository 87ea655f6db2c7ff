//! Serializes values through their `Display` / `FromStr` implementations,
//! e.g. MAC addresses as `aa:bb:cc:dd:ee:ff`

use serde::{Deserialize, Deserializer, Serializer};
use std::{fmt::Display, str::FromStr};

pub fn serialize<S, T>(val: &T, s: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Display,
{
    s.serialize_str(&val.to_string())
}

pub fn deserialize<'de, D, T>(d: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let s = String::deserialize(d)?;
    s.parse::<T>().map_err(serde::de::Error::custom)
}

pub mod option {
    use super::*;

    pub fn serialize<S, T>(
        val: &Option<T>,
        s: S,
    ) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Display,
    {
        match val {
            Some(v) => s.serialize_some(&v.to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D, T>(
        d: D,
    ) -> std::result::Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr,
        T::Err: Display,
    {
        Option::<String>::deserialize(d)?
            .map(|s| s.parse::<T>().map_err(serde::de::Error::custom))
            .transpose()
    }
}
