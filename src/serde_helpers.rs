//! Serde helpers for flexible deserialization.
//!
//! Chat gateways disagree on whether identifiers are JSON numbers or strings;
//! [`StringFromAny`] accepts both.

/// A `serde_as` type that deserializes strings or integers as `String`.
///
/// Use with `#[serde_as(as = "StringFromAny")]` for `String` fields
/// or `#[serde_as(as = "Option<StringFromAny>")]` for `Option<String>`.
pub struct StringFromAny;

impl<'de> serde_with::DeserializeAs<'de, String> for StringFromAny {
    fn deserialize_as<D>(deserializer: D) -> std::result::Result<String, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use std::fmt;

        use serde::de::{self, Visitor};

        struct StringOrNumberVisitor;

        impl Visitor<'_> for StringOrNumberVisitor {
            type Value = String;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("string or integer")
            }

            fn visit_str<E>(self, v: &str) -> std::result::Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(v.to_owned())
            }

            fn visit_string<E>(self, v: String) -> std::result::Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(v)
            }

            fn visit_i64<E>(self, v: i64) -> std::result::Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(v.to_string())
            }

            fn visit_u64<E>(self, v: u64) -> std::result::Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(v.to_string())
            }
        }

        deserializer.deserialize_any(StringOrNumberVisitor)
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_with::serde_as;

    use super::StringFromAny;

    #[serde_as]
    #[derive(Debug, Deserialize)]
    struct Ids {
        #[serde_as(as = "StringFromAny")]
        id: String,
        #[serde_as(as = "Option<StringFromAny>")]
        group: Option<String>,
    }

    #[test]
    fn accepts_numbers_and_strings() {
        let numeric: Ids = serde_json::from_str(r#"{"id": 10001, "group": 42}"#).unwrap();
        assert_eq!(numeric.id, "10001");
        assert_eq!(numeric.group.as_deref(), Some("42"));

        let textual: Ids = serde_json::from_str(r#"{"id": "alice"}"#).unwrap();
        assert_eq!(textual.id, "alice");
        assert_eq!(textual.group, None);
    }

    #[test]
    fn rejects_other_types() {
        let result = serde_json::from_str::<Ids>(r#"{"id": true}"#);
        assert!(result.is_err(), "booleans are not identifiers");
    }
}
