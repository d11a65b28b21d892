//! Normalization of array responses.
//!
//! The management API serializes collections either as plain JSON arrays or,
//! when reference preservation is enabled on the server, wrapped in an object
//! of the form `{ "$id": "1", "$values": [...] }`. Everything that reaches
//! callers of the client is a plain `Vec<T>` in server order.

use serde::{Deserialize, Deserializer};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Plain(Vec<T>),
    Wrapped {
        #[serde(rename = "$values")]
        values: Vec<T>,
    },
}

impl<T> Envelope<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Envelope::Plain(items) => items,
            Envelope::Wrapped { values } => values,
        }
    }
}

/// `deserialize_with` helper for list fields nested inside resources.
/// `null` and a missing field both decode to an empty list.
pub fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let envelope: Option<Envelope<T>> = Option::deserialize(deserializer)?;
    Ok(envelope.map(Envelope::into_vec).unwrap_or_default())
}

/// Decode a top-level list body.
pub fn decode_list<T>(body: &[u8]) -> Result<Vec<T>, serde_json::Error>
where
    T: for<'de> Deserialize<'de>,
{
    let envelope: Option<Envelope<T>> = serde_json::from_slice(body)?;
    Ok(envelope.map(Envelope::into_vec).unwrap_or_default())
}

/// Ids arrive as strings from some endpoints and as numbers from others.
pub fn id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        n: u32,
    }

    #[test]
    fn unwraps_values_envelope_in_order() {
        let body = br#"{ "$id": "1", "$values": [ {"n": 2}, {"n": 1} ] }"#;
        let items: Vec<Item> = decode_list(body).unwrap();
        assert_eq!(items, vec![Item { n: 2 }, Item { n: 1 }]);
    }

    #[test]
    fn accepts_plain_arrays_and_null() {
        let items: Vec<Item> = decode_list(br#"[{"n": 7}]"#).unwrap();
        assert_eq!(items, vec![Item { n: 7 }]);

        let items: Vec<Item> = decode_list(b"null").unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn rejects_objects_without_values() {
        let result: Result<Vec<Item>, _> = decode_list(br#"{"items": []}"#);
        assert!(result.is_err());
    }

    #[test]
    fn nested_lists_and_ids() {
        #[derive(Deserialize)]
        struct Holder {
            #[serde(deserialize_with = "id")]
            id: String,
            #[serde(default, deserialize_with = "list")]
            items: Vec<Item>,
        }

        let h: Holder = serde_json::from_str(r#"{"id": 42, "items": {"$values": [{"n": 3}]}}"#).unwrap();
        assert_eq!(h.id, "42");
        assert_eq!(h.items, vec![Item { n: 3 }]);

        let h: Holder = serde_json::from_str(r#"{"id": "abc"}"#).unwrap();
        assert_eq!(h.id, "abc");
        assert!(h.items.is_empty());
    }
}
