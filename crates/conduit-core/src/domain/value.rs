//! Value - Envelope の Properties が運ぶ値
//!
//! Properties は string-keyed map。値の形は `DataType` タグと一致していなければならない。

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::element::ElementRecord;

/// Envelope の Properties（キー順は決定的）
pub type Properties = BTreeMap<String, Value>;

/// 値の格納型（wire の `storageType`）
///
/// 要素パラメータの型（String / Integer / Double / ElementId）と、
/// Envelope の property 値の型（Array / Object / Element / Payload）を兼ねる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StorageType {
    #[default]
    Undefined,
    String,
    Integer,
    Double,
    Boolean,
    ElementId,
    Array,
    Object,
    Element,
    Payload,
}

impl StorageType {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageType::Undefined => "undefined",
            StorageType::String => "String",
            StorageType::Integer => "Integer",
            StorageType::Double => "Double",
            StorageType::Boolean => "Boolean",
            StorageType::ElementId => "ElementId",
            StorageType::Array => "Array",
            StorageType::Object => "Object",
            StorageType::Element => "Element",
            StorageType::Payload => "Payload",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "undefined" => StorageType::Undefined,
            "String" => StorageType::String,
            "Integer" => StorageType::Integer,
            "Double" => StorageType::Double,
            "Boolean" => StorageType::Boolean,
            "ElementId" => StorageType::ElementId,
            "Array" => StorageType::Array,
            "Object" => StorageType::Object,
            "Element" => StorageType::Element,
            "Payload" => StorageType::Payload,
            other => return Err(other.to_string()),
        })
    }
}

/// Property 値
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// 値なし（wire では `"undefined"`）
    #[default]
    Undefined,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Text(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// 単一の payload entry
    Element(Box<ElementRecord>),
    /// unique id をキーにした payload entry の並び（挿入順を保持）
    Payload(Vec<ElementRecord>),
}

impl Value {
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    pub fn map<I, K, T>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Into<Value>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn storage_type(&self) -> StorageType {
        match self {
            Value::Undefined => StorageType::Undefined,
            Value::Boolean(_) => StorageType::Boolean,
            Value::Integer(_) => StorageType::Integer,
            Value::Double(_) => StorageType::Double,
            Value::Text(_) => StorageType::String,
            Value::List(_) => StorageType::Array,
            Value::Map(_) => StorageType::Object,
            Value::Element(_) => StorageType::Element,
            Value::Payload(_) => StorageType::Payload,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::Undefined
                | Value::Boolean(_)
                | Value::Integer(_)
                | Value::Double(_)
                | Value::Text(_)
        )
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, Value::List(_) | Value::Payload(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_element(&self) -> Option<&ElementRecord> {
        match self {
            Value::Element(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_payload(&self) -> Option<&[ElementRecord]> {
        match self {
            Value::Payload(entries) => Some(entries),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Double(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<ElementRecord> for Value {
    fn from(record: ElementRecord) -> Self {
        Value::Element(Box::new(record))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Undefined, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::undefined(StorageType::Undefined, "undefined")]
    #[case::string(StorageType::String, "String")]
    #[case::element_id(StorageType::ElementId, "ElementId")]
    #[case::payload(StorageType::Payload, "Payload")]
    fn storage_type_names(#[case] st: StorageType, #[case] name: &str) {
        assert_eq!(st.as_str(), name);
        assert_eq!(name.parse::<StorageType>(), Ok(st));
    }

    #[test]
    fn unknown_storage_type_is_rejected() {
        assert_eq!("Float".parse::<StorageType>(), Err("Float".to_string()));
    }

    #[test]
    fn builders_pick_variants() {
        assert_eq!(
            Value::list(["u1", "u2"]),
            Value::List(vec![Value::Text("u1".into()), Value::Text("u2".into())])
        );
        let map = Value::map([("name", "door-42")]);
        assert_eq!(map.storage_type(), StorageType::Object);
        assert_eq!(Value::from(None::<i64>), Value::Undefined);
        assert!(Value::from(3.5).is_scalar());
        assert!(Value::list(Vec::<i64>::new()).is_sequence());
    }
}
