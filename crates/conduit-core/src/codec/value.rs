//! Property 値と `parameters` 配列（`{key, storageType, value}` の三つ組）

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserializer, Serialize, Serializer};

use super::entry::{EntrySeed, EntryWire, PayloadSeed, PayloadWire};
use super::{Fault, UNDEFINED};
use crate::domain::{Properties, StorageType, Value};

/// Properties を三つ組の配列として書く
pub(super) struct ParametersWire<'a>(pub(super) &'a Properties);

impl Serialize for ParametersWire<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for (key, value) in self.0 {
            seq.serialize_element(&TripleWire { key, value })?;
        }
        seq.end()
    }
}

struct TripleWire<'a> {
    key: &'a str,
    value: &'a Value,
}

impl Serialize for TripleWire<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // storageType を value より先に書くと、読む側が value の型を先に知れる
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("key", self.key)?;
        map.serialize_entry("storageType", self.value.storage_type().as_str())?;
        map.serialize_entry("value", &ValueWire(self.value))?;
        map.end()
    }
}

pub(super) struct ValueWire<'a>(pub(super) &'a Value);

impl Serialize for ValueWire<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Undefined => serializer.serialize_str(UNDEFINED),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Integer(n) => serializer.serialize_i64(*n),
            Value::Double(n) => serializer.serialize_f64(*n),
            Value::Text(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&ValueWire(item))?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, &ValueWire(v))?;
                }
                map.end()
            }
            Value::Element(record) => EntryWire(record).serialize(serializer),
            Value::Payload(entries) => PayloadWire(entries).serialize(serializer),
        }
    }
}

/// `parameters` 配列を Properties に読む
pub(super) struct ParametersSeed<'f> {
    pub(super) fault: &'f Fault,
}

impl<'de> DeserializeSeed<'de> for ParametersSeed<'_> {
    type Value = Properties;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Properties, D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for ParametersSeed<'_> {
    type Value = Properties;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an array of {key, storageType, value} objects")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Properties, E> {
        Ok(Properties::new())
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Properties, A::Error> {
        let mut properties = Properties::new();
        while let Some((key, value)) = seq.next_element_seed(TripleSeed { fault: self.fault })? {
            properties.insert(key, value);
        }
        Ok(properties)
    }
}

struct TripleSeed<'f> {
    fault: &'f Fault,
}

impl<'de> DeserializeSeed<'de> for TripleSeed<'_> {
    type Value = (String, Value);

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for TripleSeed<'_> {
    type Value = (String, Value);

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a {key, storageType, value} object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let check = self.fault.scope::<A::Error>();
        let mut key: Option<String> = None;
        let mut storage: Option<StorageType> = None;
        let mut value: Option<Value> = None;
        // storageType より先に value が来た場合だけ、その 1 スロットを一時的に保持する
        let mut early: Option<serde_json::Value> = None;

        while let Some(field) = map.next_key::<String>()? {
            match field.as_str() {
                "key" => key = Some(map.next_value()?),
                "storageType" => {
                    let raw: String = map.next_value()?;
                    storage = Some(check.enumeration("storageType", &raw)?);
                }
                "value" => match storage {
                    Some(hint) => {
                        value = Some(map.next_value_seed(ValueSeed {
                            hint,
                            fault: self.fault,
                        })?);
                    }
                    None => early = Some(map.next_value()?),
                },
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }

        let key = check.require("key", key)?;
        let hint = storage.unwrap_or_default();
        let value = match (value, early) {
            (Some(value), _) => value,
            (None, Some(buffered)) => ValueSeed {
                hint,
                fault: self.fault,
            }
            .deserialize(buffered)
            .map_err(<A::Error as de::Error>::custom)?,
            (None, None) => Value::Undefined,
        };
        Ok((key, value))
    }
}

/// storageType をヒントに値を 1 つ読む
///
/// Element / Payload は entry の文法で読み、それ以外は JSON のトークン型に従う。
pub(super) struct ValueSeed<'f> {
    pub(super) hint: StorageType,
    pub(super) fault: &'f Fault,
}

impl<'de> DeserializeSeed<'de> for ValueSeed<'_> {
    type Value = Value;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        match self.hint {
            StorageType::Element => EntrySeed { fault: self.fault }
                .deserialize(deserializer)
                .map(Value::from),
            StorageType::Payload => PayloadSeed { fault: self.fault }
                .deserialize(deserializer)
                .map(Value::Payload),
            StorageType::Double => match deserializer.deserialize_any(PlainValue)? {
                Value::Integer(n) => Ok(Value::Double(n as f64)),
                other => Ok(other),
            },
            _ => deserializer.deserialize_any(PlainValue),
        }
    }
}

/// 型タグなしの値（入れ子の List / Map の中身もこれで読む）
struct PlainValue;

impl<'de> DeserializeSeed<'de> for PlainValue {
    type Value = Value;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for PlainValue {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a property value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Boolean(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        Ok(i64::try_from(v).map_or(Value::Double(v as f64), Value::Integer))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::Double(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(if v == UNDEFINED {
            Value::Undefined
        } else {
            Value::Text(v.to_string())
        })
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(if v == UNDEFINED {
            Value::Undefined
        } else {
            Value::Text(v)
        })
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Undefined)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Undefined)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element_seed(PlainValue)? {
            items.push(item);
        }
        Ok(Value::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
        let mut entries = BTreeMap::new();
        while let Some(key) = map.next_key::<String>()? {
            let value = map.next_value_seed(PlainValue)?;
            entries.insert(key, value);
        }
        Ok(Value::Map(entries))
    }
}
