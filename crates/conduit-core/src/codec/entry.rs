//! Payload entry の wire 形
//!
//! ```text
//! {"<uniqueId>": {"Id", "ElementId", "ElementTypeId", "ElementName",
//!                 "CategoryType", "BuiltInCategory", "Parameters": [slot...]}}
//! slot = {"<key>|undefined": {"value": "...", "storageType": "..."}}
//! ```

use std::fmt;

use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserializer, Serialize, Serializer};

use super::{Fault, UNDEFINED, defined};
use crate::domain::{
    BuiltInCategory, CategoryType, DecodeError, ElementId, ElementRecord, Parameter, StorageType,
};

/// 1 件を `{"<uniqueId>": {...}}` として書く
pub(super) struct EntryWire<'a>(pub(super) &'a ElementRecord);

impl Serialize for EntryWire<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.0.unique_id, &BodyWire(self.0))?;
        map.end()
    }
}

/// 複数件を unique id キーの 1 つの object として書く（Put の `payload`）
pub(super) struct PayloadWire<'a>(pub(super) &'a [ElementRecord]);

impl Serialize for PayloadWire<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for record in self.0 {
            map.serialize_entry(&record.unique_id, &BodyWire(record))?;
        }
        map.end()
    }
}

struct BodyWire<'a>(&'a ElementRecord);

impl Serialize for BodyWire<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let record = self.0;
        let mut map = serializer.serialize_map(Some(7))?;
        map.serialize_entry("Id", record.id.as_str())?;
        map.serialize_entry("ElementId", &record.element_id.value())?;
        map.serialize_entry("ElementTypeId", &record.element_type_id.value())?;
        map.serialize_entry("ElementName", &record.element_name)?;
        map.serialize_entry("CategoryType", record.category_type.as_str())?;
        map.serialize_entry("BuiltInCategory", record.built_in_category.as_str())?;
        map.serialize_entry("Parameters", &SlotsWire(&record.parameters))?;
        map.end()
    }
}

struct SlotsWire<'a>(&'a [Parameter]);

impl Serialize for SlotsWire<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for parameter in self.0 {
            seq.serialize_element(&SlotWire(parameter))?;
        }
        seq.end()
    }
}

struct SlotWire<'a>(&'a Parameter);

impl Serialize for SlotWire<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let key = self.0.key.as_deref().unwrap_or(UNDEFINED);
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(key, &SlotBodyWire(self.0))?;
        map.end()
    }
}

struct SlotBodyWire<'a>(&'a Parameter);

impl Serialize for SlotBodyWire<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("value", self.0.value.as_deref().unwrap_or(UNDEFINED))?;
        map.serialize_entry("storageType", self.0.storage_type.as_str())?;
        map.end()
    }
}

/// `{"<uniqueId>": {...}}` をちょうど 1 件読む
pub(super) struct EntrySeed<'f> {
    pub(super) fault: &'f Fault,
}

impl<'de> DeserializeSeed<'de> for EntrySeed<'_> {
    type Value = ElementRecord;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<ElementRecord, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for EntrySeed<'_> {
    type Value = ElementRecord;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object with a single payload entry")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<ElementRecord, A::Error> {
        let check = self.fault.scope::<A::Error>();
        let Some(unique_id) = map.next_key::<String>()? else {
            return Err(check.raise(DecodeError::EntryArity(0)));
        };
        let record = map.next_value_seed(BodySeed {
            unique_id,
            fault: self.fault,
        })?;

        let mut members = 1;
        while map.next_key::<IgnoredAny>()?.is_some() {
            map.next_value::<IgnoredAny>()?;
            members += 1;
        }
        if members != 1 {
            return Err(check.raise(DecodeError::EntryArity(members)));
        }
        Ok(record)
    }
}

/// unique id キーの object を entry の並びとして読む
pub(super) struct PayloadSeed<'f> {
    pub(super) fault: &'f Fault,
}

impl<'de> DeserializeSeed<'de> for PayloadSeed<'_> {
    type Value = Vec<ElementRecord>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for PayloadSeed<'_> {
    type Value = Vec<ElementRecord>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object of payload entries keyed by unique id")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(Vec::new())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut records = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some(unique_id) = map.next_key::<String>()? {
            records.push(map.next_value_seed(BodySeed {
                unique_id,
                fault: self.fault,
            })?);
        }
        Ok(records)
    }
}

struct BodySeed<'f> {
    unique_id: String,
    fault: &'f Fault,
}

impl<'de> DeserializeSeed<'de> for BodySeed<'_> {
    type Value = ElementRecord;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<ElementRecord, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for BodySeed<'_> {
    type Value = ElementRecord;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a payload entry body")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<ElementRecord, A::Error> {
        let check = self.fault.scope::<A::Error>();
        if self.unique_id.is_empty() {
            return Err(check.raise(DecodeError::EmptyField("uniqueId")));
        }

        let mut id = None;
        let mut element_id: Option<i64> = None;
        let mut element_type_id: Option<i64> = None;
        let mut element_name: Option<String> = None;
        let mut category_type = CategoryType::default();
        let mut built_in_category = BuiltInCategory::default();
        let mut parameters = Vec::new();

        while let Some(field) = map.next_key::<String>()? {
            match field.as_str() {
                "Id" => {
                    let raw: String = map.next_value()?;
                    id = Some(check.identifier("Id", &raw)?);
                }
                "ElementId" => element_id = map.next_value()?,
                "ElementTypeId" => element_type_id = map.next_value()?,
                "ElementName" => element_name = defined(map.next_value()?),
                "CategoryType" => {
                    let raw: String = map.next_value()?;
                    category_type = check.enumeration("CategoryType", &raw)?;
                }
                "BuiltInCategory" => {
                    let raw: String = map.next_value()?;
                    built_in_category = check.enumeration("BuiltInCategory", &raw)?;
                }
                "Parameters" => {
                    parameters = map.next_value_seed(SlotsSeed { fault: self.fault })?;
                }
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }

        Ok(ElementRecord {
            unique_id: self.unique_id,
            id: check.require("Id", id)?,
            element_id: ElementId::from(element_id),
            element_type_id: ElementId::from(element_type_id),
            element_name: element_name.unwrap_or_default(),
            category_type,
            built_in_category,
            parameters,
        })
    }
}

struct SlotsSeed<'f> {
    fault: &'f Fault,
}

impl<'de> DeserializeSeed<'de> for SlotsSeed<'_> {
    type Value = Vec<Parameter>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for SlotsSeed<'_> {
    type Value = Vec<Parameter>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an array of parameter slots")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(Vec::new())
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut slots = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(slot) = seq.next_element_seed(SlotSeed { fault: self.fault })? {
            slots.push(slot);
        }
        Ok(slots)
    }
}

struct SlotSeed<'f> {
    fault: &'f Fault,
}

impl<'de> DeserializeSeed<'de> for SlotSeed<'_> {
    type Value = Parameter;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Parameter, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for SlotSeed<'_> {
    type Value = Parameter;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a {key: {value, storageType}} slot")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Parameter, A::Error> {
        // `{}` は空スロット扱い、2 つ目以降のメンバーは読み飛ばす
        let Some(key) = map.next_key::<String>()? else {
            return Ok(Parameter::empty());
        };
        let (value, storage_type) = map.next_value_seed(SlotBodySeed { fault: self.fault })?;
        while map.next_key::<IgnoredAny>()?.is_some() {
            map.next_value::<IgnoredAny>()?;
        }
        Ok(Parameter {
            key: defined(Some(key)),
            value,
            storage_type,
        })
    }
}

struct SlotBodySeed<'f> {
    fault: &'f Fault,
}

impl<'de> DeserializeSeed<'de> for SlotBodySeed<'_> {
    type Value = (Option<String>, StorageType);

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for SlotBodySeed<'_> {
    type Value = (Option<String>, StorageType);

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a {value, storageType} object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let check = self.fault.scope::<A::Error>();
        let mut value = None;
        let mut storage_type = StorageType::Undefined;
        while let Some(field) = map.next_key::<String>()? {
            match field.as_str() {
                "value" => value = defined(map.next_value_seed(LooseText)?),
                "storageType" => {
                    let raw: String = map.next_value()?;
                    storage_type = check.enumeration("storageType", &raw)?;
                }
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok((value, storage_type))
    }
}

/// slot の value は文字列が基本だが、数値や真偽値も文字列として受け取る
struct LooseText;

impl<'de> DeserializeSeed<'de> for LooseText {
    type Value = Option<String>;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for LooseText {
    type Value = Option<String>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a scalar parameter value")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(Some(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(Some(v.to_string()))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Identifier;
    use serde_json::json;

    fn decode_slots(raw: serde_json::Value) -> Vec<Parameter> {
        let fault = Fault::default();
        let text = raw.to_string();
        let mut de = serde_json::Deserializer::from_str(&text);
        SlotsSeed { fault: &fault }.deserialize(&mut de).unwrap()
    }

    #[test]
    fn slots_accept_loose_values_and_empty_objects() {
        let slots = decode_slots(json!([
            {"Height": {"value": 2100, "storageType": "Integer"}},
            {"Fire": {"value": true}},
            {},
            {"undefined": {"value": "undefined", "storageType": "undefined"}}
        ]));
        assert_eq!(slots[0], Parameter::new("Height", "2100", StorageType::Integer));
        assert_eq!(slots[1].value.as_deref(), Some("true"));
        assert_eq!(slots[1].storage_type, StorageType::Undefined);
        assert!(slots[2].is_empty());
        assert!(slots[3].is_empty());
    }

    #[test]
    fn payload_keeps_wire_order() {
        let a = ElementRecord::new("b-uid", Identifier::create());
        let b = ElementRecord::new("a-uid", Identifier::create());
        let records = vec![a, b];

        let bytes = serde_json::to_vec(&PayloadWire(&records)).unwrap();
        let fault = Fault::default();
        let mut de = serde_json::Deserializer::from_slice(&bytes);
        let back = PayloadSeed { fault: &fault }.deserialize(&mut de).unwrap();

        assert_eq!(back, records);
    }

    #[test]
    fn empty_unique_id_is_rejected() {
        let raw = json!({"": {"Id": Identifier::create().as_str()}}).to_string();
        let fault = Fault::default();
        let mut de = serde_json::Deserializer::from_str(&raw);
        assert!(EntrySeed { fault: &fault }.deserialize(&mut de).is_err());
        assert_eq!(fault.take(), Some(DecodeError::EmptyField("uniqueId")));
    }
}
