//! Envelope の wire 形（キー順固定）
//!
//! `id`, `protocol`, `createdAt`, `updatedAt`, `name`, `description`,
//! `parameters`, `result` の後ろに `messageType`, `requestType`, `dataType`

use std::fmt;

use serde::de::{DeserializeSeed, IgnoredAny, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserializer, Serialize, Serializer};

use super::value::{ParametersSeed, ParametersWire};
use super::{Fault, PROTOCOL, UNDEFINED, defined, format_timestamp};
use crate::domain::{
    DataType, DecodeError, Envelope, EnvelopeParts, MessageType, Properties, RequestType,
    Resolution,
};

pub(super) struct EnvelopeWire<'a>(pub(super) &'a Envelope);

impl Serialize for EnvelopeWire<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let env = self.0;
        let mut map = serializer.serialize_map(Some(11))?;
        map.serialize_entry("id", env.id().as_str())?;
        map.serialize_entry("protocol", PROTOCOL)?;
        map.serialize_entry("createdAt", &format_timestamp(env.created_at()))?;
        map.serialize_entry("updatedAt", &format_timestamp(env.updated_at()))?;
        map.serialize_entry("name", env.name().unwrap_or(UNDEFINED))?;
        map.serialize_entry("description", env.description().unwrap_or(UNDEFINED))?;
        map.serialize_entry("parameters", &ParametersWire(env.properties()))?;
        map.serialize_entry("result", env.result().map_or(UNDEFINED, Resolution::as_str))?;
        map.serialize_entry("messageType", env.message_type().as_str())?;
        map.serialize_entry("requestType", env.request_type().as_str())?;
        map.serialize_entry("dataType", env.data_type().as_str())?;
        map.end()
    }
}

pub(super) struct EnvelopeSeed<'f> {
    pub(super) fault: &'f Fault,
}

impl<'de> DeserializeSeed<'de> for EnvelopeSeed<'_> {
    type Value = Envelope;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<Envelope, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de> Visitor<'de> for EnvelopeSeed<'_> {
    type Value = Envelope;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a message envelope object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Envelope, A::Error> {
        let check = self.fault.scope::<A::Error>();

        let mut id = None;
        let mut message_type: Option<MessageType> = None;
        let mut request_type: Option<RequestType> = None;
        let mut data_type: Option<DataType> = None;
        let mut created_at = None;
        let mut updated_at = None;
        let mut name = None;
        let mut description = None;
        let mut properties: Option<Properties> = None;
        let mut result: Option<Resolution> = None;

        while let Some(field) = map.next_key::<String>()? {
            match field.as_str() {
                "id" => {
                    let raw: String = map.next_value()?;
                    id = Some(check.identifier("id", &raw)?);
                }
                "protocol" => {
                    let raw: String = map.next_value()?;
                    if raw != PROTOCOL {
                        return Err(check.raise(DecodeError::UnsupportedProtocol(raw)));
                    }
                }
                "messageType" => {
                    let raw: String = map.next_value()?;
                    message_type = Some(check.enumeration("messageType", &raw)?);
                }
                "requestType" => {
                    let raw: String = map.next_value()?;
                    request_type = Some(check.enumeration("requestType", &raw)?);
                }
                "dataType" => {
                    let raw: String = map.next_value()?;
                    data_type = Some(check.enumeration("dataType", &raw)?);
                }
                "createdAt" => {
                    let raw: String = map.next_value()?;
                    created_at = Some(check.timestamp("createdAt", &raw)?);
                }
                "updatedAt" => {
                    let raw: String = map.next_value()?;
                    updated_at = Some(check.timestamp("updatedAt", &raw)?);
                }
                "name" => name = defined(map.next_value()?),
                "description" => description = defined(map.next_value()?),
                "parameters" => {
                    properties = Some(map.next_value_seed(ParametersSeed { fault: self.fault })?);
                }
                "result" => {
                    if let Some(raw) = defined(map.next_value()?) {
                        result = Some(check.enumeration("result", &raw)?);
                    }
                }
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }

        let id = check.require("id", id)?;
        let message_type = check.require("messageType", message_type)?;
        let request_type = check.require("requestType", request_type)?;
        let data_type = check.require("dataType", data_type)?;
        let created_at = check.require("createdAt", created_at)?;

        Envelope::from_parts(EnvelopeParts {
            id,
            message_type,
            request_type,
            data_type,
            result,
            properties: properties.unwrap_or_default(),
            name,
            description,
            created_at,
            updated_at: updated_at.unwrap_or(created_at),
        })
        .map_err(|cause| check.raise(cause.into()))
    }
}
