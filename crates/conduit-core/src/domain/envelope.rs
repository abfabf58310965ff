//! Envelope - 1 件の request / result を表す不変メッセージ
//!
//! # ライフサイクル
//! 1. `create`（または read/add/update/delete builder）で Request として作る
//! 2. `deep_copy` で Result / Error に解決する（1 request につき 1 回）
//! 3. 破棄するか、Cache に Identifier キーで置く
//!
//! `shallow_copy` は Identifier を保ったままメタデータだけを言い直す。
//! 新しい論理メッセージは作らない。

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};

use super::element::ElementRecord;
use super::errors::EnvelopeError;
use super::ids::Identifier;
use super::value::{Properties, Value};

/// Property bag の慣習的なキー
pub const KEY_PROPERTY: &str = "key";
pub const NAME_PROPERTY: &str = "name";
pub const DESCRIPTION_PROPERTY: &str = "description";
pub const PAYLOAD_PROPERTY: &str = "payload";

/// wire 名を持つ enum をまとめて定義する
macro_rules! wire_enum {
    (
        $(#[$attr:meta])*
        $name:ident { $($variant:ident => $wire:literal),+ $(,)? }
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err(other.to_string()),
                }
            }
        }
    };
}

wire_enum! {
    /// メッセージの種類
    MessageType {
        Request => "Request",
        Result => "Result",
        Notification => "Notification",
        Error => "Error",
    }
}

wire_enum! {
    /// 解決結果。Request の間は未定（`None`）。
    Resolution {
        Accepted => "Accepted",
        Rejected => "Rejected",
        Cancelled => "Cancelled",
    }
}

wire_enum! {
    /// CRUD の動詞
    RequestType {
        Get => "Get",
        Put => "Put",
        Post => "Post",
        Delete => "Delete",
    }
}

wire_enum! {
    /// Properties の形を表すタグ
    DataType {
        Empty => "Empty",
        Scalar => "Scalar",
        Array => "Array",
        Object => "Object",
    }
}

impl DataType {
    /// Properties の実際の形から DataType を決める
    ///
    /// 列（List / Payload）を含めば Array、なければ Map / Element を含めば Object。
    pub fn infer(properties: &Properties) -> DataType {
        if properties.is_empty() {
            DataType::Empty
        } else if properties.values().any(Value::is_sequence) {
            DataType::Array
        } else if properties.values().any(|v| !v.is_scalar()) {
            DataType::Object
        } else {
            DataType::Scalar
        }
    }

    pub fn agrees_with(self, properties: &Properties) -> bool {
        self == DataType::infer(properties)
    }
}

/// Envelope 本体。フィールドは非公開で、生成後は変更できない。
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    id: Identifier,
    message_type: MessageType,
    request_type: RequestType,
    data_type: DataType,
    result: Option<Resolution>,
    properties: Properties,
    name: Option<String>,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// decode 側が組み立てる生の部品。`Envelope::from_parts` で検証される。
#[derive(Debug, Clone)]
pub struct EnvelopeParts {
    pub id: Identifier,
    pub message_type: MessageType,
    pub request_type: RequestType,
    pub data_type: DataType,
    pub result: Option<Resolution>,
    pub properties: Properties,
    pub name: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Envelope {
    /// 新しい Request を作る（新しい Identifier、Result は未定）
    pub fn create(
        data_type: DataType,
        request_type: RequestType,
        properties: Properties,
        description: Option<String>,
        name: Option<String>,
    ) -> Result<Self, EnvelopeError> {
        Self::create_with_id(
            Identifier::create(),
            data_type,
            request_type,
            properties,
            description,
            name,
        )
    }

    /// Identifier を外から渡す版（IdGenerator を差し替えたいとき）
    pub fn create_with_id(
        id: Identifier,
        data_type: DataType,
        request_type: RequestType,
        properties: Properties,
        description: Option<String>,
        name: Option<String>,
    ) -> Result<Self, EnvelopeError> {
        if !data_type.agrees_with(&properties) {
            return Err(EnvelopeError::ShapeMismatch {
                declared: data_type,
            });
        }
        Ok(Self::request(id, data_type, request_type, properties, description, name))
    }

    fn request(
        id: Identifier,
        data_type: DataType,
        request_type: RequestType,
        properties: Properties,
        description: Option<String>,
        name: Option<String>,
    ) -> Self {
        let created_at = id.timestamp();
        Self {
            id,
            message_type: MessageType::Request,
            request_type,
            data_type,
            result: None,
            properties,
            name,
            description,
            created_at,
            updated_at: created_at,
        }
    }

    /// 通知メッセージ（解決されることはない）
    pub fn notification(properties: Properties, name: Option<String>) -> Self {
        let data_type = DataType::infer(&properties);
        Self {
            message_type: MessageType::Notification,
            ..Self::request(
                Identifier::create(),
                data_type,
                RequestType::Post,
                properties,
                None,
                name,
            )
        }
    }

    /// Get: `{"key": [...]}`
    pub fn read<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self::keyed(RequestType::Get, keys)
    }

    /// Post: `{"key": [...]}`
    pub fn update<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self::keyed(RequestType::Post, keys)
    }

    /// Delete: `{"key": [...]}`
    pub fn delete<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self::keyed(RequestType::Delete, keys)
    }

    /// Put: `{"name", "description", "payload": {...}}`
    pub fn add(
        name: impl Into<String>,
        description: impl Into<String>,
        payload: Vec<ElementRecord>,
    ) -> Self {
        let name = name.into();
        let description = description.into();
        let mut properties = Properties::new();
        properties.insert(NAME_PROPERTY.to_string(), Value::Text(name.clone()));
        properties.insert(
            DESCRIPTION_PROPERTY.to_string(),
            Value::Text(description.clone()),
        );
        properties.insert(PAYLOAD_PROPERTY.to_string(), Value::Payload(payload));
        Self::request(
            Identifier::create(),
            DataType::Array,
            RequestType::Put,
            properties,
            Some(description),
            Some(name),
        )
    }

    fn keyed<I, K>(request_type: RequestType, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let keys = Value::List(keys.into_iter().map(|k| Value::Text(k.into())).collect());
        let mut properties = Properties::new();
        properties.insert(KEY_PROPERTY.to_string(), keys);
        Self::request(
            Identifier::create(),
            DataType::Array,
            request_type,
            properties,
            None,
            None,
        )
    }

    /// 部品から組み立てる（decode 用）。DataType と Properties の整合だけ検証する。
    pub fn from_parts(parts: EnvelopeParts) -> Result<Self, EnvelopeError> {
        if !parts.data_type.agrees_with(&parts.properties) {
            return Err(EnvelopeError::ShapeMismatch {
                declared: parts.data_type,
            });
        }
        Ok(Self {
            id: parts.id,
            message_type: parts.message_type,
            request_type: parts.request_type,
            data_type: parts.data_type,
            result: parts.result,
            properties: parts.properties,
            name: parts.name,
            description: parts.description,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        })
    }

    /// 同じ Identifier でメタデータを言い直す
    pub fn shallow_copy(&self) -> Self {
        Self {
            updated_at: touch(self.created_at),
            ..self.clone()
        }
    }

    /// Request を解決する。Identifier は保ち、Result / Properties を差し替える。
    ///
    /// Accepted なら MessageType::Result、Rejected / Cancelled なら MessageType::Error。
    pub fn deep_copy(
        &self,
        result: Resolution,
        properties: Properties,
    ) -> Result<Self, EnvelopeError> {
        if self.message_type != MessageType::Request {
            return Err(EnvelopeError::AlreadyResolved(self.message_type));
        }
        let message_type = match result {
            Resolution::Accepted => MessageType::Result,
            Resolution::Rejected | Resolution::Cancelled => MessageType::Error,
        };
        Ok(Self {
            id: self.id.clone(),
            message_type,
            request_type: self.request_type,
            data_type: DataType::infer(&properties),
            result: Some(result),
            properties,
            name: self.name.clone(),
            description: self.description.clone(),
            created_at: self.created_at,
            updated_at: touch(self.created_at),
        })
    }

    pub fn id(&self) -> &Identifier {
        &self.id
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn request_type(&self) -> RequestType {
        self.request_type
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn result(&self) -> Option<Resolution> {
        self.result
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_resolved(&self) -> bool {
        self.result.is_some()
    }

    /// `"key"` property の文字列キー（Get / Post / Delete）
    pub fn keys(&self) -> Vec<&str> {
        self.property(KEY_PROPERTY)
            .and_then(Value::as_list)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// `"payload"` property の entry（Put / 解決済み Result）
    pub fn payload(&self) -> &[ElementRecord] {
        self.property(PAYLOAD_PROPERTY)
            .and_then(Value::as_payload)
            .unwrap_or_default()
    }
}

/// wire はミリ秒精度なので、ここで丸めておく
fn touch(created_at: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3).max(created_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn keys_of(env: &Envelope) -> Vec<String> {
        env.keys().into_iter().map(str::to_string).collect()
    }

    #[test]
    fn read_builder_puts_keys_under_key() {
        let env = Envelope::read(["u1", "u2"]);

        assert_eq!(env.data_type(), DataType::Array);
        assert_eq!(env.request_type(), RequestType::Get);
        assert_eq!(env.message_type(), MessageType::Request);
        assert_eq!(env.result(), None);

        let mut expected = Properties::new();
        expected.insert("key".to_string(), Value::list(["u1", "u2"]));
        assert_eq!(env.properties(), &expected);
        assert_eq!(keys_of(&env), vec!["u1", "u2"]);
    }

    #[rstest]
    #[case::update(Envelope::update(["a"]), RequestType::Post)]
    #[case::delete(Envelope::delete(["a"]), RequestType::Delete)]
    #[case::read(Envelope::read(["a"]), RequestType::Get)]
    fn keyed_builders_fix_verb_and_shape(#[case] env: Envelope, #[case] verb: RequestType) {
        assert_eq!(env.request_type(), verb);
        assert_eq!(env.data_type(), DataType::Array);
        assert_eq!(env.keys(), vec!["a"]);
    }

    #[test]
    fn add_builder_fills_put_bag() {
        let record = ElementRecord::new("uid-7", Identifier::create()).with_element_id(7);
        let env = Envelope::add("doors", "level 1 doors", vec![record.clone()]);

        assert_eq!(env.request_type(), RequestType::Put);
        assert_eq!(env.data_type(), DataType::Array);
        assert_eq!(env.name(), Some("doors"));
        assert_eq!(env.description(), Some("level 1 doors"));
        assert_eq!(env.property("name"), Some(&Value::from("doors")));
        assert_eq!(env.payload(), &[record]);
    }

    #[test]
    fn create_rejects_shape_mismatch() {
        let mut props = Properties::new();
        props.insert("key".into(), Value::list(["x"]));

        let err = Envelope::create(DataType::Object, RequestType::Get, props.clone(), None, None)
            .unwrap_err();
        assert_eq!(
            err,
            EnvelopeError::ShapeMismatch {
                declared: DataType::Object
            }
        );

        let ok = Envelope::create(DataType::Array, RequestType::Get, props, None, None).unwrap();
        assert_eq!(ok.message_type(), MessageType::Request);
        assert_eq!(ok.created_at(), ok.id().timestamp());
    }

    #[rstest]
    #[case::empty(Properties::new(), DataType::Empty)]
    #[case::scalar([("n".to_string(), Value::Integer(1))].into(), DataType::Scalar)]
    #[case::object([("m".to_string(), Value::map([("a", 1i64)]))].into(), DataType::Object)]
    #[case::array(
        [("m".to_string(), Value::map([("a", 1i64)])), ("k".to_string(), Value::list([1i64]))].into(),
        DataType::Array
    )]
    fn data_type_is_inferred_from_shape(#[case] props: Properties, #[case] expected: DataType) {
        assert_eq!(DataType::infer(&props), expected);
    }

    #[test]
    fn shallow_copy_keeps_identity_and_fields() {
        let env = Envelope::read(["u1"]);
        let copy = env.shallow_copy();

        assert_eq!(copy.id(), env.id());
        assert_eq!(copy.properties(), env.properties());
        assert_eq!(copy.message_type(), MessageType::Request);
        assert!(copy.updated_at() >= env.updated_at());
    }

    #[test]
    fn deep_copy_resolves_request_once() {
        let env = Envelope::read(["u1"]);
        let mut answer = Properties::new();
        answer.insert("u1".into(), Value::map([("name", "door-42")]));

        let resolved = env.deep_copy(Resolution::Accepted, answer.clone()).unwrap();
        assert_eq!(resolved.id(), env.id());
        assert_eq!(resolved.message_type(), MessageType::Result);
        assert_eq!(resolved.result(), Some(Resolution::Accepted));
        assert_eq!(resolved.data_type(), DataType::Object);
        assert_eq!(resolved.properties(), &answer);
        assert_eq!(resolved.request_type(), RequestType::Get);

        // 2 回目の解決はできない
        assert_eq!(
            resolved.deep_copy(Resolution::Accepted, Properties::new()),
            Err(EnvelopeError::AlreadyResolved(MessageType::Result))
        );
    }

    #[rstest]
    #[case::rejected(Resolution::Rejected)]
    #[case::cancelled(Resolution::Cancelled)]
    fn negative_resolution_becomes_error(#[case] result: Resolution) {
        let env = Envelope::delete(["u1"]);
        let resolved = env.deep_copy(result, Properties::new()).unwrap();
        assert_eq!(resolved.message_type(), MessageType::Error);
        assert_eq!(resolved.data_type(), DataType::Empty);
    }

    #[test]
    fn notification_cannot_be_resolved() {
        let note = Envelope::notification(Properties::new(), Some("ping".into()));
        assert_eq!(note.message_type(), MessageType::Notification);
        assert!(note.deep_copy(Resolution::Accepted, Properties::new()).is_err());
    }

    #[test]
    fn wire_enums_parse_their_names() {
        assert_eq!("Request".parse::<MessageType>(), Ok(MessageType::Request));
        assert_eq!("Cancelled".parse::<Resolution>(), Ok(Resolution::Cancelled));
        assert_eq!("Delete".parse::<RequestType>(), Ok(RequestType::Delete));
        assert_eq!("Array".parse::<DataType>(), Ok(DataType::Array));
        assert!("get".parse::<RequestType>().is_err());
    }
}
