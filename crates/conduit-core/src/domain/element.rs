//! Payload entry: スキャンされた 1 要素分の事実。
//!
//! 中身の意味（部屋・コネクタ・ワークセットなど）はここでは解釈しない。
//! core は識別・キャッシュ・シリアライズだけを行う。

use std::fmt;
use std::str::FromStr;

use super::ids::Identifier;
use super::value::StorageType;

/// Host 側の整数 element id。`-1` は「なし」。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(i64);

impl ElementId {
    pub const INVALID: ElementId = ElementId(-1);

    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(self) -> i64 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl From<Option<i64>> for ElementId {
    fn from(value: Option<i64>) -> Self {
        value.map_or(Self::INVALID, Self)
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 要素カテゴリの大分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CategoryType {
    #[default]
    Invalid,
    Model,
    Annotation,
    Internal,
    AnalyticalModel,
}

impl CategoryType {
    pub fn as_str(self) -> &'static str {
        match self {
            CategoryType::Invalid => "Invalid",
            CategoryType::Model => "Model",
            CategoryType::Annotation => "Annotation",
            CategoryType::Internal => "Internal",
            CategoryType::AnalyticalModel => "AnalyticalModel",
        }
    }
}

impl fmt::Display for CategoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CategoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Invalid" => CategoryType::Invalid,
            "Model" => CategoryType::Model,
            "Annotation" => CategoryType::Annotation,
            "Internal" => CategoryType::Internal,
            "AnalyticalModel" => CategoryType::AnalyticalModel,
            other => return Err(other.to_string()),
        })
    }
}

/// Built-in category の enum 名（`OST_Doors` など）
///
/// host 側の列挙は巨大なので閉じた enum にはせず、名前の文法だけ検証する。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuiltInCategory(String);

impl BuiltInCategory {
    pub const INVALID: &'static str = "INVALID";

    pub fn invalid() -> Self {
        Self(Self::INVALID.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BuiltInCategory {
    fn default() -> Self {
        Self::invalid()
    }
}

impl FromStr for BuiltInCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let well_formed = s.starts_with(|c: char| c.is_ascii_alphabetic())
            && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
        if well_formed {
            Ok(Self(s.to_string()))
        } else {
            Err(s.to_string())
        }
    }
}

impl fmt::Display for BuiltInCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 要素パラメータの 1 スロット。key / value のない空スロットもありうる。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Parameter {
    pub key: Option<String>,
    pub value: Option<String>,
    pub storage_type: StorageType,
}

impl Parameter {
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        storage_type: StorageType,
    ) -> Self {
        Self {
            key: Some(key.into()),
            value: Some(value.into()),
            storage_type,
        }
    }

    pub fn text(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, value, StorageType::String)
    }

    /// key も value もない slot
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_none() && self.value.is_none()
    }
}

/// 1 要素分の payload entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRecord {
    /// host 側の安定した一意 id（wire 上ではこの entry のキーになる）
    pub unique_id: String,
    pub id: Identifier,
    pub element_id: ElementId,
    pub element_type_id: ElementId,
    /// 空文字 = 名前なし
    pub element_name: String,
    pub category_type: CategoryType,
    pub built_in_category: BuiltInCategory,
    pub parameters: Vec<Parameter>,
}

impl ElementRecord {
    pub fn new(unique_id: impl Into<String>, id: Identifier) -> Self {
        Self {
            unique_id: unique_id.into(),
            id,
            element_id: ElementId::INVALID,
            element_type_id: ElementId::INVALID,
            element_name: String::new(),
            category_type: CategoryType::Invalid,
            built_in_category: BuiltInCategory::invalid(),
            parameters: Vec::new(),
        }
    }

    pub fn with_element_id(mut self, element_id: i64) -> Self {
        self.element_id = ElementId::new(element_id);
        self
    }

    pub fn with_element_type_id(mut self, element_type_id: i64) -> Self {
        self.element_type_id = ElementId::new(element_type_id);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.element_name = name.into();
        self
    }

    pub fn with_category(mut self, category_type: CategoryType, built_in: BuiltInCategory) -> Self {
        self.category_type = category_type;
        self.built_in_category = built_in;
        self
    }

    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// key で最初の parameter を探す
    pub fn parameter(&self, key: &str) -> Option<&Parameter> {
        self.parameters
            .iter()
            .find(|p| p.key.as_deref() == Some(key))
    }
}
