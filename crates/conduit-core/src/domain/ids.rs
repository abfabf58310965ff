//! Identifier - 衝突しにくく、時刻でソートできる文字列キー
//!
//! # 文法（25 文字固定）
//! ```text
//! c  lm4xk2q0  00a1  3f9z  8k2m0q7d
//! |  |         |     |     └ random      (8, base36)
//! |  |         |     └ fingerprint       (4, base36, プロセス由来)
//! |  |         └ counter                 (4, base36, 36^4 で一周)
//! |  └ timestamp                         (8, base36, Unix epoch ms)
//! └ prefix                               (1, 小文字 ascii)
//! ```
//!
//! timestamp は固定幅なので、文字列の辞書順 = 生成時刻順になる。
//! 中央の調整なしで生成でき、同一 tick 内の衝突は counter、
//! プロセス間の衝突は fingerprint + random で抑える。

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DecodeError;

pub const DEFAULT_PREFIX: char = 'c';

const BASE: u64 = 36;
const TIMESTAMP_LEN: usize = 8;
const COUNTER_LEN: usize = 4;
const FINGERPRINT_LEN: usize = 4;
const RANDOM_LEN: usize = 8;

const TIMESTAMP_AT: usize = 1;
const COUNTER_AT: usize = TIMESTAMP_AT + TIMESTAMP_LEN;
const FINGERPRINT_AT: usize = COUNTER_AT + COUNTER_LEN;
const RANDOM_AT: usize = FINGERPRINT_AT + FINGERPRINT_LEN;

/// Counter wraps at this value (36^4).
pub const COUNTER_SPAN: u32 = 36 * 36 * 36 * 36;

/// Timestamps are clamped below this many milliseconds (36^8, around 2059-05-25).
/// Identifiers made after that stop ordering by time.
pub const TIMESTAMP_SPAN: u64 = 36u64.pow(TIMESTAMP_LEN as u32);

/// Random suffix is drawn below this value (36^8).
pub const RANDOM_SPAN: u64 = 36u64.pow(RANDOM_LEN as u32);

/// Identifier（全システム共通の主キー）
///
/// 一度作られたら不変。等価性は文字列の完全一致。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

/// Identifier を分解した 5 つの構成要素
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierParts {
    pub prefix: char,
    pub timestamp: DateTime<Utc>,
    pub counter: u32,
    pub fingerprint: String,
    pub random: String,
}

impl Identifier {
    /// 固定長（prefix + 各セグメント）
    pub const LEN: usize = RANDOM_AT + RANDOM_LEN;

    /// プロセス共通の generator で新しい Identifier を作る
    pub fn create() -> Self {
        use crate::ports::IdGenerator;
        crate::ports::id_generator::global().generate()
    }

    /// 文字列を検証して Identifier に戻す
    pub fn parse(raw: &str) -> Result<Self, DecodeError> {
        let actual = raw.chars().count();
        if actual < Self::LEN {
            return Err(DecodeError::IdentifierTooShort {
                expected: Self::LEN,
                actual,
            });
        }
        if actual > Self::LEN {
            return Err(DecodeError::IdentifierTooLong {
                expected: Self::LEN,
                actual,
            });
        }

        // 長さ確認済みでも多バイト文字が混ざると byte offset がずれる
        let prefix = raw.chars().next().unwrap_or_default();
        if !prefix.is_ascii_lowercase() {
            return Err(DecodeError::IdentifierPrefix(prefix));
        }
        if !raw.is_ascii() {
            return Err(DecodeError::IdentifierSegment {
                segment: "body",
                value: raw[prefix.len_utf8()..].to_string(),
            });
        }

        let millis = decode_segment("timestamp", &raw[TIMESTAMP_AT..COUNTER_AT])?;
        if DateTime::<Utc>::from_timestamp_millis(millis as i64).is_none() {
            return Err(DecodeError::IdentifierTimestamp(millis));
        }
        decode_segment("counter", &raw[COUNTER_AT..FINGERPRINT_AT])?;
        decode_segment("fingerprint", &raw[FINGERPRINT_AT..RANDOM_AT])?;
        decode_segment("random", &raw[RANDOM_AT..])?;

        Ok(Self(raw.to_string()))
    }

    /// 構成要素から組み立てる（generator 用）
    ///
    /// counter は [`COUNTER_SPAN`] で、random は [`RANDOM_SPAN`] で丸められる。
    /// timestamp は [`TIMESTAMP_SPAN`] 未満に飽和させる（桁あふれで先頭が落ちないように）。
    pub(crate) fn assemble(
        prefix: char,
        timestamp: DateTime<Utc>,
        counter: u32,
        fingerprint: &str,
        random: u64,
    ) -> Self {
        let millis = (timestamp.timestamp_millis().max(0) as u64).min(TIMESTAMP_SPAN - 1);
        let mut s = String::with_capacity(Self::LEN);
        s.push(prefix);
        s.push_str(&encode_base36(millis, TIMESTAMP_LEN));
        s.push_str(&encode_base36(u64::from(counter % COUNTER_SPAN), COUNTER_LEN));
        s.push_str(&fingerprint[..FINGERPRINT_LEN]);
        s.push_str(&encode_base36(random % RANDOM_SPAN, RANDOM_LEN));
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn prefix(&self) -> char {
        self.0.as_bytes()[0] as char
    }

    /// 生成時刻（ミリ秒精度）
    pub fn timestamp(&self) -> DateTime<Utc> {
        let millis = decode_base36(&self.0[TIMESTAMP_AT..COUNTER_AT]).unwrap_or_default();
        DateTime::<Utc>::from_timestamp_millis(millis as i64).unwrap_or_default()
    }

    pub fn counter(&self) -> u32 {
        decode_base36(&self.0[COUNTER_AT..FINGERPRINT_AT]).unwrap_or_default() as u32
    }

    pub fn fingerprint(&self) -> &str {
        &self.0[FINGERPRINT_AT..RANDOM_AT]
    }

    pub fn random(&self) -> &str {
        &self.0[RANDOM_AT..]
    }

    pub fn parts(&self) -> IdentifierParts {
        IdentifierParts {
            prefix: self.prefix(),
            timestamp: self.timestamp(),
            counter: self.counter(),
            fingerprint: self.fingerprint().to_string(),
            random: self.random().to_string(),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identifier {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = DecodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// 小文字 base36、`width` 桁に 0 埋め（溢れた上位桁は切り捨て）
pub(crate) fn encode_base36(mut value: u64, width: usize) -> String {
    let mut digits = vec![b'0'; width];
    for slot in digits.iter_mut().rev() {
        let d = (value % BASE) as u8;
        *slot = if d < 10 { b'0' + d } else { b'a' + d - 10 };
        value /= BASE;
    }
    String::from_utf8(digits).unwrap_or_default()
}

pub(crate) fn decode_base36(s: &str) -> Option<u64> {
    if s.is_empty() {
        return None;
    }
    s.bytes().try_fold(0u64, |acc, b| {
        let d = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'z' => b - b'a' + 10,
            _ => return None,
        };
        acc.checked_mul(BASE)?.checked_add(u64::from(d))
    })
}

fn decode_segment(segment: &'static str, value: &str) -> Result<u64, DecodeError> {
    decode_base36(value).ok_or_else(|| DecodeError::IdentifierSegment {
        segment,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn sample() -> Identifier {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        Identifier::assemble('c', at, 42, "ab12", 123_456)
    }

    #[test]
    fn assembled_identifier_has_fixed_length() {
        let id = sample();
        assert_eq!(id.as_str().len(), Identifier::LEN);
        assert_eq!(Identifier::LEN, 25);
        assert!(id.as_str().starts_with('c'));
    }

    #[test]
    fn parse_recovers_every_component() {
        let id = Identifier::create();
        let back = Identifier::parse(&id.to_string()).unwrap();

        assert_eq!(back, id);
        assert_eq!(back.parts(), id.parts());
    }

    #[test]
    fn components_match_what_was_assembled() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap();
        let parts = sample().parts();
        assert_eq!(parts.prefix, 'c');
        assert_eq!(parts.timestamp, at);
        assert_eq!(parts.counter, 42);
        assert_eq!(parts.fingerprint, "ab12");
        assert_eq!(decode_base36(&parts.random), Some(123_456));
    }

    #[test]
    fn identifiers_sort_by_generation_time() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let late = early + chrono::Duration::milliseconds(1);
        // counter/random が大きくても timestamp が優先される
        let a = Identifier::assemble('c', early, COUNTER_SPAN - 1, "zzzz", RANDOM_SPAN - 1);
        let b = Identifier::assemble('c', late, 0, "0000", 0);

        assert_ne!(a.timestamp(), b.timestamp());
        assert!(a < b);
    }

    #[test]
    fn far_future_timestamps_saturate() {
        let near_limit = Utc.with_ymd_and_hms(2059, 1, 1, 0, 0, 0).unwrap();
        let far = Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap();
        let before = Identifier::assemble('c', near_limit, 0, "0000", 0);
        let after = Identifier::assemble('c', far, 0, "0000", 0);

        assert_eq!(after.as_str().len(), Identifier::LEN);
        assert_eq!(Identifier::parse(after.as_str()).unwrap(), after);
        assert!(before < after);
        assert_eq!(
            after.timestamp().timestamp_millis(),
            (TIMESTAMP_SPAN - 1) as i64
        );
    }

    #[rstest]
    #[case::empty("", 0)]
    #[case::truncated("clm4xk2q000a13f9z8k2m0q7", 24)]
    fn parse_rejects_short_input(#[case] raw: &str, #[case] actual: usize) {
        assert_eq!(
            Identifier::parse(raw),
            Err(DecodeError::IdentifierTooShort {
                expected: Identifier::LEN,
                actual
            })
        );
    }

    #[test]
    fn parse_rejects_long_input() {
        let raw = format!("{}x", sample());
        assert!(matches!(
            Identifier::parse(&raw),
            Err(DecodeError::IdentifierTooLong { actual: 26, .. })
        ));
    }

    #[rstest]
    #[case::upper_prefix("Clm4xk2q000a13f9z8k2m0q7d")]
    #[case::digit_prefix("1lm4xk2q000a13f9z8k2m0q7d")]
    fn parse_rejects_bad_prefix(#[case] raw: &str) {
        assert!(matches!(
            Identifier::parse(raw),
            Err(DecodeError::IdentifierPrefix(_))
        ));
    }

    #[test]
    fn parse_rejects_non_base36_timestamp() {
        let err = Identifier::parse("clm4x-2q000a13f9z8k2m0q7d").unwrap_err();
        assert_eq!(
            err,
            DecodeError::IdentifierSegment {
                segment: "timestamp",
                value: "lm4x-2q0".to_string()
            }
        );
    }

    #[test]
    fn parse_rejects_uppercase_random() {
        assert!(matches!(
            Identifier::parse("clm4xk2q000a13f9z8K2M0Q7D"),
            Err(DecodeError::IdentifierSegment {
                segment: "random",
                ..
            })
        ));
    }

    #[test]
    fn base36_pads_and_decodes() {
        assert_eq!(encode_base36(0, 4), "0000");
        assert_eq!(encode_base36(35, 2), "0z");
        assert_eq!(encode_base36(36, 2), "10");
        assert_eq!(decode_base36("10"), Some(36));
        assert_eq!(decode_base36("1_"), None);
        assert_eq!(decode_base36(""), None);
    }

    #[test]
    fn identifier_serializes_as_bare_string() {
        let id = sample();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));

        let back: Identifier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);

        assert!(serde_json::from_str::<Identifier>("\"short\"").is_err());
    }
}
