//! IdGenerator port - ID 生成の抽象化
//!
//! IdGenerator は中央の調整なしで使える Identifier を生成するための
//! インターフェースです。テスト容易性のために trait として抽象化しています。
//!
//! # 実装
//! - **CuidGenerator**: timestamp + counter + fingerprint + random（本番用）

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, Ordering};

use rand::Rng;

use crate::domain::ids::{COUNTER_SPAN, DEFAULT_PREFIX, RANDOM_SPAN, encode_base36};
use crate::domain::Identifier;
use crate::ports::{Clock, SystemClock};

/// IdGenerator は Identifier を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数スレッドから使える）
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> Identifier;
}

/// CuidGenerator は Clock を使って現在時刻ベースの Identifier を生成します。
///
/// テスト時に ManualClock を使えば timestamp 部分を固定できます
/// （counter と random があるので ID 自体は毎回異なる）。
pub struct CuidGenerator<C> {
    clock: C,
    prefix: char,
    counter: AtomicU32,
    fingerprint: String,
}

impl<C: Clock> CuidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self::with_prefix(clock, DEFAULT_PREFIX)
    }

    /// prefix は小文字 ascii 以外なら既定値に戻す
    pub fn with_prefix(clock: C, prefix: char) -> Self {
        let prefix = if prefix.is_ascii_lowercase() {
            prefix
        } else {
            tracing::warn!(%prefix, "identifier prefix must be a lowercase ascii letter, using default");
            DEFAULT_PREFIX
        };
        Self {
            clock,
            prefix,
            counter: AtomicU32::new(rand::thread_rng().gen_range(0..COUNTER_SPAN)),
            fingerprint: process_fingerprint(),
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

impl<C: Clock> IdGenerator for CuidGenerator<C> {
    fn generate(&self) -> Identifier {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed) % COUNTER_SPAN;
        let random = rand::thread_rng().gen_range(0..RANDOM_SPAN);
        Identifier::assemble(self.prefix, self.clock.now(), counter, &self.fingerprint, random)
    }
}

/// プロセス共通の generator（`Identifier::create()` が使う）
pub fn global() -> &'static CuidGenerator<SystemClock> {
    static GLOBAL: OnceLock<CuidGenerator<SystemClock>> = OnceLock::new();
    GLOBAL.get_or_init(|| CuidGenerator::new(SystemClock))
}

/// pid 由来 2 桁 + ホスト名由来 2 桁
fn process_fingerprint() -> String {
    let pid = u64::from(std::process::id());
    let host = std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "localhost".to_string());
    let host_sum = host
        .bytes()
        .fold(host.len() as u64 + 36, |acc, b| acc.wrapping_add(u64::from(b)));
    format!("{}{}", encode_base36(pid, 2), encode_base36(host_sum, 2))
}
