//! Key pool (§4.5, §3 "Provider pool / key pool entry"): tracks per-key
//! request/token budgets and short cooldowns after upstream rejects a key,
//! so the provider proxy can pick a usable key without a client ever
//! learning which one was used (`X-Selected-Key` never leaves the process).

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_config::KeyConfig;
use relay_core::security::key_id_for_secret;

/// A minute-bucketed counter: requests/tokens accrued in the current wall
/// clock minute, reset whenever a read observes a new minute has started.
struct MinuteBucket {
    minute: AtomicI64,
    count: AtomicU32,
}

impl MinuteBucket {
    fn new() -> Self {
        Self {
            minute: AtomicI64::new(current_minute()),
            count: AtomicU32::new(0),
        }
    }

    fn add(&self, amount: u32) -> u32 {
        let now = current_minute();
        if self.minute.swap(now, Ordering::SeqCst) != now {
            self.count.store(0, Ordering::SeqCst);
        }
        self.count.fetch_add(amount, Ordering::SeqCst) + amount
    }

    fn current(&self) -> u32 {
        let now = current_minute();
        if self.minute.load(Ordering::SeqCst) != now {
            0
        } else {
            self.count.load(Ordering::SeqCst)
        }
    }
}

fn current_minute() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| (d.as_secs() / 60) as i64)
        .unwrap_or(0)
}

pub struct PoolKey {
    pub key_id: String,
    pub secret: String,
    pub rpm_limit: Option<u32>,
    pub input_tpm_limit: Option<u32>,
    pub output_tpm_limit: Option<u32>,
    pub priority: u32,
    pub weight: u32,
    requests: MinuteBucket,
    input_tokens: MinuteBucket,
    output_tokens: MinuteBucket,
    cooldown_until: Mutex<Option<SystemTime>>,
    consecutive_failures: AtomicU32,
}

impl PoolKey {
    pub fn from_config(cfg: &KeyConfig) -> Self {
        Self {
            key_id: key_id_for_secret(&cfg.secret),
            secret: cfg.secret.clone(),
            rpm_limit: cfg.rpm,
            input_tpm_limit: cfg.input_tpm,
            output_tpm_limit: cfg.output_tpm,
            priority: cfg.priority.unwrap_or(0),
            weight: cfg.weight,
            requests: MinuteBucket::new(),
            input_tokens: MinuteBucket::new(),
            output_tokens: MinuteBucket::new(),
            cooldown_until: Mutex::new(None),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    /// Whether this key has headroom under its configured RPM/TPM limits and
    /// isn't in a post-failure cooldown.
    pub fn is_usable(&self) -> bool {
        if let Some(until) = *self.cooldown_until.lock() {
            if SystemTime::now() < until {
                return false;
            }
        }
        if let Some(limit) = self.rpm_limit {
            if self.requests.current() >= limit {
                return false;
            }
        }
        if let Some(limit) = self.input_tpm_limit {
            if self.input_tokens.current() >= limit {
                return false;
            }
        }
        if let Some(limit) = self.output_tpm_limit {
            if self.output_tokens.current() >= limit {
                return false;
            }
        }
        true
    }

    /// Records a request having been dispatched on this key, for RPM
    /// accounting. Called at dispatch time, before the response is known.
    pub fn record_request(&self) {
        self.requests.add(1);
    }

    /// Records usage parsed from a response body (§4.8 step 11) for TPM
    /// accounting.
    pub fn record_usage(&self, input_tokens: u32, output_tokens: u32) {
        self.input_tokens.add(input_tokens);
        self.output_tokens.add(output_tokens);
    }

    /// A request against this key succeeded; clears any failure streak.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }

    /// A request against this key failed with an auth or rate-limit error.
    /// Cooldown backs off exponentially with the failure streak, capped at
    /// five minutes.
    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        let backoff_secs = (2u64.saturating_pow(failures.min(8))).min(300);
        *self.cooldown_until.lock() = Some(SystemTime::now() + Duration::from_secs(backoff_secs));
    }

    /// Puts the key in cooldown for exactly `duration`, overriding whatever
    /// the exponential-backoff schedule would have picked. Used when the
    /// upstream itself hands back a `Retry-After` (§4.5 "MarkKeyExhausted"):
    /// the upstream's own number is authoritative over our guess.
    pub fn set_cooldown(&self, duration: Duration) {
        *self.cooldown_until.lock() = Some(SystemTime::now() + duration);
    }

    /// Seconds remaining until this key's cooldown clears, or `None` if it's
    /// usable right now.
    fn cooldown_remaining(&self) -> Option<Duration> {
        let until = (*self.cooldown_until.lock())?;
        let now = SystemTime::now();
        if until > now {
            Some(until.duration_since(now).unwrap_or(Duration::ZERO))
        } else {
            None
        }
    }
}

/// Selects a usable key from a provider's pool, hiding which one was chosen
/// from everything outside the provider proxy (§9 "internal header
/// hygiene"). Stateless beyond what each [`PoolKey`] itself tracks, so a
/// single instance is shared across requests.
#[async_trait]
pub trait KeyPool: Send + Sync {
    /// Returns `None` when every key is in cooldown or over its budget
    /// (distinct from an empty pool, which is a config error the caller
    /// should treat as "no providers").
    async fn acquire(&self) -> Option<&PoolKey>;

    /// Whether the pool has no keys configured at all (a provider that
    /// needs no credentials, e.g. a local Ollama instance).
    fn is_empty(&self) -> bool;

    /// Whether at least one key currently satisfies the selection
    /// predicate, without mutating the selection cursor. Used for router
    /// candidate health (§3 "Provider info (router candidate)").
    fn has_usable_key(&self) -> bool;

    /// Total configured keys, for the `X-CC-Relay-Keys-Total` response
    /// header (§4.8 step 8).
    fn total_keys(&self) -> usize;

    /// Keys currently usable (not in cooldown, under budget), for
    /// `X-CC-Relay-Keys-Available`.
    fn available_keys(&self) -> usize;

    /// Puts the named key in cooldown for `cooldown` (§4.5
    /// "MarkKeyExhausted"), e.g. after an upstream 429. A key id that
    /// doesn't match any key in this pool is silently ignored — the key may
    /// belong to a provider that was reconfigured out from under a
    /// still-in-flight request.
    fn mark_exhausted(&self, key_id: &str, cooldown: Duration);

    /// Clears the named key's failure streak after a non-429 response
    /// (§4.5 "UpdateKeyFromHeaders"), so a key that's been behaving doesn't
    /// carry forward an old exponential backoff.
    fn record_success(&self, key_id: &str);

    /// Time until the soonest key in this pool clears its cooldown, or
    /// `None` if at least one key is already usable. Feeds the `Retry-After`
    /// on `ErrAllKeysExhausted` (§4.5 "GetEarliestResetTime", §4.8 step 4).
    fn earliest_reset(&self) -> Option<Duration>;
}

pub struct InMemoryKeyPool {
    keys: Vec<PoolKey>,
    cursor: AtomicU32,
}

impl InMemoryKeyPool {
    pub fn new(configs: &[KeyConfig]) -> Self {
        Self {
            keys: configs.iter().map(PoolKey::from_config).collect(),
            cursor: AtomicU32::new(0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }
}

#[async_trait]
impl KeyPool for InMemoryKeyPool {
    async fn acquire(&self) -> Option<&PoolKey> {
        if self.keys.is_empty() {
            return None;
        }
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) as usize;
        (0..self.keys.len())
            .map(|offset| &self.keys[(start + offset) % self.keys.len()])
            .find(|k| k.is_usable())
    }

    fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn has_usable_key(&self) -> bool {
        self.keys.iter().any(|k| k.is_usable())
    }

    fn total_keys(&self) -> usize {
        self.keys.len()
    }

    fn available_keys(&self) -> usize {
        self.keys.iter().filter(|k| k.is_usable()).count()
    }

    fn mark_exhausted(&self, key_id: &str, cooldown: Duration) {
        if let Some(key) = self.keys.iter().find(|k| k.key_id == key_id) {
            key.set_cooldown(cooldown);
        }
    }

    fn record_success(&self, key_id: &str) {
        if let Some(key) = self.keys.iter().find(|k| k.key_id == key_id) {
            key.record_success();
        }
    }

    fn earliest_reset(&self) -> Option<Duration> {
        self.keys.iter().filter_map(|k| k.cooldown_remaining()).min()
    }
}
