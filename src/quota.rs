//! Quota gate: may a new conversion start, and when does usage reset?
//!
//! The account service reports `{ plan, conversions_used, conversions_limit,
//! reset_at }`. A limit of `0` means unlimited (the Pro plan). [`QuotaGate`]
//! wraps one such snapshot; the orchestrator consults [`QuotaGate::can_start`]
//! before every attempt and replaces the snapshot after each run.
//!
//! The reset countdown from [`time_until_reset`] is advisory text only and
//! never gates behaviour.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Conversion limit imposed on an account forced onto the Free plan by
/// [`crate::config::ClientConfig::plan_override`].
pub const OVERRIDE_FREE_LIMIT: u32 = 10;

const MINUTES_PER_HOUR: i64 = 60;
const MINUTES_PER_DAY: i64 = 24 * MINUTES_PER_HOUR;

/// Subscription tier of the signed-in account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlanTier {
    /// Quota-limited; single-file conversion only.
    #[default]
    Free,
    /// Unlimited; bulk-capable.
    Pro,
}

impl PlanTier {
    /// Lenient parse: case-insensitive, anything other than `PRO` is Free.
    pub fn from_str_lossy(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("pro") {
            PlanTier::Pro
        } else {
            PlanTier::Free
        }
    }

    pub fn is_pro(self) -> bool {
        self == PlanTier::Pro
    }

    /// Short label for status displays.
    pub fn label(self) -> &'static str {
        match self {
            PlanTier::Free => "Free trial",
            PlanTier::Pro => "Pro",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlanTier::Free => "FREE",
            PlanTier::Pro => "PRO",
        })
    }
}

impl FromStr for PlanTier {
    type Err = String;

    /// Strict parse used for configuration values.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FREE" => Ok(PlanTier::Free),
            "PRO" => Ok(PlanTier::Pro),
            other => Err(format!("unknown plan '{other}' (expected FREE or PRO)")),
        }
    }
}

impl<'de> Deserialize<'de> for PlanTier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(PlanTier::from_str_lossy).unwrap_or_default())
    }
}

/// Account usage as reported by the account service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccountSnapshot {
    #[serde(default)]
    pub plan: PlanTier,
    #[serde(default)]
    pub conversions_used: u32,
    /// `0` means unlimited.
    #[serde(default)]
    pub conversions_limit: u32,
    /// ISO-8601 instant at which `conversions_used` resets to zero.
    #[serde(default)]
    pub reset_at: Option<String>,
}

impl AccountSnapshot {
    /// Rewrite the snapshot as if the account were on `plan`.
    ///
    /// Pro becomes unlimited with zero usage; Free gets
    /// [`OVERRIDE_FREE_LIMIT`] and keeps its real usage count.
    pub fn with_plan_override(mut self, plan: Option<PlanTier>) -> Self {
        match plan {
            Some(PlanTier::Pro) => {
                self.plan = PlanTier::Pro;
                self.conversions_limit = 0;
                self.conversions_used = 0;
            }
            Some(PlanTier::Free) => {
                self.plan = PlanTier::Free;
                self.conversions_limit = OVERRIDE_FREE_LIMIT;
            }
            None => {}
        }
        self
    }
}

/// Decides whether a new conversion may start under the current plan.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct QuotaGate {
    plan: PlanTier,
    used: u32,
    limit: u32,
    reset_at: Option<String>,
}

impl QuotaGate {
    pub fn new(plan: PlanTier, used: u32, limit: u32, reset_at: Option<String>) -> Self {
        Self {
            plan,
            used,
            limit,
            reset_at,
        }
    }

    /// Gate built from an account snapshot with an optional plan override
    /// applied first.
    pub fn from_account(account: AccountSnapshot, plan_override: Option<PlanTier>) -> Self {
        let a = account.with_plan_override(plan_override);
        Self::new(a.plan, a.conversions_used, a.conversions_limit, a.reset_at)
    }

    /// An unlimited Pro gate with no usage.
    pub fn unlimited() -> Self {
        Self::new(PlanTier::Pro, 0, 0, None)
    }

    pub fn plan(&self) -> PlanTier {
        self.plan
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn reset_at(&self) -> Option<&str> {
        self.reset_at.as_deref()
    }

    /// `"Pro"` or `"Free trial"`.
    pub fn plan_label(&self) -> &'static str {
        self.plan.label()
    }

    pub fn is_unlimited(&self) -> bool {
        self.limit == 0
    }

    /// `true` when the plan is unlimited or usage is below the limit.
    pub fn can_start(&self) -> bool {
        self.is_unlimited() || self.used < self.limit
    }

    /// Conversions left before the limit; `None` when unlimited.
    pub fn remaining(&self) -> Option<u32> {
        (!self.is_unlimited()).then(|| self.limit.saturating_sub(self.used))
    }

    /// Usage as a percentage in `0.0..=100.0`; `0.0` when unlimited.
    pub fn usage_percent(&self) -> f64 {
        if self.is_unlimited() {
            return 0.0;
        }
        (f64::from(self.used) / f64::from(self.limit) * 100.0).min(100.0)
    }

    /// `"used/limit"`, or `"∞"` when unlimited.
    pub fn usage_label(&self) -> String {
        if self.is_unlimited() {
            "∞".to_string()
        } else {
            format!("{}/{}", self.used, self.limit)
        }
    }

    /// Time until usage resets, relative to `now`. See [`time_until_reset`].
    pub fn time_until_reset(&self, now: DateTime<Utc>) -> String {
        time_until_reset(self.reset_at.as_deref(), now)
    }
}

/// Render the time from `now` until `reset_at` as at most two units.
///
/// The difference is clamped at zero and rounded *up* to whole minutes,
/// then shown as `"{d}d {h}h"`, `"{h}h {m}m"` or `"{m}m"` depending on the
/// first nonzero unit. Returns `""` when `reset_at` is absent or unparsable.
///
/// # Example
/// ```rust
/// use chrono::{TimeZone, Utc};
/// use tabularis::quota::time_until_reset;
///
/// let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
/// assert_eq!(time_until_reset(Some("2026-01-01T03:10:00Z"), now), "3h 10m");
/// assert_eq!(time_until_reset(None, now), "");
/// ```
pub fn time_until_reset(reset_at: Option<&str>, now: DateTime<Utc>) -> String {
    let Some(reset) = reset_at.and_then(parse_timestamp) else {
        return String::new();
    };

    let diff_ms = (reset - now).num_milliseconds().max(0);
    let minutes = (diff_ms + 59_999) / 60_000;

    let days = minutes / MINUTES_PER_DAY;
    let hours = (minutes % MINUTES_PER_DAY) / MINUTES_PER_HOUR;
    let mins = minutes % MINUTES_PER_HOUR;

    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {mins}m")
    } else {
        format!("{mins}m")
    }
}

/// Accept RFC 3339 (with offset) or a bare `YYYY-MM-DDTHH:MM:SS[.fff]`,
/// which is taken as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn in_minutes(m: i64) -> String {
        (now() + Duration::minutes(m)).to_rfc3339()
    }

    #[test]
    fn can_start_respects_limit() {
        assert!(!QuotaGate::new(PlanTier::Free, 10, 10, None).can_start());
        assert!(QuotaGate::new(PlanTier::Free, 9, 10, None).can_start());
        assert!(!QuotaGate::new(PlanTier::Free, 12, 10, None).can_start());
    }

    #[test]
    fn zero_limit_is_unlimited() {
        let gate = QuotaGate::new(PlanTier::Pro, 0, 0, None);
        assert!(gate.can_start());
        assert_eq!(gate.remaining(), None);
        assert_eq!(gate.usage_label(), "∞");
        assert_eq!(gate.usage_percent(), 0.0);
        // Usage never blocks an unlimited plan.
        assert!(QuotaGate::new(PlanTier::Pro, 500, 0, None).can_start());
    }

    #[test]
    fn usage_display() {
        let gate = QuotaGate::new(PlanTier::Free, 3, 10, None);
        assert_eq!(gate.usage_label(), "3/10");
        assert_eq!(gate.remaining(), Some(7));
        assert!((gate.usage_percent() - 30.0).abs() < f64::EPSILON);
        let over = QuotaGate::new(PlanTier::Free, 15, 10, None);
        assert_eq!(over.usage_percent(), 100.0);
        assert_eq!(over.remaining(), Some(0));
    }

    #[test]
    fn reset_at_instant_is_zero_minutes() {
        assert_eq!(time_until_reset(Some(&in_minutes(0)), now()), "0m");
    }

    #[test]
    fn reset_in_past_clamps_to_zero() {
        assert_eq!(time_until_reset(Some(&in_minutes(-90)), now()), "0m");
    }

    #[test]
    fn reset_day_boundary() {
        assert_eq!(time_until_reset(Some(&in_minutes(1439)), now()), "23h 59m");
        assert_eq!(time_until_reset(Some(&in_minutes(1440)), now()), "1d 0h");
        assert_eq!(
            time_until_reset(Some(&in_minutes(2 * 1440 + 5 * 60 + 59)), now()),
            "2d 5h"
        );
    }

    #[test]
    fn reset_minutes_and_hours() {
        assert_eq!(time_until_reset(Some(&in_minutes(14)), now()), "14m");
        assert_eq!(time_until_reset(Some(&in_minutes(60)), now()), "1h 0m");
        assert_eq!(time_until_reset(Some(&in_minutes(190)), now()), "3h 10m");
    }

    #[test]
    fn partial_minutes_round_up() {
        let reset = (now() + Duration::seconds(61)).to_rfc3339();
        assert_eq!(time_until_reset(Some(&reset), now()), "2m");
        let reset = (now() + Duration::milliseconds(1)).to_rfc3339();
        assert_eq!(time_until_reset(Some(&reset), now()), "1m");
    }

    #[test]
    fn reset_absent_or_garbage_is_empty() {
        assert_eq!(time_until_reset(None, now()), "");
        assert_eq!(time_until_reset(Some("next tuesday"), now()), "");
        assert_eq!(time_until_reset(Some(""), now()), "");
    }

    #[test]
    fn reset_accepts_naive_and_offset_timestamps() {
        assert_eq!(
            time_until_reset(Some("2026-03-01T12:30:00"), now()),
            "30m"
        );
        assert_eq!(
            time_until_reset(Some("2026-03-01T14:30:00.123456+02:00"), now()),
            "31m"
        );
    }

    #[test]
    fn plan_parsing_is_lenient() {
        let a: AccountSnapshot = serde_json::from_str(
            r#"{"plan":"pro","conversions_used":0,"conversions_limit":0,"reset_at":null}"#,
        )
        .unwrap();
        assert_eq!(a.plan, PlanTier::Pro);
        let a: AccountSnapshot =
            serde_json::from_str(r#"{"plan":"enterprise","conversions_used":2}"#).unwrap();
        assert_eq!(a.plan, PlanTier::Free);
        assert_eq!(a.conversions_limit, 0);
        let a: AccountSnapshot = serde_json::from_str(r#"{"plan":null}"#).unwrap();
        assert_eq!(a.plan, PlanTier::Free);
    }

    #[test]
    fn strict_plan_from_str() {
        assert_eq!("pro".parse::<PlanTier>(), Ok(PlanTier::Pro));
        assert_eq!(" FREE ".parse::<PlanTier>(), Ok(PlanTier::Free));
        assert!("gold".parse::<PlanTier>().is_err());
    }

    #[test]
    fn pro_override_unlocks() {
        let account = AccountSnapshot {
            plan: PlanTier::Free,
            conversions_used: 10,
            conversions_limit: 10,
            reset_at: None,
        };
        let gate = QuotaGate::from_account(account, Some(PlanTier::Pro));
        assert_eq!(gate.plan(), PlanTier::Pro);
        assert!(gate.can_start());
        assert_eq!(gate.used(), 0);
    }

    #[test]
    fn free_override_keeps_usage() {
        let account = AccountSnapshot {
            plan: PlanTier::Pro,
            conversions_used: 4,
            conversions_limit: 0,
            reset_at: None,
        };
        let gate = QuotaGate::from_account(account, Some(PlanTier::Free));
        assert_eq!(gate.plan(), PlanTier::Free);
        assert_eq!(gate.limit(), OVERRIDE_FREE_LIMIT);
        assert_eq!(gate.used(), 4);
    }

    #[test]
    fn no_override_is_identity() {
        let account = AccountSnapshot {
            plan: PlanTier::Free,
            conversions_used: 1,
            conversions_limit: 5,
            reset_at: Some("2026-03-02T00:00:00Z".into()),
        };
        let gate = QuotaGate::from_account(account.clone(), None);
        assert_eq!(gate.limit(), 5);
        assert_eq!(gate.reset_at(), account.reset_at.as_deref());
    }
}
