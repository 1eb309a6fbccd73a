use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteStatus {
    Pending,
    Approved,
    Denied,
    Expired,
    /// Any status written by another system that this service doesn't know.
    Other(String),
}

impl InviteStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Expired => "expired",
            Self::Other(s) => s,
        }
    }

    /// Whether an invite in this status may still be honoured at the gate.
    pub fn is_honored(&self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }
}

impl From<String> for InviteStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => Self::Pending,
            "approved" => Self::Approved,
            "denied" => Self::Denied,
            "expired" => Self::Expired,
            _ => Self::Other(s),
        }
    }
}

impl fmt::Display for InviteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw `invites` row. Rows come from an external writer, so every payload
/// column may be NULL; [`Invite`] is the checked form.
#[derive(Debug, Clone, FromRow)]
pub struct InviteRow {
    pub id: String,
    pub status: Option<String>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub guest_name: Option<String>,
    pub guest_phone: Option<String>,
    pub kind: Option<String>,
    pub resident_uid: Option<String>,
}

impl InviteRow {
    /// Matches rows the sweeper reclaims: still pending, window closed before `now`.
    pub fn is_stale_pending(&self, now: DateTime<Utc>) -> bool {
        self.status.as_deref() == Some(InviteStatus::Pending.as_str())
            && self.valid_until.is_some_and(|until| until < now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invite {
    pub id: String,
    pub status: InviteStatus,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub guest_name: String,
    pub guest_phone: String,
    pub kind: String,
    pub resident_uid: String,
}

impl Invite {
    /// Inclusive on both ends. An inverted window never contains `now`.
    pub fn is_within_window(&self, now: DateTime<Utc>) -> bool {
        self.valid_from <= now && now <= self.valid_until
    }

    pub fn has_inverted_window(&self) -> bool {
        self.valid_from > self.valid_until
    }

    pub fn into_guest_pass(self) -> GuestPass {
        GuestPass {
            guest_name: self.guest_name,
            guest_phone: self.guest_phone,
            kind: self.kind,
            resident_uid: self.resident_uid,
        }
    }
}

fn required<T>(value: Option<T>, id: &str, field: &str) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::Internal(format!("invite {id} is missing {field}")))
}

impl TryFrom<InviteRow> for Invite {
    type Error = AppError;

    fn try_from(row: InviteRow) -> Result<Self, Self::Error> {
        let id = row.id;
        Ok(Self {
            status: required(row.status, &id, "status")?.into(),
            valid_from: required(row.valid_from, &id, "valid_from")?,
            valid_until: required(row.valid_until, &id, "valid_until")?,
            guest_name: required(row.guest_name, &id, "guest_name")?,
            guest_phone: required(row.guest_phone, &id, "guest_phone")?,
            kind: required(row.kind, &id, "type")?,
            resident_uid: required(row.resident_uid, &id, "resident_uid")?,
            id,
        })
    }
}

/// The only invite fields a guard ever gets to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestPass {
    pub guest_name: String,
    pub guest_phone: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub resident_uid: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VerdictStatus {
    Denied,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub status: VerdictStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<GuestPass>,
}

impl Verdict {
    pub fn denied(message: impl Into<String>) -> Self {
        Self {
            status: VerdictStatus::Denied,
            message: message.into(),
            data: None,
        }
    }

    pub fn success(pass: GuestPass) -> Self {
        Self {
            status: VerdictStatus::Success,
            message: "Invite verified".to_string(),
            data: Some(pass),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateInviteRequest {
    pub invite_id: Option<String>,
}

#[cfg(test)]
impl InviteRow {
    pub fn sample(
        id: &str,
        status: &str,
        valid_from: DateTime<Utc>,
        valid_until: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.to_string(),
            status: Some(status.to_string()),
            valid_from: Some(valid_from),
            valid_until: Some(valid_until),
            guest_name: Some("Ana".to_string()),
            guest_phone: Some("+351 912 345 678".to_string()),
            kind: Some("visitor".to_string()),
            resident_uid: Some("resident-42".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn window_is_inclusive_on_both_ends() {
        let invite = Invite::try_from(InviteRow::sample(
            "a",
            "pending",
            t0(),
            t0() + Duration::hours(1),
        ))
        .unwrap();

        assert!(invite.is_within_window(t0()));
        assert!(invite.is_within_window(t0() + Duration::hours(1)));
        assert!(!invite.is_within_window(t0() - Duration::milliseconds(1)));
        assert!(!invite.is_within_window(t0() + Duration::hours(1) + Duration::milliseconds(1)));
    }

    #[test]
    fn inverted_window_contains_nothing() {
        let invite = Invite::try_from(InviteRow::sample(
            "a",
            "pending",
            t0() + Duration::hours(1),
            t0(),
        ))
        .unwrap();

        assert!(invite.has_inverted_window());
        assert!(!invite.is_within_window(t0()));
        assert!(!invite.is_within_window(t0() + Duration::minutes(30)));
    }

    #[test]
    fn only_pending_and_approved_are_honored() {
        for s in ["pending", "approved"] {
            assert!(InviteStatus::from(s.to_string()).is_honored(), "{s}");
        }
        for s in ["denied", "expired", "revoked", ""] {
            assert!(!InviteStatus::from(s.to_string()).is_honored(), "{s}");
        }
        assert_eq!(InviteStatus::from("revoked".to_string()).to_string(), "revoked");
    }

    #[test]
    fn missing_required_field_is_internal() {
        let mut row = InviteRow::sample("broken", "pending", t0(), t0());
        row.guest_name = None;

        let err = Invite::try_from(row).unwrap_err();
        assert_eq!(err.kind(), "internal");
        assert!(err.to_string().contains("guest_name"));
    }

    #[test]
    fn stale_pending_needs_both_status_and_closed_window() {
        let now = t0();
        let past = now - Duration::minutes(1);
        let future = now + Duration::minutes(1);

        assert!(InviteRow::sample("a", "pending", past, past).is_stale_pending(now));
        assert!(!InviteRow::sample("b", "pending", past, future).is_stale_pending(now));
        assert!(!InviteRow::sample("c", "approved", past, past).is_stale_pending(now));
        assert!(!InviteRow::sample("d", "pending", past, now).is_stale_pending(now));
    }

    #[test]
    fn success_verdict_serializes_only_guest_fields() {
        let pass = Invite::try_from(InviteRow::sample("x", "approved", t0(), t0()))
            .unwrap()
            .into_guest_pass();
        let json = serde_json::to_value(Verdict::success(pass)).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "status": "Success",
                "message": "Invite verified",
                "data": {
                    "guestName": "Ana",
                    "guestPhone": "+351 912 345 678",
                    "type": "visitor",
                    "residentUid": "resident-42"
                }
            })
        );
    }

    #[test]
    fn denied_verdict_omits_data() {
        let json = serde_json::to_value(Verdict::denied("Invite not found")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "status": "Denied", "message": "Invite not found" })
        );
    }
}
