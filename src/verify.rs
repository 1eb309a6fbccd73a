use crate::auth::middleware::AuthUser;
use crate::clock::Clock;
use crate::error::AppError;
use crate::models::invite::Verdict;
use crate::store::InviteStore;

pub const NOT_FOUND: &str = "Invite not found";
pub const OUTSIDE_WINDOW: &str = "Invite is outside of validity window (expired or not yet active)";

/// Checks one invite for a guard at the gate.
///
/// Checks run in a fixed order and the first failure wins: caller present,
/// invite id present, record exists, `now` inside the window, status still
/// honoured. Missing records, closed windows and wrong statuses are denials,
/// not errors. Store failures come back as `Err` and are reported to the
/// caller as an opaque internal error.
pub async fn validate_invite(
    store: &InviteStore,
    clock: &Clock,
    caller: Option<&AuthUser>,
    invite_id: Option<&str>,
) -> Result<Verdict, AppError> {
    let caller = caller.ok_or(AppError::Unauthenticated)?;

    let invite_id = invite_id.filter(|id| !id.is_empty()).ok_or_else(|| {
        AppError::InvalidArgument("The function must be called with an inviteId.".into())
    })?;

    let Some(invite) = store.get(invite_id).await? else {
        tracing::debug!(caller = %caller.subject, invite_id, "invite not found");
        return Ok(Verdict::denied(NOT_FOUND));
    };

    let now = clock.now();
    if !invite.is_within_window(now) {
        if invite.has_inverted_window() {
            tracing::warn!(invite_id, "invite has valid_from after valid_until");
        }
        tracing::debug!(caller = %caller.subject, invite_id, "invite outside validity window");
        return Ok(Verdict::denied(OUTSIDE_WINDOW));
    }

    if !invite.status.is_honored() {
        tracing::debug!(caller = %caller.subject, invite_id, status = %invite.status, "invite no longer valid");
        return Ok(Verdict::denied(format!(
            "Invite is no longer valid (Status: {})",
            invite.status
        )));
    }

    tracing::debug!(caller = %caller.subject, invite_id, "invite verified");
    Ok(Verdict::success(invite.into_guest_pass()))
}
