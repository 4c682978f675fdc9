//! Handling for events that match no onboarding transition.

use super::table::ABANDONMENT_DAYS;
use super::{User, UserEvent, UserStatus};
use crate::core::{Event, Payload, Status};
use crate::engine::Fallback;
use async_trait::async_trait;
use tracing::{debug, info};

/// Marks users who stalled in onboarding as inactive.
///
/// Any unmatched event on a user registered more than `max_idle_days` ago
/// who is neither active nor already final moves them to `inactive`. The
/// engine persists the change.
#[derive(Clone, Copy, Debug)]
pub struct AbandonmentFallback {
    pub max_idle_days: i64,
}

impl Default for AbandonmentFallback {
    fn default() -> Self {
        Self {
            max_idle_days: ABANDONMENT_DAYS,
        }
    }
}

impl AbandonmentFallback {
    fn abandoned(&self, user: &User) -> bool {
        user.status != UserStatus::Active
            && !user.status.is_final()
            && user.days_since_registration() > self.max_idle_days
    }
}

#[async_trait]
impl Fallback<User> for AbandonmentFallback {
    async fn on_unmatched(&self, mut user: User, event: &UserEvent, _payload: &Payload) -> User {
        if !self.abandoned(&user) {
            debug!(urn = %user.urn, event = event.name(), status = user.status.name(), "event ignored");
            return user;
        }
        info!(
            urn = %user.urn,
            event = event.name(),
            status = user.status.name(),
            "marking abandoned user inactive"
        );
        user.inactive_reason = Some(format!(
            "no onboarding progress for {} days",
            user.days_since_registration()
        ));
        user.status = UserStatus::Inactive;
        user
    }
}
