//! User onboarding transition table.

use super::keys;
use super::{User, UserEvent, UserStatus};
use crate::core::Payload;
use crate::table::{BuildError, TableBuilder, TransitionBuilder, TransitionTable};

/// Days without completing onboarding before a user counts as abandoned.
pub const ABANDONMENT_DAYS: i64 = 30;

fn token_matches(user: &User, payload: &Payload) -> bool {
    match (user.verification.email_token.as_deref(), payload.str(keys::TOKEN)) {
        (Some(expected), Some(given)) => expected == given,
        _ => false,
    }
}

fn profile_incomplete(user: &User, payload: &Payload) -> bool {
    user.completeness_with(payload) < 100
}

fn profile_complete(user: &User, payload: &Payload) -> bool {
    user.completeness_with(payload) >= 100
}

pub fn user_table() -> Result<TransitionTable<User>, BuildError> {
    use UserStatus::*;

    TableBuilder::<User>::new()
        .initial(Registered)
        .transition(
            TransitionBuilder::new()
                .from(Registered)
                .on(UserEvent::Register)
                .to(Registered),
        )?
        .transition(
            TransitionBuilder::new()
                .from(Registered)
                .on(UserEvent::VerifyEmail)
                .to(EmailVerified)
                .when("token matches", token_matches),
        )?
        // profile
        .transition(
            TransitionBuilder::new()
                .from_any([EmailVerified, ProfileIncomplete])
                .on(UserEvent::UpdateProfile)
                .to(ProfileIncomplete)
                .when("profile incomplete", profile_incomplete),
        )?
        .transition(
            TransitionBuilder::new()
                .from_any([EmailVerified, ProfileIncomplete])
                .on(UserEvent::UpdateProfile)
                .to(ProfileComplete)
                .when("profile complete", profile_complete),
        )?
        .transition(
            TransitionBuilder::new()
                .from(ProfileIncomplete)
                .on(UserEvent::CompleteProfile)
                .to(ProfileComplete)
                .when("profile complete", profile_complete),
        )?
        // identity
        .transition(
            TransitionBuilder::new()
                .from(ProfileComplete)
                .on(UserEvent::StartIdentityVerification)
                .to(IdentityVerificationPending),
        )?
        .transition(
            TransitionBuilder::new()
                .from(IdentityVerificationPending)
                .on(UserEvent::CompleteIdentityVerification)
                .to(IdentityVerified)
                .when("verification completed", |_: &User, payload: &Payload| {
                    payload.str(keys::VERIFICATION_STATUS) == Some("completed")
                }),
        )?
        .transition(
            TransitionBuilder::new()
                .from(IdentityVerificationPending)
                .on(UserEvent::FailIdentityVerification)
                .to(Suspended),
        )?
        // activation
        .transition(
            TransitionBuilder::new()
                .from(IdentityVerified)
                .on(UserEvent::Activate)
                .to(Active)
                .when("not high risk", |user: &User, _| !user.is_high_risk()),
        )?
        .transition(
            TransitionBuilder::new()
                .from(IdentityVerified)
                .on(UserEvent::Suspend)
                .to(Suspended)
                .when("high risk", |user: &User, _| user.is_high_risk()),
        )?
        .transition(
            TransitionBuilder::new()
                .from(Active)
                .on(UserEvent::Suspend)
                .to(Suspended),
        )?
        .transition(
            TransitionBuilder::new()
                .from(Suspended)
                .on(UserEvent::Reactivate)
                .to(Active),
        )?
        // abandonment
        .transition(
            TransitionBuilder::new()
                .from_any([Registered, EmailVerified, ProfileIncomplete, ProfileComplete])
                .on(UserEvent::MarkInactive)
                .to(Inactive)
                .when("onboarding abandoned", |user: &User, _| {
                    user.days_since_registration() > ABANDONMENT_DAYS
                }),
        )?
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::user::{Preferences, RiskAssessment};
    use chrono::{Duration, Utc};

    fn user_in(status: UserStatus) -> User {
        let mut user = User::new("urn:user:t");
        user.status = status;
        user
    }

    fn target(user: &User, event: UserEvent, payload: &Payload) -> Option<UserStatus> {
        user_table()
            .unwrap()
            .match_transition(&user.status, &event, user, payload)
            .map(|t| t.to)
    }

    #[test]
    fn email_verification_needs_the_issued_token() {
        let user = user_in(UserStatus::Registered);
        let token = user.verification.email_token.clone().unwrap();

        assert_eq!(
            target(&user, UserEvent::VerifyEmail, &Payload::new().with(keys::TOKEN, "nope")),
            None
        );
        assert_eq!(
            target(&user, UserEvent::VerifyEmail, &Payload::new().with(keys::TOKEN, token)),
            Some(UserStatus::EmailVerified)
        );
    }

    #[test]
    fn profile_updates_route_on_predicted_completeness() {
        let user = user_in(UserStatus::EmailVerified);
        let partial = Payload::new().with(keys::FIRST_NAME, "Ana");
        assert_eq!(
            target(&user, UserEvent::UpdateProfile, &partial),
            Some(UserStatus::ProfileIncomplete)
        );

        let mut almost = user_in(UserStatus::ProfileIncomplete);
        almost.profile.first_name = Some("Ana".into());
        almost.profile.last_name = Some("Silva".into());
        almost.profile.date_of_birth = chrono::NaiveDate::from_ymd_opt(1990, 1, 1);
        almost.profile.phone_number = Some("+1".into());
        almost.profile.occupation = Some("Engineer".into());
        almost.profile.company = Some("Acme".into());
        almost.profile.bio = Some("Hi".into());
        almost.profile.preferences = Some(Preferences {
            language: "en".into(),
            timezone: "UTC".into(),
            newsletter: false,
            notifications: true,
        });
        let address = Payload::new().with(
            keys::ADDRESS,
            serde_json::json!({"street": "1 Main St"}),
        );
        assert_eq!(
            target(&almost, UserEvent::UpdateProfile, &address),
            Some(UserStatus::ProfileComplete)
        );
        assert_eq!(target(&almost, UserEvent::CompleteProfile, &Payload::new()), None);
    }

    #[test]
    fn identity_completion_checks_reported_status() {
        let user = user_in(UserStatus::IdentityVerificationPending);
        let failed = Payload::new().with(keys::VERIFICATION_STATUS, "failed");
        let passed = Payload::new().with(keys::VERIFICATION_STATUS, "completed");

        assert_eq!(target(&user, UserEvent::CompleteIdentityVerification, &failed), None);
        assert_eq!(
            target(&user, UserEvent::CompleteIdentityVerification, &passed),
            Some(UserStatus::IdentityVerified)
        );
    }

    #[test]
    fn high_risk_users_cannot_activate() {
        let mut user = user_in(UserStatus::IdentityVerified);
        user.risk = Some(RiskAssessment::new(90, vec![], false));

        assert_eq!(target(&user, UserEvent::Activate, &Payload::new()), None);
        assert_eq!(
            target(&user, UserEvent::Suspend, &Payload::new()),
            Some(UserStatus::Suspended)
        );
    }

    #[test]
    fn abandonment_needs_thirty_days() {
        let mut user = user_in(UserStatus::ProfileIncomplete);
        assert_eq!(target(&user, UserEvent::MarkInactive, &Payload::new()), None);

        user.registered_at = Utc::now() - Duration::days(31);
        assert_eq!(
            target(&user, UserEvent::MarkInactive, &Payload::new()),
            Some(UserStatus::Inactive)
        );
    }

    #[test]
    fn active_and_suspended_users_keep_their_exits() {
        let table = user_table().unwrap();
        assert!(table.accepts(&UserStatus::Active, &UserEvent::Suspend));
        assert!(table.accepts(&UserStatus::Suspended, &UserEvent::Reactivate));
        assert!(table.events_from(&UserStatus::Inactive).is_empty());
    }
}
