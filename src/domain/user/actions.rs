//! User onboarding actions.

use super::keys;
use super::{IdentityStatus, RiskAssessment, User, UserEvent, UserStatus};
use crate::actions::{ActionError, ActionHandler, ActionRegistry, FnAction};
use crate::collaborators::{Notification, NotificationSender};
use crate::core::{Payload, Status};
use crate::enforcement::CallPolicy;
use async_trait::async_trait;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct UserServices {
    pub notifications: Arc<dyn NotificationSender>,
    pub policy: CallPolicy,
}

impl fmt::Debug for UserServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserServices")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

async fn send(services: &UserServices, notification: Notification) -> bool {
    let notifications = &services.notifications;
    let notification = &notification;
    match services
        .policy
        .run("notifications.send", move || notifications.send(notification))
        .await
    {
        Ok(()) => true,
        Err(error) => {
            warn!(recipient = %notification.recipient, template = %notification.template, %error, "notification not sent");
            false
        }
    }
}

/// Sends the welcome email carrying the verification token. Marks
/// `welcome_email_sent` only when delivery succeeds.
pub struct SendWelcome {
    services: UserServices,
}

impl SendWelcome {
    pub const NAME: &'static str = "send_welcome";

    pub fn new(services: UserServices) -> Self {
        Self { services }
    }
}

#[async_trait]
impl ActionHandler<User> for SendWelcome {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn handle(&self, mut user: User, _payload: &Payload) -> Result<User, ActionError> {
        if user.welcome_email_sent {
            return Ok(user);
        }
        let mut data = Payload::new().with("username", user.username.clone());
        if let Some(token) = &user.verification.email_token {
            data.insert("token", token.clone());
        }
        let notification = Notification {
            recipient: user.email.clone(),
            template: "user.welcome".to_string(),
            data,
        };
        user.welcome_email_sent = send(&self.services, notification).await;
        Ok(user)
    }
}

/// Best-effort templated notification to the user.
pub struct UserNotify {
    services: UserServices,
    template: String,
}

impl UserNotify {
    pub fn new(services: UserServices, template: impl Into<String>) -> Self {
        Self {
            services,
            template: template.into(),
        }
    }
}

#[async_trait]
impl ActionHandler<User> for UserNotify {
    fn name(&self) -> &str {
        &self.template
    }

    async fn handle(&self, user: User, _payload: &Payload) -> Result<User, ActionError> {
        let notification = Notification {
            recipient: user.email.clone(),
            template: self.template.clone(),
            data: Payload::new()
                .with("username", user.username.clone())
                .with("status", user.status.name()),
        };
        send(&self.services, notification).await;
        Ok(user)
    }
}

fn verify_email(user: &mut User, _payload: &Payload) -> Result<(), ActionError> {
    user.verification.email_verified = true;
    user.verification.email_verified_at = Some(Utc::now());
    user.verification.email_token = None;
    user.touch();
    Ok(())
}

fn update_profile(user: &mut User, payload: &Payload) -> Result<(), ActionError> {
    let before = user.profile_completeness;
    user.profile
        .apply(payload)
        .map_err(|reason| ActionError::rejected("update_profile", reason))?;
    user.profile_completeness = user.profile.completeness();
    user.touch();
    if user.profile_completeness > before {
        info!(
            urn = %user.urn,
            before,
            after = user.profile_completeness,
            "profile progress"
        );
    }
    Ok(())
}

fn complete_profile(user: &mut User, payload: &Payload) -> Result<(), ActionError> {
    update_profile(user, payload)?;
    if user.profile.phone_number.is_some() && !user.verification.phone_verified {
        user.verification.phone_verified = true;
        user.verification.phone_verified_at = Some(Utc::now());
    }
    Ok(())
}

fn start_identity_verification(user: &mut User, payload: &Payload) -> Result<(), ActionError> {
    let session = payload
        .str(keys::VERIFICATION_ID)
        .map(str::to_string)
        .unwrap_or_else(|| format!("IDV-{}", Uuid::new_v4().simple()));
    let documents = payload
        .get(keys::DOCUMENTS)
        .and_then(|v| v.as_array())
        .map(|docs| {
            docs.iter()
                .filter_map(|d| d.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    user.verification.identity_verification_id = Some(session);
    user.verification.identity_status = Some(IdentityStatus::Pending);
    user.verification.documents = documents;
    user.touch();
    Ok(())
}

/// Record the verification result and the risk assessment reported with
/// it. A missing score counts as no risk.
fn complete_identity_verification(user: &mut User, payload: &Payload) -> Result<(), ActionError> {
    let score = payload
        .u64(keys::RISK_SCORE)
        .map_or(0, |s| u8::try_from(s.min(100)).unwrap_or(100));
    let factors = payload
        .get(keys::RISK_FACTORS)
        .and_then(|v| v.as_array())
        .map(|fs| {
            fs.iter()
                .filter_map(|f| f.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let manual_review = payload.bool(keys::MANUAL_REVIEW).unwrap_or(false);
    let risk = RiskAssessment::new(score, factors, manual_review);

    user.verification.identity_status = Some(if manual_review {
        IdentityStatus::ManualReview
    } else {
        IdentityStatus::Completed
    });
    user.verification.identity_completed_at = Some(Utc::now());
    info!(urn = %user.urn, score = risk.score, level = ?risk.level, "risk assessed");
    user.risk = Some(risk);
    user.touch();
    Ok(())
}

fn fail_identity_verification(user: &mut User, payload: &Payload) -> Result<(), ActionError> {
    user.verification.identity_status = Some(IdentityStatus::Failed);
    warn!(
        urn = %user.urn,
        reason = payload.str(keys::REASON).unwrap_or("unspecified"),
        "identity verification failed"
    );
    Ok(())
}

fn complete_onboarding(user: &mut User, _payload: &Payload) -> Result<(), ActionError> {
    if user.onboarding_completed_at.is_none() {
        user.onboarding_completed_at = Some(Utc::now());
    }
    Ok(())
}

fn mark_inactive(user: &mut User, payload: &Payload) -> Result<(), ActionError> {
    let reason = payload
        .str(keys::REASON)
        .unwrap_or("onboarding abandoned")
        .to_string();
    info!(
        urn = %user.urn,
        last_status = user.status.name(),
        days = user.days_since_registration(),
        completeness = user.profile_completeness,
        "onboarding abandoned"
    );
    user.inactive_reason = Some(reason);
    Ok(())
}

/// The user onboarding action registry.
pub fn user_actions(services: &UserServices) -> ActionRegistry<User> {
    use UserStatus::*;

    let notify = |template: &str| UserNotify::new(services.clone(), template);

    ActionRegistry::new()
        .on_event(UserEvent::Register, SendWelcome::new(services.clone()))
        .on_event(
            UserEvent::VerifyEmail,
            FnAction::new("verify_email", verify_email),
        )
        .on_event(
            UserEvent::UpdateProfile,
            FnAction::new("update_profile", update_profile),
        )
        .on_event(
            UserEvent::CompleteProfile,
            FnAction::new("complete_profile", complete_profile),
        )
        .on_event(
            UserEvent::StartIdentityVerification,
            FnAction::new("start_identity_verification", start_identity_verification),
        )
        .on_event(
            UserEvent::CompleteIdentityVerification,
            FnAction::new("complete_identity_verification", complete_identity_verification),
        )
        .on_event(
            UserEvent::FailIdentityVerification,
            FnAction::new("fail_identity_verification", fail_identity_verification),
        )
        .on_event(
            UserEvent::MarkInactive,
            FnAction::new("mark_inactive", mark_inactive),
        )
        .on_status_changes(
            [(IdentityVerified, Active), (Suspended, Active)],
            FnAction::new("complete_onboarding", complete_onboarding),
        )
        .on_status_change(IdentityVerified, Active, notify("user.activated"))
        .on_status_change(IdentityVerified, Suspended, notify("user.under_review"))
        .on_status_change(IdentityVerificationPending, Suspended, notify("user.verification_failed"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{CollaboratorError, MemoryNotificationSender};
    use std::time::Duration;

    fn services(sender: Arc<MemoryNotificationSender>) -> UserServices {
        UserServices {
            notifications: sender,
            policy: CallPolicy::builder()
                .timeout(Duration::from_millis(100))
                .max_attempts(1)
                .backoff(Duration::from_millis(1))
                .build(),
        }
    }

    fn user() -> User {
        let mut user = User::new("urn:user:t");
        user.register("ana@example.com", "ana");
        user
    }

    #[tokio::test]
    async fn welcome_carries_the_token() {
        let sender = Arc::new(MemoryNotificationSender::new());
        let welcome = SendWelcome::new(services(sender.clone()));
        let user = user();
        let token = user.verification.email_token.clone();

        let user = welcome.handle(user, &Payload::new()).await.unwrap();

        assert!(user.welcome_email_sent);
        let sent = sender.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].template, "user.welcome");
        assert_eq!(sent[0].data.str("token").map(str::to_string), token);
    }

    #[tokio::test]
    async fn failed_welcome_is_not_marked_sent() {
        let sender = Arc::new(MemoryNotificationSender::new());
        sender
            .fail_next(CollaboratorError::Unavailable {
                operation: "send".into(),
                reason: "smtp down".into(),
            })
            .await;
        let welcome = SendWelcome::new(services(sender));

        let user = welcome.handle(user(), &Payload::new()).await.unwrap();
        assert!(!user.welcome_email_sent);
    }

    #[test]
    fn verify_email_consumes_the_token() {
        let mut user = user();
        verify_email(&mut user, &Payload::new()).unwrap();
        assert!(user.verification.email_verified);
        assert_eq!(user.verification.email_token, None);
    }

    #[test]
    fn update_profile_rejects_invalid_fields() {
        let mut user = user();
        let error = update_profile(
            &mut user,
            &Payload::new().with(keys::DATE_OF_BIRTH, "yesterday"),
        )
        .unwrap_err();
        assert_eq!(error.action(), "update_profile");
    }

    #[test]
    fn complete_profile_verifies_phone() {
        let mut user = user();
        complete_profile(
            &mut user,
            &Payload::new().with(keys::PHONE_NUMBER, "+15550100"),
        )
        .unwrap();
        assert!(user.verification.phone_verified);
        assert_eq!(user.profile_completeness, 15);
    }

    #[test]
    fn identity_result_sets_risk() {
        let mut user = user();
        start_identity_verification(
            &mut user,
            &Payload::new().with(keys::DOCUMENTS, serde_json::json!(["passport"])),
        )
        .unwrap();
        assert_eq!(user.verification.documents, vec!["passport".to_string()]);
        assert!(user.verification.identity_verification_id.is_some());

        complete_identity_verification(
            &mut user,
            &Payload::new()
                .with(keys::RISK_SCORE, 85)
                .with(keys::RISK_FACTORS, serde_json::json!(["vpn"])),
        )
        .unwrap();
        assert!(user.is_high_risk());
        assert_eq!(
            user.verification.identity_status,
            Some(IdentityStatus::Completed)
        );
    }
}
