//! User onboarding.
//!
//! ```text
//! registered -> email_verified -> profile_incomplete -> profile_complete
//!                     |                                        ^   |
//!                     +----------------------------------------+   v
//!                              identity_verification_pending -> identity_verified -> active
//!                                         |                          |               |  ^
//!                                         +--------> suspended <-----+---------------+  |
//!                                                        |                              |
//!                                                        +------------------------------+
//!
//! abandoned (30 days): registered | email_verified | profile_* -> inactive
//! ```
//!
//! Profile guards look at the completeness the profile *would* reach once
//! the payload is applied, so a single update can move a user straight to
//! `profile_complete`.

mod actions;
mod entity;
mod fallback;
mod table;

pub use actions::{user_actions, SendWelcome, UserNotify, UserServices};
pub use entity::{
    Address, IdentityStatus, Preferences, RiskAssessment, RiskLevel, SignupSource, User,
    UserProfile, Verification,
};
pub use fallback::AbandonmentFallback;
pub use table::{user_table, ABANDONMENT_DAYS};

use crate::{workflow_event, workflow_status};

workflow_status! {
    pub enum UserStatus {
        Registered => "registered",
        EmailVerified => "email_verified",
        ProfileIncomplete => "profile_incomplete",
        ProfileComplete => "profile_complete",
        IdentityVerificationPending => "identity_verification_pending",
        IdentityVerified => "identity_verified",
        Active => "active",
        Suspended => "suspended",
        Inactive => "inactive",
    }
    final: [Inactive]
    failed: [Inactive]
}

workflow_event! {
    pub enum UserEvent {
        Register => "user.register",
        VerifyEmail => "user.verify.email",
        UpdateProfile => "user.update.profile",
        CompleteProfile => "user.complete.profile",
        StartIdentityVerification => "user.identity.start",
        CompleteIdentityVerification => "user.identity.complete",
        FailIdentityVerification => "user.identity.fail",
        Activate => "user.activate",
        Suspend => "user.suspend",
        Reactivate => "user.reactivate",
        MarkInactive => "user.mark.inactive",
    }
}

/// Payload keys understood by the user actions and guards.
pub mod keys {
    pub const TOKEN: &str = "token";
    pub const FIRST_NAME: &str = "firstName";
    pub const LAST_NAME: &str = "lastName";
    pub const DATE_OF_BIRTH: &str = "dateOfBirth";
    pub const PHONE_NUMBER: &str = "phoneNumber";
    pub const ADDRESS: &str = "address";
    pub const OCCUPATION: &str = "occupation";
    pub const COMPANY: &str = "company";
    pub const BIO: &str = "bio";
    pub const PREFERENCES: &str = "preferences";
    pub const DOCUMENTS: &str = "documents";
    pub const VERIFICATION_ID: &str = "verificationId";
    pub const VERIFICATION_STATUS: &str = "verificationStatus";
    pub const RISK_SCORE: &str = "riskScore";
    pub const RISK_FACTORS: &str = "riskFactors";
    pub const MANUAL_REVIEW: &str = "manualReview";
    pub const REASON: &str = "reason";
}
