//! The user record.

use super::keys;
use super::{UserEvent, UserStatus};
use crate::core::{Entity, Payload, StatusChange, StatusHistory};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub zip_code: String,
    #[serde(default)]
    pub country: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub language: String,
    pub timezone: String,
    #[serde(default)]
    pub newsletter: bool,
    #[serde(default)]
    pub notifications: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub phone_number: Option<String>,
    pub address: Option<Address>,
    pub occupation: Option<String>,
    pub company: Option<String>,
    pub bio: Option<String>,
    pub preferences: Option<Preferences>,
}

fn filled(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|s| !s.trim().is_empty())
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|d| d.date_naive()))
}

fn decode<T: serde::de::DeserializeOwned>(key: &str, value: &Value) -> Result<T, String> {
    serde_json::from_value(value.clone()).map_err(|e| format!("invalid {key}: {e}"))
}

impl UserProfile {
    /// Percentage of the profile filled in, weighted per field.
    pub fn completeness(&self) -> u8 {
        let weighted: [(bool, u8); 9] = [
            (filled(&self.first_name), 10),
            (filled(&self.last_name), 10),
            (self.date_of_birth.is_some(), 10),
            (filled(&self.phone_number), 15),
            (
                self.address
                    .as_ref()
                    .is_some_and(|a| !a.street.trim().is_empty()),
                20,
            ),
            (filled(&self.occupation), 10),
            (filled(&self.company), 10),
            (filled(&self.bio), 5),
            (self.preferences.is_some(), 10),
        ];
        weighted
            .iter()
            .filter(|(present, _)| *present)
            .map(|(_, weight)| weight)
            .sum()
    }

    /// Copy the profile fields present in `payload`. Absent keys leave the
    /// field untouched.
    pub fn apply(&mut self, payload: &Payload) -> Result<(), String> {
        let text = |key: &str| payload.str(key).map(str::to_string);

        if let Some(value) = text(keys::FIRST_NAME) {
            self.first_name = Some(value);
        }
        if let Some(value) = text(keys::LAST_NAME) {
            self.last_name = Some(value);
        }
        if let Some(raw) = payload.str(keys::DATE_OF_BIRTH) {
            let date = parse_date(raw).ok_or_else(|| format!("invalid dateOfBirth '{raw}'"))?;
            self.date_of_birth = Some(date);
        }
        if let Some(value) = text(keys::PHONE_NUMBER) {
            self.phone_number = Some(value);
        }
        if let Some(value) = payload.get(keys::ADDRESS) {
            self.address = Some(decode(keys::ADDRESS, value)?);
        }
        if let Some(value) = text(keys::OCCUPATION) {
            self.occupation = Some(value);
        }
        if let Some(value) = text(keys::COMPANY) {
            self.company = Some(value);
        }
        if let Some(value) = text(keys::BIO) {
            self.bio = Some(value);
        }
        if let Some(value) = payload.get(keys::PREFERENCES) {
            self.preferences = Some(decode(keys::PREFERENCES, value)?);
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityStatus {
    Pending,
    Completed,
    Failed,
    ManualReview,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub email_verified: bool,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub email_token: Option<String>,
    pub phone_verified: bool,
    pub phone_verified_at: Option<DateTime<Utc>>,
    pub identity_status: Option<IdentityStatus>,
    pub identity_verification_id: Option<String>,
    pub identity_completed_at: Option<DateTime<Utc>>,
    pub documents: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        if score > 70 {
            Self::High
        } else if score > 40 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// 0 to 100
    pub score: u8,
    pub level: RiskLevel,
    pub factors: Vec<String>,
    pub requires_manual_review: bool,
    pub assessed_at: DateTime<Utc>,
}

impl RiskAssessment {
    pub fn new(score: u8, factors: Vec<String>, requires_manual_review: bool) -> Self {
        let score = score.min(100);
        Self {
            score,
            level: RiskLevel::from_score(score),
            factors,
            requires_manual_review,
            assessed_at: Utc::now(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignupSource {
    #[default]
    Web,
    Mobile,
    Api,
    Partner,
}

/// A user going through onboarding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub urn: String,
    pub email: String,
    pub username: String,
    pub status: UserStatus,
    pub profile: UserProfile,
    pub profile_completeness: u8,
    pub verification: Verification,
    pub risk: Option<RiskAssessment>,
    pub source: SignupSource,
    pub referral_code: Option<String>,
    pub marketing_campaign: Option<String>,
    pub welcome_email_sent: bool,
    pub registered_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub onboarding_completed_at: Option<DateTime<Utc>>,
    pub inactive_reason: Option<String>,
    pub history: StatusHistory<UserStatus>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A freshly registered user holding a new email verification token.
    pub fn new(urn: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            urn: urn.into(),
            email: String::new(),
            username: String::new(),
            status: UserStatus::Registered,
            profile: UserProfile::default(),
            profile_completeness: 0,
            verification: Verification {
                email_token: Some(Uuid::new_v4().simple().to_string()),
                ..Verification::default()
            },
            risk: None,
            source: SignupSource::default(),
            referral_code: None,
            marketing_campaign: None,
            welcome_email_sent: false,
            registered_at: now,
            last_activity_at: now,
            onboarding_completed_at: None,
            inactive_reason: None,
            history: StatusHistory::new(),
            updated_at: now,
        }
    }

    pub fn register(&mut self, email: impl Into<String>, username: impl Into<String>) {
        self.email = email.into();
        self.username = username.into();
    }

    /// Profile completeness once `payload` is applied. An invalid payload
    /// predicts no change.
    pub fn completeness_with(&self, payload: &Payload) -> u8 {
        let mut profile = self.profile.clone();
        match profile.apply(payload) {
            Ok(()) => profile.completeness(),
            Err(_) => self.profile.completeness(),
        }
    }

    pub fn is_high_risk(&self) -> bool {
        self.risk
            .as_ref()
            .is_some_and(|r| r.level == RiskLevel::High || r.requires_manual_review)
    }

    pub fn days_since_registration_at(&self, now: DateTime<Utc>) -> i64 {
        (now - self.registered_at).num_days()
    }

    pub fn days_since_registration(&self) -> i64 {
        self.days_since_registration_at(Utc::now())
    }

    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }
}

impl Entity for User {
    type Status = UserStatus;
    type Event = UserEvent;

    fn urn(&self) -> &str {
        &self.urn
    }

    fn status(&self) -> UserStatus {
        self.status
    }

    fn set_status(&mut self, status: UserStatus) {
        self.status = status;
    }

    fn secondary_key(&self) -> Option<&str> {
        if self.email.is_empty() {
            None
        } else {
            Some(&self.email)
        }
    }

    fn record_change(&mut self, change: StatusChange<UserStatus>) {
        self.updated_at = change.at;
        self.history = self.history.record(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn full_profile() -> Payload {
        Payload::new()
            .with(keys::FIRST_NAME, "Ana")
            .with(keys::LAST_NAME, "Silva")
            .with(keys::DATE_OF_BIRTH, "1990-04-12")
            .with(keys::PHONE_NUMBER, "+351900000000")
            .with(
                keys::ADDRESS,
                json!({"street": "Rua A 1", "city": "Lisboa", "zipCode": "1000", "country": "PT"}),
            )
            .with(keys::OCCUPATION, "Engineer")
            .with(keys::COMPANY, "Acme")
            .with(keys::BIO, "Hi")
            .with(
                keys::PREFERENCES,
                json!({"language": "pt", "timezone": "Europe/Lisbon"}),
            )
    }

    #[test]
    fn completeness_weights_sum_to_one_hundred() {
        let mut profile = UserProfile::default();
        assert_eq!(profile.completeness(), 0);

        profile.apply(&full_profile()).unwrap();
        assert_eq!(profile.completeness(), 100);
        assert_eq!(profile.address.as_ref().map(|a| a.zip_code.as_str()), Some("1000"));
    }

    #[test]
    fn partial_profile_scores_its_fields() {
        let mut profile = UserProfile::default();
        profile
            .apply(
                &Payload::new()
                    .with(keys::FIRST_NAME, "Ana")
                    .with(keys::PHONE_NUMBER, "+351900000000"),
            )
            .unwrap();
        assert_eq!(profile.completeness(), 25);
    }

    #[test]
    fn invalid_fields_are_rejected() {
        let mut profile = UserProfile::default();
        assert!(profile
            .apply(&Payload::new().with(keys::DATE_OF_BIRTH, "soon"))
            .is_err());
        assert!(profile
            .apply(&Payload::new().with(keys::ADDRESS, "somewhere"))
            .is_err());
    }

    #[test]
    fn completeness_with_does_not_mutate() {
        let user = User::new("urn:user:1");
        assert_eq!(user.completeness_with(&full_profile()), 100);
        assert_eq!(user.profile.completeness(), 0);
    }

    #[test]
    fn risk_levels_follow_score() {
        assert_eq!(RiskAssessment::new(80, vec![], false).level, RiskLevel::High);
        assert_eq!(RiskAssessment::new(50, vec![], false).level, RiskLevel::Medium);
        assert_eq!(RiskAssessment::new(10, vec![], false).level, RiskLevel::Low);

        let mut user = User::new("urn:user:1");
        assert!(!user.is_high_risk());
        user.risk = Some(RiskAssessment::new(10, vec![], true));
        assert!(user.is_high_risk());
    }

    #[test]
    fn days_since_registration() {
        let mut user = User::new("urn:user:1");
        let now = Utc::now();
        user.registered_at = now - Duration::days(31);
        assert_eq!(user.days_since_registration_at(now), 31);
    }

    #[test]
    fn new_users_hold_a_token_and_no_key() {
        let mut user = User::new("urn:user:1");
        assert!(user.verification.email_token.is_some());
        assert_eq!(user.secondary_key(), None);

        user.register("ana@example.com", "ana");
        assert_eq!(user.secondary_key(), Some("ana@example.com"));
    }
}
