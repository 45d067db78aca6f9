//! Account Aggregate

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role { #[default] User, Admin, SuperAdmin }

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self { Self::User => "user", Self::Admin => "admin", Self::SuperAdmin => "superadmin" }
    }
    pub fn is_admin(&self) -> bool { matches!(self, Self::Admin | Self::SuperAdmin) }
}

impl FromStr for Role {
    type Err = AuthError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            "superadmin" => Ok(Self::SuperAdmin),
            _ => Err(AuthError::InvalidRole),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    /// Lower-cased, unique.
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub otp: Option<String>,
    pub otp_expires_at: Option<DateTime<Utc>>,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub const OTP_TTL_MINUTES: i64 = 10;
    pub const MIN_PASSWORD_LEN: usize = 6;

    pub fn new(username: &str, email: &str, password_hash: String, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            username: username.trim().to_string(),
            email: email.trim().to_lowercase(),
            password_hash, role,
            otp: None, otp_expires_at: None,
            verified: false,
            created_at: now, updated_at: now,
        }
    }

    /// Stores a fresh 6-digit OTP and returns it.
    pub fn issue_otp(&mut self, now: DateTime<Utc>) -> String {
        let otp = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000));
        self.otp = Some(otp.clone());
        self.otp_expires_at = Some(now + Duration::minutes(Self::OTP_TTL_MINUTES));
        self.updated_at = now;
        otp
    }

    pub fn verify_otp(&mut self, otp: &str, now: DateTime<Utc>) -> Result<(), AuthError> {
        let otp = otp.trim();
        if otp.is_empty() { return Err(AuthError::OtpRequired); }
        let valid = self.otp.as_deref() == Some(otp) && self.otp_expires_at.is_some_and(|exp| exp >= now);
        if !valid { return Err(AuthError::InvalidOtp); }
        self.otp = None;
        self.otp_expires_at = None;
        self.verified = true;
        self.updated_at = now;
        Ok(())
    }

    pub fn view(&self) -> AccountView {
        AccountView {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role,
            verified: self.verified,
        }
    }
}

/// Public projection of an account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountView {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuthError {
    #[error("Please enter all the fields")]
    MissingFields,
    #[error("Password must be at least 6 characters")]
    PasswordTooShort,
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("Email already exists!")]
    EmailTaken,
    #[error("Invalid Email")]
    UnknownEmail,
    #[error("Invalid password")]
    WrongPassword,
    #[error("Please enter the OTP")]
    OtpRequired,
    #[error("Invalid OTP")]
    InvalidOtp,
    #[error("User not found")]
    AccountNotFound,
    #[error("Invalid role")]
    InvalidRole,
    #[error("Not authorized, no token")]
    MissingToken,
    #[error("Not authorized, token failed")]
    InvalidToken,
    #[error("Not authorized as an admin")]
    NotAdmin,
    #[error("Only superadmin can create admin or superadmin accounts")]
    SuperAdminRequired,
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("token signing failed: {0}")]
    Token(String),
}
