//! Accounts: Argon2id password hashes, HS256 bearer tokens and OTP verification.

use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::mailer::{otp_mail, Mailer};
use crate::domain::aggregates::{Account, AccountView, AuthError, Role};
use crate::domain::value_objects::Email;
use crate::error::{AppError, Result};
use crate::store::{AccountStore, Store};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenKeys {
    pub fn new(secret: &str, ttl_days: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::days(ttl_days),
        }
    }

    pub fn issue(&self, account: &Account) -> std::result::Result<String, AuthError> {
        let claims = Claims { sub: account.id, role: account.role, exp: (Utc::now() + self.ttl).timestamp() };
        encode(&Header::default(), &claims, &self.encoding).map_err(|e| AuthError::Token(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> std::result::Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidToken)
    }
}

pub fn hash_password(password: &str) -> std::result::Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OtpRequest {
    pub otp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    #[serde(flatten)]
    pub account: AccountView,
    pub token: String,
}

/// Which registration path a request came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Shopper,
    Staff,
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn Store>,
    mailer: Arc<dyn Mailer>,
    keys: TokenKeys,
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn registration_fields(request: &RegisterRequest) -> std::result::Result<(&str, Email, &str), AuthError> {
    let (Some(username), Some(email), Some(password)) =
        (present(request.username.as_deref()), present(request.email.as_deref()), request.password.as_deref().filter(|p| !p.is_empty()))
    else {
        return Err(AuthError::MissingFields);
    };
    let email = Email::parse(email).map_err(|_| AuthError::InvalidEmail)?;
    if password.chars().count() < Account::MIN_PASSWORD_LEN {
        return Err(AuthError::PasswordTooShort);
    }
    Ok((username, email, password))
}

impl AuthService {
    pub fn new(store: Arc<dyn Store>, mailer: Arc<dyn Mailer>, keys: TokenKeys) -> Self {
        Self { store, mailer, keys }
    }

    pub fn authenticate(&self, token: &str) -> std::result::Result<Claims, AuthError> { self.keys.verify(token) }

    /// Shoppers always get [`Role::User`]. Staff registrations may ask for a role, but
    /// only a superadmin caller can grant admin or superadmin.
    pub async fn register(&self, request: RegisterRequest, audience: Audience, caller: Option<&Claims>) -> Result<AuthResponse> {
        let (username, email, password) = registration_fields(&request)?;
        let role = match (audience, present(request.role.as_deref())) {
            (Audience::Staff, Some(role)) => role.parse::<Role>()?,
            _ => Role::User,
        };
        if role.is_admin() && caller.map(|c| c.role) != Some(Role::SuperAdmin) {
            return Err(AuthError::SuperAdminRequired.into());
        }
        self.create_account(username, &email, password, role).await
    }

    /// Superadmin shortcut that always creates an admin.
    pub async fn create_admin(&self, request: RegisterRequest) -> Result<AuthResponse> {
        let (username, email, password) = registration_fields(&request)?;
        self.create_account(username, &email, password, Role::Admin).await
    }

    async fn create_account(&self, username: &str, email: &Email, password: &str, role: Role) -> Result<AuthResponse> {
        if self.store.find_account_by_email(&email.normalized()).await?.is_some() {
            return Err(AuthError::EmailTaken.into());
        }
        let password = password.to_string();
        let hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| AppError::Internal(e.to_string()))??;

        let mut account = Account::new(username, email.as_str(), hash, role);
        let otp = account.issue_otp(Utc::now());
        self.store.insert_account(&account).await?;
        tracing::info!(account_id = %account.id, role = role.as_str(), "Account registered");

        if let Err(e) = self.mailer.send(otp_mail(&account.email, &otp, role.is_admin())).await {
            tracing::warn!(error = %e, account_id = %account.id, "Failed to send OTP email");
        }
        self.respond(&account)
    }

    /// `staff_only` rejects accounts without an admin role.
    pub async fn login(&self, request: LoginRequest, staff_only: bool) -> Result<AuthResponse> {
        let (Some(email), Some(password)) = (present(request.email.as_deref()), request.password.as_deref().filter(|p| !p.is_empty())) else {
            return Err(AuthError::MissingFields.into());
        };
        let account = self.store.find_account_by_email(&email.to_lowercase()).await?.ok_or(AuthError::UnknownEmail)?;

        let (password, hash) = (password.to_string(), account.password_hash.clone());
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;
        if !matches {
            tracing::warn!(account_id = %account.id, "Rejected login");
            return Err(AuthError::WrongPassword.into());
        }
        if staff_only && !account.role.is_admin() {
            return Err(AuthError::NotAdmin.into());
        }
        self.respond(&account)
    }

    pub async fn verify_otp(&self, caller: &Claims, request: OtpRequest) -> Result<AuthResponse> {
        let otp = present(request.otp.as_deref()).ok_or(AuthError::OtpRequired)?;
        let mut account = self.store.get_account(caller.sub).await?.ok_or(AuthError::AccountNotFound)?;
        account.verify_otp(otp, Utc::now())?;
        self.store.save_account(&account).await?;
        tracing::info!(account_id = %account.id, "Account verified");
        self.respond(&account)
    }

    fn respond(&self, account: &Account) -> Result<AuthResponse> {
        Ok(AuthResponse { account: account.view(), token: self.keys.issue(account)? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::mailer::LogMailer;
    use crate::store::MemoryStore;

    fn service() -> AuthService {
        AuthService::new(Arc::new(MemoryStore::new()), Arc::new(LogMailer), TokenKeys::new("test-secret", 15))
    }

    fn register(email: &str, role: Option<&str>) -> RegisterRequest {
        RegisterRequest {
            username: Some("ayesha".into()),
            email: Some(email.into()),
            password: Some("hunter22".into()),
            role: role.map(str::to_string),
        }
    }

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("hunter22").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("hunter23", &hash));
        assert!(!verify_password("hunter22", "not-a-phc-string"));
    }

    #[test]
    fn test_token_claims() {
        let keys = TokenKeys::new("test-secret", 15);
        let account = Account::new("ayesha", "a@x.com", "h".into(), Role::Admin);
        let claims = keys.verify(&keys.issue(&account).unwrap()).unwrap();
        assert_eq!(claims.sub, account.id);
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(TokenKeys::new("other", 15).verify(&keys.issue(&account).unwrap()), Err(AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let auth = service();
        let registered = auth.register(register("Ayesha@X.com", None), Audience::Shopper, None).await.unwrap();
        assert_eq!(registered.account.email, "ayesha@x.com");
        assert_eq!(registered.account.role, Role::User);
        assert!(!registered.account.verified);

        let dup = auth.register(register("ayesha@x.com", None), Audience::Shopper, None).await.unwrap_err();
        assert_eq!(dup.to_string(), "Email already exists!");

        let login = |password: &str| LoginRequest { email: Some("ayesha@x.com".into()), password: Some(password.into()) };
        assert!(auth.login(login("hunter22"), false).await.is_ok());
        assert_eq!(auth.login(login("wrong-pass"), false).await.unwrap_err().to_string(), "Invalid password");
        assert_eq!(auth.login(login("hunter22"), true).await.unwrap_err().to_string(), "Not authorized as an admin");
        let unknown = LoginRequest { email: Some("nobody@x.com".into()), password: Some("x".into()) };
        assert_eq!(auth.login(unknown, false).await.unwrap_err().to_string(), "Invalid Email");
    }

    #[tokio::test]
    async fn test_register_validation() {
        let auth = service();
        let mut short = register("a@x.com", None);
        short.password = Some("abc".into());
        assert_eq!(auth.register(short, Audience::Shopper, None).await.unwrap_err().to_string(), "Password must be at least 6 characters");
        let missing = RegisterRequest { email: Some("a@x.com".into()), ..Default::default() };
        assert_eq!(auth.register(missing, Audience::Shopper, None).await.unwrap_err().to_string(), "Please enter all the fields");
    }

    #[tokio::test]
    async fn test_staff_roles_need_superadmin() {
        let auth = service();
        let err = auth.register(register("boss@x.com", Some("admin")), Audience::Staff, None).await.unwrap_err();
        assert_eq!(err.to_string(), "Only superadmin can create admin or superadmin accounts");

        let root = Claims { sub: Uuid::now_v7(), role: Role::SuperAdmin, exp: 0 };
        let created = auth.register(register("boss@x.com", Some("admin")), Audience::Staff, Some(&root)).await.unwrap();
        assert_eq!(created.account.role, Role::Admin);

        // Shoppers cannot ask for a role at all.
        let shopper = auth.register(register("s@x.com", Some("superadmin")), Audience::Shopper, Some(&root)).await.unwrap();
        assert_eq!(shopper.account.role, Role::User);
    }

    #[tokio::test]
    async fn test_verify_otp() {
        let store = Arc::new(MemoryStore::new());
        let auth = AuthService::new(store.clone(), Arc::new(LogMailer), TokenKeys::new("s", 1));
        let registered = auth.register(register("a@x.com", None), Audience::Shopper, None).await.unwrap();
        let claims = auth.authenticate(&registered.token).unwrap();

        let err = auth.verify_otp(&claims, OtpRequest { otp: Some("nope".into()) }).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid OTP");

        let otp = store.get_account(claims.sub).await.unwrap().unwrap().otp.unwrap();
        let verified = auth.verify_otp(&claims, OtpRequest { otp: Some(otp) }).await.unwrap();
        assert!(verified.account.verified);
    }
}
