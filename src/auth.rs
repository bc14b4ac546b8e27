use axum::headers::authorization::Bearer;
use axum::headers::Authorization;
use axum::{Extension, Json, TypedHeader};
use chrono::{DateTime, Duration, Utc};
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand::{thread_rng, Rng};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::SeedAdmin;
use crate::{proceeds, AppState, Error, Payload};

pub type SessionHeader = Option<TypedHeader<Authorization<Bearer>>>;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Admin,
    Coordinator,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Admin => "admin",
            Role::Coordinator => "coordinator",
        }
    }

    pub fn parse(raw: &str) -> Option<Role> {
        match raw {
            "student" => Some(Role::Student),
            "admin" => Some(Role::Admin),
            "coordinator" => Some(Role::Coordinator),
            _ => None,
        }
    }

    /// Coordinators may do everything admins can.
    pub fn satisfies(self, required: Role) -> bool {
        match required {
            Role::Student => self == Role::Student,
            Role::Admin | Role::Coordinator => matches!(self, Role::Admin | Role::Coordinator),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AccountRow {
    pub uuid: Uuid,
    pub email: String,
    pub role: String,
    pub disabled: bool,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub ssid: String,
    pub expires_at: DateTime<Utc>,
    pub belongs_to: Uuid,
}

/// An authenticated caller.
#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub uuid: Uuid,
    pub email: String,
    pub role: Role,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = Error;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let role = Role::parse(&row.role).ok_or_else(|| Error::InternalError {
            kind: "DatabaseError",
            message: format!("account {} has unknown role `{}`", row.uuid, row.role),
        })?;
        Ok(Account {
            uuid: row.uuid,
            email: row.email,
            role,
            disabled: row.disabled,
            created_at: row.created_at,
        })
    }
}

pub fn validate_password(password: &str) -> Result<(), Error> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::invalid(format!(
            "Password should be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// `user@domain.tld`, surrounding whitespace ignored.
pub fn validate_email(email: &str) -> Result<(), Error> {
    match email.trim().split_once('@') {
        Some((user, domain))
            if !user.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.') =>
        {
            Ok(())
        }
        _ => Err(Error::invalid(format!("`{}` is not a valid email", email))),
    }
}

/// Account emails are stored trimmed and lowercased.
pub fn normalize_email(email: &str) -> Result<String, Error> {
    validate_email(email)?;
    Ok(email.trim().to_lowercase())
}

pub fn hash_password(password: &str) -> Result<String, Error> {
    Ok(Pbkdf2
        .hash_password(password.as_bytes(), &SaltString::generate(&mut OsRng))?
        .to_string())
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, Error> {
    let hash = PasswordHash::new(hash)?;
    Ok(Pbkdf2.verify_password(password.as_bytes(), &hash).is_ok())
}

/// Hex sha256 of 32 random bytes.
pub fn new_session_id() -> String {
    let ssid_bytes: [u8; 32] = thread_rng().gen();
    let mut hasher: Sha256 = Digest::new();
    hasher.update(ssid_bytes);
    hex::encode(hasher.finalize())
}

async fn find_account(pg: &PgPool, uuid: Uuid) -> Result<Option<AccountRow>, Error> {
    Ok(
        sqlx::query_as::<_, AccountRow>("SELECT * FROM accounts WHERE uuid = $1 LIMIT 1")
            .bind(uuid)
            .fetch_optional(pg)
            .await?,
    )
}

async fn find_account_by_email(pg: &PgPool, email: &str) -> Result<Option<AccountRow>, Error> {
    Ok(
        sqlx::query_as::<_, AccountRow>("SELECT * FROM accounts WHERE email = $1 LIMIT 1")
            .bind(email)
            .fetch_optional(pg)
            .await?,
    )
}

fn email_taken() -> Error {
    Error::AccountAlreadyExists {
        message: "That email is already taken".to_string(),
    }
}

/// Inserts a new account. `email` must already be normalized.
async fn insert_account(pg: &PgPool, email: String, password: &str, role: Role) -> Result<Account, Error> {
    validate_password(password)?;
    if find_account_by_email(pg, &email).await?.is_some() {
        return Err(email_taken());
    }

    let account = Account {
        uuid: Uuid::new_v4(),
        email,
        role,
        disabled: false,
        created_at: Utc::now(),
    };
    let res = sqlx::query(
        "INSERT INTO accounts (uuid, email, role, disabled, password_hash, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(account.uuid)
    .bind(&account.email)
    .bind(account.role.as_str())
    .bind(account.disabled)
    .bind(hash_password(password)?)
    .bind(account.created_at)
    .execute(pg)
    .await?;

    if res.rows_affected() < 1 {
        return Err(Error::InternalError {
            kind: "DatabaseError",
            message: "Could not save account to database!".to_string(),
        });
    }
    Ok(account)
}

/// Creates the configured admin account unless an account with that email
/// already exists. Existing accounts are never promoted.
pub async fn seed_admin(pg: &PgPool, seed: &SeedAdmin) -> Result<(), Error> {
    let email = normalize_email(&seed.email)?;
    if let Some(existing) = find_account_by_email(pg, &email).await? {
        match Role::parse(&existing.role) {
            Some(role) if role.satisfies(Role::Admin) => {
                log::info!("admin account {} already present", email)
            }
            _ => log::warn!(
                "seed admin {} exists with role `{}` and was left unchanged",
                email,
                existing.role
            ),
        }
        return Ok(());
    }
    let account = insert_account(pg, email, &seed.password, Role::Admin).await?;
    log::info!("seeded admin account {}", account.uuid);
    Ok(())
}

/// Resolves the bearer session to an account holding `required`.
pub async fn authorize(header: SessionHeader, pg: &PgPool, required: Role) -> Result<Account, Error> {
    let account = authenticate(header, pg).await?;
    if !account.role.satisfies(required) {
        return Err(Error::forbidden(format!(
            "This action requires the `{}` role",
            required.as_str()
        )));
    }
    Ok(account)
}

pub async fn authenticate(header: SessionHeader, pg: &PgPool) -> Result<Account, Error> {
    let invalid = |message: &str| Error::AuthenticationFailure {
        message: message.to_string(),
    };
    let Some(TypedHeader(auth)) = header else {
        return Err(invalid("Missing bearer session"));
    };
    let ssid = auth.token();
    if ssid.is_empty() {
        return Err(invalid("Missing bearer session"));
    }

    let session = sqlx::query_as::<_, SessionRow>(
        "SELECT * FROM account_sessions WHERE ssid = $1 LIMIT 1",
    )
    .bind(ssid)
    .fetch_optional(pg)
    .await?
    .ok_or_else(|| invalid("Invalid session"))?;

    if Utc::now() > session.expires_at {
        sqlx::query("DELETE FROM account_sessions WHERE ssid = $1")
            .bind(ssid)
            .execute(pg)
            .await?;
        return Err(invalid("Session expired"));
    }

    let account: Account = find_account(pg, session.belongs_to)
        .await?
        .ok_or_else(|| invalid("Session owner no longer exists"))?
        .try_into()?;
    if account.disabled {
        return Err(invalid("Account is disabled"));
    }
    Ok(account)
}

pub async fn register_account(
    Json(create): Json<CreateAccount>,
    Extension(pg): Extension<PgPool>,
) -> Payload<Account> {
    let email = normalize_email(&create.email)?;
    let account = insert_account(&pg, email, &create.password, Role::Student).await?;
    log::info!("account {} registered", account.uuid);
    proceeds(account)
}

pub async fn login(
    Json(login): Json<Login>,
    Extension(pg): Extension<PgPool>,
    Extension(state): Extension<AppState>,
) -> Payload<LoggedIn> {
    let failure = || Error::AuthenticationFailure {
        message: "Incorrect email or password".to_string(),
    };
    let row = find_account_by_email(&pg, &login.email.trim().to_lowercase())
        .await?
        .ok_or_else(failure)?;

    if !verify_password(&login.password, &row.password_hash)? {
        return Err(failure());
    }
    let account = Account::try_from(row)?;
    if account.disabled {
        return Err(Error::AuthenticationFailure {
            message: "Account is disabled".to_string(),
        });
    }

    let existing = sqlx::query_as::<_, SessionRow>(
        "SELECT * FROM account_sessions WHERE belongs_to = $1 AND expires_at > $2 LIMIT 1",
    )
    .bind(account.uuid)
    .bind(Utc::now())
    .fetch_optional(&pg)
    .await?;

    if let Some(existing) = existing {
        // already authenticated
        return proceeds(LoggedIn {
            session_id: existing.ssid,
            account_id: existing.belongs_to,
            role: account.role,
            expires_at: existing.expires_at,
        });
    }

    let ssid = new_session_id();
    let expires_at = Utc::now() + Duration::days(state.session_days);
    sqlx::query("INSERT INTO account_sessions (ssid, expires_at, belongs_to) VALUES ($1, $2, $3)")
        .bind(&ssid)
        .bind(expires_at)
        .bind(account.uuid)
        .execute(&pg)
        .await?;

    proceeds(LoggedIn {
        session_id: ssid,
        account_id: account.uuid,
        role: account.role,
        expires_at,
    })
}

pub async fn logout(
    header: SessionHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<SessionDropped> {
    let account = authenticate(header.clone(), &pg).await?;
    let ssid = header
        .map(|TypedHeader(auth)| auth.token().to_string())
        .unwrap_or_default();

    let affected = sqlx::query("DELETE FROM account_sessions WHERE ssid = $1 AND belongs_to = $2")
        .bind(&ssid)
        .bind(account.uuid)
        .execute(&pg)
        .await?;

    proceeds(SessionDropped {
        account_id: account.uuid,
        drop_success: affected.rows_affected() >= 1,
    })
}

pub async fn me(header: SessionHeader, Extension(pg): Extension<PgPool>) -> Payload<Account> {
    proceeds(authenticate(header, &pg).await?)
}

pub async fn update_email(
    Json(update): Json<EmailUpdate>,
    header: SessionHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<Account> {
    let mut account = authorize(header, &pg, Role::Student).await?;
    let email = normalize_email(&update.email)?;
    if find_account_by_email(&pg, &email).await?.is_some() {
        return Err(email_taken());
    }

    sqlx::query("UPDATE accounts SET email = $1 WHERE uuid = $2")
        .bind(&email)
        .bind(account.uuid)
        .execute(&pg)
        .await?;
    log::info!("account {} changed its email", account.uuid);
    account.email = email;
    proceeds(account)
}

pub async fn update_password(
    Json(update): Json<PasswordUpdate>,
    header: SessionHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<Account> {
    let account = authorize(header, &pg, Role::Student).await?;
    validate_password(&update.password)?;

    sqlx::query("UPDATE accounts SET password_hash = $1 WHERE uuid = $2")
        .bind(hash_password(&update.password)?)
        .bind(account.uuid)
        .execute(&pg)
        .await?;
    log::info!("account {} changed its password", account.uuid);
    proceeds(account)
}

/// Students can disable their own account but not re-enable it.
pub async fn update_disabled(
    Json(update): Json<DisabledUpdate>,
    header: SessionHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<Account> {
    let mut account = authorize(header, &pg, Role::Student).await?;
    update.validate()?;

    sqlx::query("UPDATE accounts SET disabled = TRUE WHERE uuid = $1")
        .bind(account.uuid)
        .execute(&pg)
        .await?;
    sqlx::query("DELETE FROM account_sessions WHERE belongs_to = $1")
        .bind(account.uuid)
        .execute(&pg)
        .await?;
    log::info!("account {} disabled", account.uuid);
    account.disabled = true;
    proceeds(account)
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailUpdate {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordUpdate {
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisabledUpdate {
    pub disabled: bool,
}

impl DisabledUpdate {
    fn validate(&self) -> Result<(), Error> {
        if !self.disabled {
            return Err(Error::invalid("`disabled` can only be set to true"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAccount {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Login {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggedIn {
    pub session_id: String,
    pub account_id: Uuid,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionDropped {
    pub account_id: Uuid,
    pub drop_success: bool,
}
