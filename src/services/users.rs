use crate::{
    auth::{hash_password, verify_password, AuthService, IssuedToken},
    db::DbPool,
    entities::user::{self, Entity as UserEntity},
    entities::UserRole,
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter, Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
    #[validate(length(
        min = 6,
        max = 128,
        message = "Password must be between 6 and 128 characters"
    ))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for UserResponse {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            email: model.email,
            role: model.role,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub expires_in: i64,
    pub user: UserResponse,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Accounts and credentials
#[derive(Clone)]
pub struct UserService {
    db_pool: Arc<DbPool>,
    auth: Arc<AuthService>,
    event_sender: Arc<EventSender>,
}

impl UserService {
    pub fn new(db_pool: Arc<DbPool>, auth: Arc<AuthService>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            auth,
            event_sender,
        }
    }

    fn token_response(&self, model: user::Model) -> Result<AuthResponse, ServiceError> {
        let IssuedToken { token, expires_in } = self.auth.issue_token(&model)?;
        Ok(AuthResponse {
            token,
            expires_in,
            user: model.into(),
        })
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<user::Model>, ServiceError> {
        UserEntity::find()
            .filter(user::Column::Email.eq(normalize_email(email)))
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)
    }

    async fn insert_user(
        &self,
        name: &str,
        email: &str,
        password: String,
        role: UserRole,
    ) -> Result<user::Model, ServiceError> {
        let email = normalize_email(email);
        if self.find_by_email(&email).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "An account with email {} already exists",
                email
            )));
        }

        let password_hash = hash_password(password).await?;
        let now = Utc::now();
        let model = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.trim().to_string()),
            email: Set(email.clone()),
            password_hash: Set(password_hash),
            role: Set(role),
            created_at: Set(now),
            updated_at: Set(now),
        };

        model.insert(&*self.db_pool).await.map_err(|e| {
            // Lost a race with a concurrent registration.
            if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                ServiceError::Conflict(format!("An account with email {} already exists", email))
            } else {
                ServiceError::db_error(e)
            }
        })
    }

    /// Creates a USER account and signs it in.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, ServiceError> {
        request.validate()?;
        let created = self
            .insert_user(&request.name, &request.email, request.password, UserRole::User)
            .await?;

        info!(user_id = %created.id, "user registered");
        self.event_sender
            .send_or_log(Event::UserRegistered(created.id))
            .await;
        self.token_response(created)
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, ServiceError> {
        request.validate()?;
        let invalid = || ServiceError::Unauthorized("Invalid email or password".to_string());

        let account = self.find_by_email(&request.email).await?.ok_or_else(invalid)?;
        if !verify_password(request.password, account.password_hash.clone()).await? {
            warn!(user_id = %account.id, "login rejected: wrong password");
            return Err(invalid());
        }

        self.token_response(account)
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<UserResponse, ServiceError> {
        UserEntity::find_by_id(user_id)
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?
            .map(UserResponse::from)
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))
    }

    /// Makes sure an administrator with this email exists, promoting an
    /// existing account if needed. The password is only used on creation.
    #[instrument(skip(self, password))]
    pub async fn ensure_admin(
        &self,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<user::Model, ServiceError> {
        if let Some(existing) = self.find_by_email(email).await? {
            if existing.role == UserRole::Admin {
                return Ok(existing);
            }
            let mut active = existing.into_active_model();
            active.role = Set(UserRole::Admin);
            active.updated_at = Set(Utc::now());
            let promoted = active
                .update(&*self.db_pool)
                .await
                .map_err(ServiceError::db_error)?;
            info!(user_id = %promoted.id, "promoted existing account to admin");
            return Ok(promoted);
        }

        if password.len() < crate::auth::password::MIN_PASSWORD_LEN {
            return Err(ServiceError::ValidationError(format!(
                "Admin password must be at least {} characters",
                crate::auth::password::MIN_PASSWORD_LEN
            )));
        }

        let created = self
            .insert_user(name, email, password.to_string(), UserRole::Admin)
            .await?;
        info!(user_id = %created.id, "created admin account");
        Ok(created)
    }
}
