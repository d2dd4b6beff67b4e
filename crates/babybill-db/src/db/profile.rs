use async_trait::async_trait;
use babybill_core::models::{Country, UserProfile};
use babybill_core::AppError;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Remote username availability lookup
#[async_trait]
pub trait UsernameDirectory: Send + Sync {
    /// `true` when no profile uses `candidate` (case-insensitive)
    async fn is_available(&self, candidate: &str) -> Result<bool, AppError>;
}

/// Repository for user profiles
#[derive(Clone)]
pub struct ProfileRepository {
    pool: PgPool,
}

impl ProfileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, profile: &UserProfile) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO profiles (
                id, username, first_name, last_name, email, country, currency, tax_system
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(profile.id)
        .bind(profile.username.to_lowercase())
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.email)
        .bind(profile.country.name())
        .bind(&profile.currency)
        .bind(&profile.tax_system)
        .execute(&self.pool)
        .await?;

        tracing::info!(profile_id = %profile.id, "Profile created");
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<UserProfile>, AppError> {
        let row = sqlx::query(
            r#"
            SELECT id, username, first_name, last_name, email, country, currency, tax_system
            FROM profiles
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let country: String = row.try_get("country")?;
        Ok(Some(UserProfile {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            email: row.try_get("email")?,
            country: country.parse::<Country>()?,
            currency: row.try_get("currency")?,
            tax_system: row.try_get("tax_system")?,
        }))
    }

    /// Save currency and tax settings
    pub async fn update_settings(&self, profile: &UserProfile) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE profiles
            SET first_name = $2, last_name = $3, country = $4, currency = $5, tax_system = $6
            WHERE id = $1
            "#,
        )
        .bind(profile.id)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(profile.country.name())
        .bind(&profile.currency)
        .bind(&profile.tax_system)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Profile {} not found", profile.id)));
        }
        Ok(())
    }
}

#[async_trait]
impl UsernameDirectory for ProfileRepository {
    async fn is_available(&self, candidate: &str) -> Result<bool, AppError> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM profiles WHERE LOWER(username) = LOWER($1))",
        )
        .bind(candidate)
        .fetch_one(&self.pool)
        .await?;

        Ok(!taken)
    }
}
