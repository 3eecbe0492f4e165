use deadpool_postgres::Pool;
use uuid::Uuid;
use crate::{
    error::{AppError, Result},
    models::user::Profile,
};

const PROFILE_COLUMNS: &str = "id, name, email, role, company_id";

/// Reads the stored role for a user. A missing profile row is an error,
/// matching a single-row lookup.
pub async fn find_role(pool: &Pool, user_id: &Uuid) -> Result<Option<String>> {
    let client = pool.get().await?;
    let row = client
        .query_opt("SELECT role FROM profiles WHERE id = $1", &[user_id])
        .await?
        .ok_or_else(|| AppError::MissingData(format!("profile for user {}", user_id)))?;
    row.try_get("role")
        .map_err(|_| AppError::MissingData("role".to_string()))
}

pub async fn find_by_id(pool: &Pool, profile_id: &Uuid) -> Result<Option<Profile>> {
    let client = pool.get().await?;
    let query = format!("SELECT {} FROM profiles WHERE id = $1", PROFILE_COLUMNS);
    let row = client.query_opt(&query, &[profile_id]).await?;
    Ok(row.as_ref().map(Profile::from))
}

/// Every profile except `viewer`, ordered by name.
pub async fn list_except(pool: &Pool, viewer: &Uuid) -> Result<Vec<Profile>> {
    let client = pool.get().await?;
    let query = format!(
        "SELECT {} FROM profiles WHERE id <> $1 ORDER BY name NULLS LAST, email",
        PROFILE_COLUMNS
    );
    let rows = client.query(&query, &[viewer]).await?;
    Ok(rows.iter().map(Profile::from).collect())
}

pub async fn find_many(pool: &Pool, ids: &[Uuid]) -> Result<Vec<Profile>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let client = pool.get().await?;
    let query = format!("SELECT {} FROM profiles WHERE id = ANY($1)", PROFILE_COLUMNS);
    let rows = client.query(&query, &[&ids]).await?;
    Ok(rows.iter().map(Profile::from).collect())
}

pub async fn ids_in_company(pool: &Pool, company_id: &Uuid) -> Result<Vec<Uuid>> {
    let client = pool.get().await?;
    let rows = client
        .query("SELECT id FROM profiles WHERE company_id = $1", &[company_id])
        .await?;
    Ok(rows.iter().map(|row| row.get("id")).collect())
}
