use crate::db::{self, DbPool};
use crate::models::{
    derive_risk_and_fit, Category, RiskLevel, ShortlistEntry, ShortlistScores, ShortlistStatus,
    ShortlistedUniversity, Stage, UniversitySummary,
};
use crate::store::{catalog, profiles};
use crate::types::{CounsellorError, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

const ENTRY_COLUMNS: &str = "s.id, s.user_id, s.university_id, s.status, s.risk_level, \
     s.fit_score, s.locked_at, s.notes, s.created_at, s.updated_at";

fn entry_from_row(r: &SqliteRow) -> Result<ShortlistEntry> {
    let status: String = r.try_get("status")?;
    let created_at: String = r.try_get("created_at")?;
    let updated_at: String = r.try_get("updated_at")?;
    Ok(ShortlistEntry {
        id: r.try_get("id")?,
        user_id: r.try_get("user_id")?,
        university_id: r.try_get("university_id")?,
        status: status.parse::<ShortlistStatus>()?,
        risk_level: db::parse_opt_enum::<RiskLevel>(r.try_get("risk_level")?)?,
        fit_score: r.try_get("fit_score")?,
        locked_at: db::parse_opt_ts(r.try_get("locked_at")?)?,
        notes: r.try_get("notes")?,
        created_at: db::parse_ts(&created_at)?,
        updated_at: db::parse_ts(&updated_at)?,
    })
}

/// Shortlist rows joined with their university summary, newest first.
pub async fn list_shortlist(pool: &DbPool, user_id: &str) -> Result<Vec<ShortlistedUniversity>> {
    let rows = sqlx::query(&format!(
        "SELECT {}, u.name AS u_name, u.country AS u_country, u.category AS u_category, \
         u.tuition_min AS u_tuition_min, u.tuition_max AS u_tuition_max \
         FROM shortlisted_universities s JOIN universities u ON u.id = s.university_id \
         WHERE s.user_id = ? ORDER BY s.created_at DESC",
        ENTRY_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for r in &rows {
        out.push(ShortlistedUniversity {
            entry: entry_from_row(r)?,
            universities: UniversitySummary {
                name: r.try_get("u_name")?,
                country: r.try_get("u_country")?,
                category: db::parse_opt_enum::<Category>(r.try_get("u_category")?)?,
                tuition_min: r.try_get("u_tuition_min")?,
                tuition_max: r.try_get("u_tuition_max")?,
            },
        });
    }
    Ok(out)
}

pub async fn get_entry(
    pool: &DbPool,
    user_id: &str,
    university_id: &str,
) -> Result<Option<ShortlistEntry>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM shortlisted_universities s WHERE s.user_id = ? AND s.university_id = ?",
        ENTRY_COLUMNS
    ))
    .bind(user_id)
    .bind(university_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(entry_from_row).transpose()
}

async fn require_entry(pool: &DbPool, user_id: &str, university_id: &str) -> Result<ShortlistEntry> {
    match get_entry(pool, user_id, university_id).await? {
        Some(e) => Ok(e),
        None => Err(CounsellorError::NotFound {
            entity: "shortlist entry",
            id: university_id.to_string(),
        }
        .into()),
    }
}

async fn initial_scores(
    pool: &DbPool,
    university_id: &str,
    requested: ShortlistScores,
) -> Result<(RiskLevel, i64)> {
    let university = catalog::get_university(pool, university_id).await?;
    let (risk, fit) = derive_risk_and_fit(university.category);
    Ok((
        requested.risk_level.unwrap_or(risk),
        requested.fit_score.unwrap_or(fit),
    ))
}

/// Adds a university to the shortlist. A second call for the same pair keeps the
/// existing row untouched (status and scores included) apart from `updated_at`.
pub async fn shortlist(
    pool: &DbPool,
    user_id: &str,
    university_id: &str,
    scores: ShortlistScores,
) -> Result<ShortlistEntry> {
    let (risk, fit) = initial_scores(pool, university_id, scores).await?;
    let now = db::now_text();

    sqlx::query(
        "INSERT INTO shortlisted_universities (id, user_id, university_id, status, risk_level, fit_score, created_at, updated_at) \
         VALUES (?, ?, ?, 'shortlisted', ?, ?, ?, ?) \
         ON CONFLICT(user_id, university_id) DO UPDATE SET updated_at = excluded.updated_at",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(university_id)
    .bind(risk.as_str())
    .bind(fit)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    profiles::advance_stage(pool, user_id, Stage::Finalizing).await?;
    tracing::debug!("Shortlisted {} for user {}", university_id, user_id);
    require_entry(pool, user_id, university_id).await
}

/// Locks a university, creating the shortlist row first when needed. Re-locking keeps the first `locked_at`.
pub async fn lock(pool: &DbPool, user_id: &str, university_id: &str) -> Result<ShortlistEntry> {
    let (risk, fit) = initial_scores(pool, university_id, ShortlistScores::default()).await?;
    let now = db::now_text();

    sqlx::query(
        "INSERT INTO shortlisted_universities (id, user_id, university_id, status, risk_level, fit_score, locked_at, created_at, updated_at) \
         VALUES (?, ?, ?, 'locked', ?, ?, ?, ?, ?) \
         ON CONFLICT(user_id, university_id) DO UPDATE SET \
         locked_at = CASE WHEN status = 'locked' THEN locked_at ELSE excluded.locked_at END, \
         status = 'locked', updated_at = excluded.updated_at",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(university_id)
    .bind(risk.as_str())
    .bind(fit)
    .bind(&now)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    profiles::advance_stage(pool, user_id, Stage::Applying).await?;
    tracing::info!("Locked {} for user {}", university_id, user_id);
    require_entry(pool, user_id, university_id).await
}

/// Returns a locked entry to shortlisted. Stage is left where it is.
pub async fn unlock(pool: &DbPool, user_id: &str, university_id: &str) -> Result<ShortlistEntry> {
    let result = sqlx::query(
        "UPDATE shortlisted_universities SET status = 'shortlisted', locked_at = NULL, updated_at = ? \
         WHERE user_id = ? AND university_id = ?",
    )
    .bind(db::now_text())
    .bind(user_id)
    .bind(university_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CounsellorError::NotFound {
            entity: "shortlist entry",
            id: university_id.to_string(),
        }
        .into());
    }
    require_entry(pool, user_id, university_id).await
}

pub async fn remove(pool: &DbPool, user_id: &str, university_id: &str) -> Result<bool> {
    let result = sqlx::query(
        "DELETE FROM shortlisted_universities WHERE user_id = ? AND university_id = ?",
    )
    .bind(user_id)
    .bind(university_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShortlistToggle {
    Added(ShortlistEntry),
    Removed,
}

/// The discovery screen's shortlist button: removes an existing entry, adds a missing one.
pub async fn toggle_shortlist(
    pool: &DbPool,
    user_id: &str,
    university_id: &str,
) -> Result<ShortlistToggle> {
    if remove(pool, user_id, university_id).await? {
        return Ok(ShortlistToggle::Removed);
    }
    let entry = shortlist(pool, user_id, university_id, ShortlistScores::default()).await?;
    Ok(ShortlistToggle::Added(entry))
}

/// The lock dialog: unlocks a locked entry, otherwise locks (creating the entry if needed).
pub async fn toggle_lock(pool: &DbPool, user_id: &str, university_id: &str) -> Result<ShortlistEntry> {
    match get_entry(pool, user_id, university_id).await? {
        Some(e) if e.is_locked() => unlock(pool, user_id, university_id).await,
        _ => lock(pool, user_id, university_id).await,
    }
}

pub async fn locked_count(pool: &DbPool, user_id: &str) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM shortlisted_universities WHERE user_id = ? AND status = 'locked'",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;
    Ok(n)
}
