use crate::db::{self, DbPool};
use crate::models::{Profile, ProfileDetails, Stage};
use crate::types::{CounsellorError, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

const PROFILE_COLUMNS: &str = "id, user_id, email, full_name, education_level, degree_major, \
     graduation_year, gpa, intended_degree, field_of_study, target_intake_year, \
     preferred_countries, budget_range, funding_plan, ielts_toefl_status, gre_gmat_status, \
     sop_status, current_stage, onboarding_completed, created_at, updated_at";

fn profile_from_row(r: &SqliteRow) -> Result<Profile> {
    let countries: String = r.try_get("preferred_countries")?;
    let stage: i64 = r.try_get("current_stage")?;
    let created_at: String = r.try_get("created_at")?;
    let updated_at: String = r.try_get("updated_at")?;

    Ok(Profile {
        id: r.try_get("id")?,
        user_id: r.try_get("user_id")?,
        email: r.try_get("email")?,
        full_name: r.try_get("full_name")?,
        details: ProfileDetails {
            education_level: r.try_get("education_level")?,
            degree_major: r.try_get("degree_major")?,
            graduation_year: r.try_get("graduation_year")?,
            gpa: r.try_get("gpa")?,
            intended_degree: r.try_get("intended_degree")?,
            field_of_study: r.try_get("field_of_study")?,
            target_intake_year: r.try_get("target_intake_year")?,
            preferred_countries: db::parse_string_list(&countries)?,
            budget_range: r.try_get("budget_range")?,
            funding_plan: r.try_get("funding_plan")?,
            ielts_toefl_status: r.try_get("ielts_toefl_status")?,
            gre_gmat_status: r.try_get("gre_gmat_status")?,
            sop_status: r.try_get("sop_status")?,
        },
        current_stage: Stage::try_from(stage)?,
        onboarding_completed: r.try_get("onboarding_completed")?,
        created_at: db::parse_ts(&created_at)?,
        updated_at: db::parse_ts(&updated_at)?,
    })
}

/// Creates the empty stage-1 profile a new account starts with.
pub async fn create_profile(
    pool: &DbPool,
    user_id: &str,
    email: &str,
    full_name: &str,
) -> Result<Profile> {
    if full_name.trim().is_empty() {
        return Err(CounsellorError::Validation("full name is required".into()).into());
    }

    let now = db::now_text();
    sqlx::query(
        "INSERT INTO profiles (id, user_id, email, full_name, current_stage, onboarding_completed, created_at, updated_at) \
         VALUES (?, ?, ?, ?, 1, 0, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(email)
    .bind(full_name.trim())
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    tracing::info!("Created profile for user {}", user_id);
    require_profile(pool, user_id).await
}

pub async fn get_profile(pool: &DbPool, user_id: &str) -> Result<Option<Profile>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM profiles WHERE user_id = ?",
        PROFILE_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(profile_from_row).transpose()
}

pub async fn require_profile(pool: &DbPool, user_id: &str) -> Result<Profile> {
    match get_profile(pool, user_id).await? {
        Some(p) => Ok(p),
        None => Err(CounsellorError::NotFound {
            entity: "profile",
            id: user_id.to_string(),
        }
        .into()),
    }
}

async fn write_details(
    pool: &DbPool,
    user_id: &str,
    details: &ProfileDetails,
    completes_onboarding: bool,
) -> Result<()> {
    // Onboarding completion is sticky and only ever lifts the stage to Discovery.
    let sql = if completes_onboarding {
        "UPDATE profiles SET education_level = ?, degree_major = ?, graduation_year = ?, gpa = ?, \
         intended_degree = ?, field_of_study = ?, target_intake_year = ?, preferred_countries = ?, \
         budget_range = ?, funding_plan = ?, ielts_toefl_status = ?, gre_gmat_status = ?, \
         sop_status = ?, updated_at = ?, onboarding_completed = 1, \
         current_stage = MAX(current_stage, 2) WHERE user_id = ?"
    } else {
        "UPDATE profiles SET education_level = ?, degree_major = ?, graduation_year = ?, gpa = ?, \
         intended_degree = ?, field_of_study = ?, target_intake_year = ?, preferred_countries = ?, \
         budget_range = ?, funding_plan = ?, ielts_toefl_status = ?, gre_gmat_status = ?, \
         sop_status = ?, updated_at = ? WHERE user_id = ?"
    };

    let result = sqlx::query(sql)
        .bind(&details.education_level)
        .bind(&details.degree_major)
        .bind(details.graduation_year)
        .bind(&details.gpa)
        .bind(&details.intended_degree)
        .bind(&details.field_of_study)
        .bind(details.target_intake_year)
        .bind(db::string_list_text(&details.preferred_countries)?)
        .bind(&details.budget_range)
        .bind(&details.funding_plan)
        .bind(&details.ielts_toefl_status)
        .bind(&details.gre_gmat_status)
        .bind(&details.sop_status)
        .bind(db::now_text())
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(CounsellorError::NotFound {
            entity: "profile",
            id: user_id.to_string(),
        }
        .into());
    }
    Ok(())
}

/// Saves profile edits without touching stage or onboarding state.
pub async fn update_details(
    pool: &DbPool,
    user_id: &str,
    details: &ProfileDetails,
) -> Result<Profile> {
    write_details(pool, user_id, details, false).await?;
    require_profile(pool, user_id).await
}

pub async fn complete_onboarding(
    pool: &DbPool,
    user_id: &str,
    details: &ProfileDetails,
) -> Result<Profile> {
    write_details(pool, user_id, details, true).await?;
    tracing::info!("Onboarding completed for user {}", user_id);
    require_profile(pool, user_id).await
}

/// Moves `current_stage` up to `target`. Returns false when the profile was already there or beyond.
pub async fn advance_stage(pool: &DbPool, user_id: &str, target: Stage) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE profiles SET current_stage = ?, updated_at = ? WHERE user_id = ? AND current_stage < ?",
    )
    .bind(target.number())
    .bind(db::now_text())
    .bind(user_id)
    .bind(target.number())
    .execute(pool)
    .await?;

    let advanced = result.rows_affected() > 0;
    if advanced {
        tracing::info!("User {} advanced to stage {}", user_id, target);
    }
    Ok(advanced)
}
