use crate::db::{self, DbPool};
use crate::models::{Category, NewUniversity, University, UniversityFilter};
use crate::types::{CounsellorError, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

const UNIVERSITY_COLUMNS: &str = "id, name, country, category, tuition_min, tuition_max, ranking, \
     acceptance_rate, programs, deadline_fall, deadline_spring, description, requirements";

fn university_from_row(r: &SqliteRow) -> Result<University> {
    let programs: String = r.try_get("programs")?;
    Ok(University {
        id: r.try_get("id")?,
        name: r.try_get("name")?,
        country: r.try_get("country")?,
        category: db::parse_opt_enum::<Category>(r.try_get("category")?)?,
        tuition_min: r.try_get("tuition_min")?,
        tuition_max: r.try_get("tuition_max")?,
        ranking: r.try_get("ranking")?,
        acceptance_rate: r.try_get("acceptance_rate")?,
        programs: db::parse_string_list(&programs)?,
        deadline_fall: db::parse_opt_date(r.try_get("deadline_fall")?)?,
        deadline_spring: db::parse_opt_date(r.try_get("deadline_spring")?)?,
        description: r.try_get("description")?,
        requirements: r.try_get("requirements")?,
    })
}

/// Catalog ordered by ranking, unranked entries last.
pub async fn list_universities(pool: &DbPool, filter: &UniversityFilter) -> Result<Vec<University>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM universities ORDER BY ranking IS NULL, ranking ASC, name ASC",
        UNIVERSITY_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for r in &rows {
        let u = university_from_row(r)?;
        if filter.matches(&u) {
            out.push(u);
        }
    }
    Ok(out)
}

pub async fn get_university(pool: &DbPool, id: &str) -> Result<University> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM universities WHERE id = ?",
        UNIVERSITY_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(r) => university_from_row(&r),
        None => Err(CounsellorError::NotFound {
            entity: "university",
            id: id.to_string(),
        }
        .into()),
    }
}

pub async fn list_countries(pool: &DbPool) -> Result<Vec<String>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT DISTINCT country FROM universities ORDER BY country")
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}

/// Upserts catalog records by id in one transaction. Existing shortlist rows keep pointing at the same ids.
pub async fn import_universities(pool: &DbPool, records: Vec<NewUniversity>) -> Result<usize> {
    let mut tx = pool.begin().await?;
    let now = db::now_text();
    let count = records.len();

    for rec in records {
        if rec.name.trim().is_empty() || rec.country.trim().is_empty() {
            return Err(CounsellorError::Validation(
                "catalog records need a name and a country".into(),
            )
            .into());
        }
        let id = match rec.id {
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };

        sqlx::query(
            "INSERT INTO universities (id, name, country, category, tuition_min, tuition_max, ranking, \
             acceptance_rate, programs, deadline_fall, deadline_spring, description, requirements, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, country = excluded.country, \
             category = excluded.category, tuition_min = excluded.tuition_min, \
             tuition_max = excluded.tuition_max, ranking = excluded.ranking, \
             acceptance_rate = excluded.acceptance_rate, programs = excluded.programs, \
             deadline_fall = excluded.deadline_fall, deadline_spring = excluded.deadline_spring, \
             description = excluded.description, requirements = excluded.requirements",
        )
        .bind(&id)
        .bind(rec.name.trim())
        .bind(rec.country.trim())
        .bind(rec.category.map(|c| c.as_str()))
        .bind(rec.tuition_min)
        .bind(rec.tuition_max)
        .bind(rec.ranking)
        .bind(&rec.acceptance_rate)
        .bind(db::string_list_text(&rec.programs)?)
        .bind(db::date_text(rec.deadline_fall))
        .bind(db::date_text(rec.deadline_spring))
        .bind(&rec.description)
        .bind(&rec.requirements)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    tracing::info!("Imported {} catalog records", count);
    Ok(count)
}
