#![allow(dead_code)]

use counsellor::db::{init_db, DbPool};
use counsellor::models::{Category, NewUniversity};
use counsellor::store::{catalog, profiles};
use tempfile::TempDir;

pub const USER: &str = "user-1";

/// A migrated database in a fresh temp dir. Keep the `TempDir` alive for the pool's lifetime.
pub async fn test_db() -> (TempDir, DbPool) {
    let dir = match tempfile::tempdir() {
        Ok(d) => d,
        Err(e) => panic!("Failed to create temp dir: {:?}", e),
    };
    let pool = match init_db(dir.path().join("counsellor_test.db")).await {
        Ok(p) => p,
        Err(e) => panic!("Failed to init DB: {:?}", e),
    };
    (dir, pool)
}

pub fn university(id: &str, name: &str, country: &str, category: Option<Category>, ranking: Option<i64>) -> NewUniversity {
    NewUniversity {
        id: Some(id.to_string()),
        name: name.to_string(),
        country: country.to_string(),
        category,
        tuition_min: Some(20_000),
        tuition_max: Some(40_000),
        ranking,
        acceptance_rate: None,
        programs: vec!["Computer Science".to_string()],
        deadline_fall: None,
        deadline_spring: None,
        description: None,
        requirements: None,
    }
}

/// Profile for [`USER`] plus a three-university catalog: `dream-1`, `target-1`, `safe-1`.
pub async fn seeded_db() -> (TempDir, DbPool) {
    let (dir, pool) = test_db().await;
    if let Err(e) = profiles::create_profile(&pool, USER, "ana@example.com", "Ana Silva").await {
        panic!("Failed to create profile: {:?}", e);
    }
    let records = vec![
        university("dream-1", "Stanford University", "USA", Some(Category::Dream), Some(3)),
        university("target-1", "University of Toronto", "Canada", Some(Category::Target), Some(21)),
        university("safe-1", "University of Leeds", "UK", Some(Category::Safe), None),
    ];
    if let Err(e) = catalog::import_universities(&pool, records).await {
        panic!("Failed to import catalog: {:?}", e);
    }
    (dir, pool)
}

pub async fn stage_of(pool: &DbPool, user_id: &str) -> i64 {
    match profiles::require_profile(pool, user_id).await {
        Ok(p) => p.current_stage.number(),
        Err(e) => panic!("Failed to load profile: {:?}", e),
    }
}
