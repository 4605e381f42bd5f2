mod common;

use common::{seeded_db, stage_of, USER};
use counsellor::models::{
    Category, CompletionFilter, NewTodo, Priority, ProfileDetails, RiskLevel, ShortlistScores,
    ShortlistStatus, TodoFilter, UniversityFilter,
};
use counsellor::store::shortlist::ShortlistToggle;
use counsellor::store::{catalog, chat_log, profiles, shortlist, todos};
use counsellor::types::{CounsellorError, Role};

#[tokio::test]
async fn test_new_profile_starts_at_stage_one() {
    let (_dir, pool) = seeded_db().await;
    let p = match profiles::require_profile(&pool, USER).await {
        Ok(p) => p,
        Err(e) => panic!("Failed to load profile: {:?}", e),
    };
    assert_eq!(p.current_stage.number(), 1);
    assert!(!p.can_access_dashboard());
    assert_eq!(p.first_name(), Some("Ana"));
}

#[tokio::test]
async fn test_onboarding_moves_to_discovery() {
    let (_dir, pool) = seeded_db().await;
    let details = ProfileDetails {
        gpa: Some("3.7".into()),
        preferred_countries: vec!["Canada".into(), "UK".into()],
        ..Default::default()
    };
    let p = match profiles::complete_onboarding(&pool, USER, &details).await {
        Ok(p) => p,
        Err(e) => panic!("Onboarding failed: {:?}", e),
    };
    assert_eq!(p.current_stage.number(), 2);
    assert!(p.onboarding_completed);
    assert_eq!(p.details.preferred_countries, vec!["Canada".to_string(), "UK".to_string()]);
    assert_eq!(p.strength().academics, "strong");
}

#[tokio::test]
async fn test_stage_never_decreases() {
    let (_dir, pool) = seeded_db().await;
    if let Err(e) = shortlist::lock(&pool, USER, "target-1").await {
        panic!("Lock failed: {:?}", e);
    }
    assert_eq!(stage_of(&pool, USER).await, 4);

    // Later onboarding and shortlisting must not pull the stage back.
    if let Err(e) = profiles::complete_onboarding(&pool, USER, &ProfileDetails::default()).await {
        panic!("Onboarding failed: {:?}", e);
    }
    if let Err(e) = shortlist::shortlist(&pool, USER, "safe-1", ShortlistScores::default()).await {
        panic!("Shortlist failed: {:?}", e);
    }
    assert_eq!(stage_of(&pool, USER).await, 4);
}

#[tokio::test]
async fn test_shortlist_twice_creates_no_duplicate() {
    let (_dir, pool) = seeded_db().await;
    let first = match shortlist::shortlist(&pool, USER, "dream-1", ShortlistScores::default()).await {
        Ok(e) => e,
        Err(e) => panic!("Shortlist failed: {:?}", e),
    };
    let second = match shortlist::shortlist(
        &pool,
        USER,
        "dream-1",
        ShortlistScores {
            risk_level: Some(RiskLevel::Low),
            fit_score: Some(99),
        },
    )
    .await
    {
        Ok(e) => e,
        Err(e) => panic!("Second shortlist failed: {:?}", e),
    };

    assert_eq!(first.id, second.id);
    // Scores are fixed at creation.
    assert_eq!(second.risk_level, Some(RiskLevel::High));
    assert_eq!(second.fit_score, Some(60));

    let rows = match shortlist::list_shortlist(&pool, USER).await {
        Ok(r) => r,
        Err(e) => panic!("List failed: {:?}", e),
    };
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].universities.name, "Stanford University");
    assert_eq!(stage_of(&pool, USER).await, 3);
}

#[tokio::test]
async fn test_lock_unlock_cycle() {
    let (_dir, pool) = seeded_db().await;
    let locked = match shortlist::toggle_lock(&pool, USER, "safe-1").await {
        Ok(e) => e,
        Err(e) => panic!("Lock failed: {:?}", e),
    };
    assert_eq!(locked.status, ShortlistStatus::Locked);
    assert!(locked.locked_at.is_some());
    assert_eq!(locked.risk_level, Some(RiskLevel::Low));
    assert_eq!(locked.fit_score, Some(90));

    let relocked = match shortlist::lock(&pool, USER, "safe-1").await {
        Ok(e) => e,
        Err(e) => panic!("Relock failed: {:?}", e),
    };
    assert_eq!(relocked.locked_at, locked.locked_at);

    let unlocked = match shortlist::toggle_lock(&pool, USER, "safe-1").await {
        Ok(e) => e,
        Err(e) => panic!("Unlock failed: {:?}", e),
    };
    assert_eq!(unlocked.status, ShortlistStatus::Shortlisted);
    assert!(unlocked.locked_at.is_none());
    assert_eq!(stage_of(&pool, USER).await, 4);

    match shortlist::locked_count(&pool, USER).await {
        Ok(n) => assert_eq!(n, 0),
        Err(e) => panic!("Count failed: {:?}", e),
    }
}

#[tokio::test]
async fn test_toggle_shortlist_adds_then_removes() {
    let (_dir, pool) = seeded_db().await;
    match shortlist::toggle_shortlist(&pool, USER, "target-1").await {
        Ok(ShortlistToggle::Added(e)) => assert_eq!(e.university_id, "target-1"),
        other => panic!("Expected Added, got {:?}", other),
    }
    match shortlist::toggle_shortlist(&pool, USER, "target-1").await {
        Ok(ShortlistToggle::Removed) => {}
        other => panic!("Expected Removed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_university_is_not_found() {
    let (_dir, pool) = seeded_db().await;
    match shortlist::lock(&pool, USER, "nowhere").await {
        Err(e) => assert!(matches!(e.inner, CounsellorError::NotFound { .. })),
        Ok(e) => panic!("Expected NotFound, got {:?}", e),
    }
    match shortlist::unlock(&pool, USER, "dream-1").await {
        Err(e) => assert!(matches!(e.inner, CounsellorError::NotFound { .. })),
        Ok(e) => panic!("Expected NotFound, got {:?}", e),
    }
}

#[tokio::test]
async fn test_catalog_filter_and_order() {
    let (_dir, pool) = seeded_db().await;
    let all = match catalog::list_universities(&pool, &UniversityFilter::default()).await {
        Ok(u) => u,
        Err(e) => panic!("List failed: {:?}", e),
    };
    let ids: Vec<&str> = all.iter().map(|u| u.id.as_str()).collect();
    assert_eq!(ids, vec!["dream-1", "target-1", "safe-1"]);

    let filter = UniversityFilter {
        search: Some("toronto".into()),
        ..Default::default()
    };
    match catalog::list_universities(&pool, &filter).await {
        Ok(u) => {
            assert_eq!(u.len(), 1);
            assert_eq!(u[0].category, Some(Category::Target));
            assert_eq!(u[0].programs, vec!["Computer Science".to_string()]);
        }
        Err(e) => panic!("Filter failed: {:?}", e),
    }

    match catalog::list_countries(&pool).await {
        Ok(c) => assert_eq!(c, vec!["Canada".to_string(), "UK".to_string(), "USA".to_string()]),
        Err(e) => panic!("Countries failed: {:?}", e),
    }
}

#[tokio::test]
async fn test_catalog_reimport_keeps_shortlist() {
    let (_dir, pool) = seeded_db().await;
    if let Err(e) = shortlist::shortlist(&pool, USER, "dream-1", ShortlistScores::default()).await {
        panic!("Shortlist failed: {:?}", e);
    }
    let updated = vec![common::university(
        "dream-1",
        "Stanford University",
        "USA",
        Some(Category::Dream),
        Some(2),
    )];
    if let Err(e) = catalog::import_universities(&pool, updated).await {
        panic!("Reimport failed: {:?}", e);
    }
    match shortlist::list_shortlist(&pool, USER).await {
        Ok(rows) => assert_eq!(rows.len(), 1),
        Err(e) => panic!("List failed: {:?}", e),
    }
}

#[tokio::test]
async fn test_todo_lifecycle_and_ordering() {
    let (_dir, pool) = seeded_db().await;
    let low = NewTodo {
        title: "Book IELTS".into(),
        priority: Priority::Low,
        ..Default::default()
    };
    let high = NewTodo {
        title: "Submit SOP".into(),
        priority: Priority::High,
        category: Some("documents".into()),
        ..Default::default()
    };
    let low = match todos::create_todo(&pool, USER, &low).await {
        Ok(t) => t,
        Err(e) => panic!("Create failed: {:?}", e),
    };
    let high = match todos::create_todo(&pool, USER, &high).await {
        Ok(t) => t,
        Err(e) => panic!("Create failed: {:?}", e),
    };
    assert!(!high.completed);

    match todos::list_todos(&pool, USER, &TodoFilter::default()).await {
        Ok(list) => {
            let titles: Vec<&str> = list.iter().map(|t| t.title.as_str()).collect();
            assert_eq!(titles, vec!["Submit SOP", "Book IELTS"]);
        }
        Err(e) => panic!("List failed: {:?}", e),
    }

    let done = match todos::toggle_completed(&pool, USER, &high.id).await {
        Ok(t) => t,
        Err(e) => panic!("Toggle failed: {:?}", e),
    };
    assert!(done.completed);
    assert!(done.completed_at.is_some());

    let pending = TodoFilter {
        completion: CompletionFilter::Pending,
        category: None,
    };
    match todos::list_todos(&pool, USER, &pending).await {
        Ok(list) => {
            assert_eq!(list.len(), 1);
            assert_eq!(list[0].id, low.id);
        }
        Err(e) => panic!("List failed: {:?}", e),
    }

    if let Err(e) = todos::delete_todo(&pool, USER, &low.id).await {
        panic!("Delete failed: {:?}", e);
    }
    match todos::delete_todo(&pool, USER, &low.id).await {
        Err(e) => assert!(matches!(e.inner, CounsellorError::NotFound { .. })),
        Ok(()) => panic!("Second delete should fail"),
    }
}

#[tokio::test]
async fn test_chat_log_keeps_exchange_order() {
    let (_dir, pool) = seeded_db().await;
    if let Err(e) = chat_log::append_exchange(&pool, USER, "Hi", "Hello Ana").await {
        panic!("Append failed: {:?}", e);
    }
    match chat_log::history(&pool, USER).await {
        Ok(h) => {
            assert_eq!(h.len(), 2);
            assert_eq!(h[0].role, Role::User);
            assert_eq!(h[0].content, "Hi");
            assert_eq!(h[1].role, Role::Assistant);
        }
        Err(e) => panic!("History failed: {:?}", e),
    }
}

#[tokio::test]
async fn test_profile_edit_keeps_stage_and_onboarding() {
    let (_dir, pool) = seeded_db().await;
    let onboarded = ProfileDetails {
        gpa: Some("3.2".into()),
        sop_status: Some("draft".into()),
        ..Default::default()
    };
    if let Err(e) = profiles::complete_onboarding(&pool, USER, &onboarded).await {
        panic!("Onboarding failed: {:?}", e);
    }
    if let Err(e) = shortlist::lock(&pool, USER, "dream-1").await {
        panic!("Lock failed: {:?}", e);
    }

    let current = match profiles::require_profile(&pool, USER).await {
        Ok(p) => p,
        Err(e) => panic!("Failed to load profile: {:?}", e),
    };
    let edited = match current
        .details
        .with_patch(&serde_json::json!({"gpa": "3.9", "budget_range": "30k-50k"}))
    {
        Ok(d) => d,
        Err(e) => panic!("Patch failed: {:?}", e),
    };
    let p = match profiles::update_details(&pool, USER, &edited).await {
        Ok(p) => p,
        Err(e) => panic!("Update failed: {:?}", e),
    };

    assert_eq!(p.details.gpa.as_deref(), Some("3.9"));
    assert_eq!(p.details.budget_range.as_deref(), Some("30k-50k"));
    assert_eq!(p.details.sop_status.as_deref(), Some("draft"));
    assert!(p.onboarding_completed);
    assert_eq!(p.current_stage.number(), 4);
}

#[tokio::test]
async fn test_profile_edit_without_profile_is_not_found() {
    let (_dir, pool) = seeded_db().await;
    match profiles::update_details(&pool, "nobody", &ProfileDetails::default()).await {
        Err(e) => assert!(matches!(e.inner, CounsellorError::NotFound { .. })),
        Ok(p) => panic!("Expected NotFound, got {:?}", p),
    }
}

#[tokio::test]
async fn test_recent_todos_are_newest_first_and_limited() {
    let (_dir, pool) = seeded_db().await;
    let mut ids = Vec::new();
    for i in 0..7 {
        let new = NewTodo {
            title: format!("Task {}", i),
            ..Default::default()
        };
        match todos::create_todo(&pool, USER, &new).await {
            Ok(t) => ids.push(t.id),
            Err(e) => panic!("Create failed: {:?}", e),
        }
    }
    // Completed tasks still count as recent.
    if let Err(e) = todos::toggle_completed(&pool, USER, &ids[6]).await {
        panic!("Toggle failed: {:?}", e);
    }

    let recent = match todos::list_recent(&pool, USER, 5).await {
        Ok(r) => r,
        Err(e) => panic!("Recent failed: {:?}", e),
    };
    let titles: Vec<&str> = recent.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["Task 6", "Task 5", "Task 4", "Task 3", "Task 2"]);
    assert!(recent[0].completed);

    match todos::list_recent(&pool, "nobody", 5).await {
        Ok(r) => assert!(r.is_empty()),
        Err(e) => panic!("Recent failed: {:?}", e),
    }
}
