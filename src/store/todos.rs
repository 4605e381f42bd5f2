use crate::db::{self, DbPool};
use crate::models::{NewTodo, Priority, Todo, TodoFilter};
use crate::types::{CounsellorError, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

const TODO_COLUMNS: &str = "id, user_id, title, description, category, priority, due_date, \
     completed, completed_at, university_id, created_at, updated_at";

const PRIORITY_ORDER: &str =
    "CASE priority WHEN 'high' THEN 0 WHEN 'medium' THEN 1 WHEN 'low' THEN 2 ELSE 3 END";

fn todo_from_row(r: &SqliteRow) -> Result<Todo> {
    let created_at: String = r.try_get("created_at")?;
    let updated_at: String = r.try_get("updated_at")?;
    Ok(Todo {
        id: r.try_get("id")?,
        user_id: r.try_get("user_id")?,
        title: r.try_get("title")?,
        description: r.try_get("description")?,
        category: r.try_get("category")?,
        priority: db::parse_opt_enum::<Priority>(r.try_get("priority")?)?,
        due_date: db::parse_opt_date(r.try_get("due_date")?)?,
        completed: r.try_get("completed")?,
        completed_at: db::parse_opt_ts(r.try_get("completed_at")?)?,
        university_id: r.try_get("university_id")?,
        created_at: db::parse_ts(&created_at)?,
        updated_at: db::parse_ts(&updated_at)?,
    })
}

/// Open tasks first, then by priority (high first), then by due date with undated last.
pub async fn list_todos(pool: &DbPool, user_id: &str, filter: &TodoFilter) -> Result<Vec<Todo>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM todos WHERE user_id = ? \
         ORDER BY completed ASC, {} ASC, due_date IS NULL, due_date ASC, created_at ASC",
        TODO_COLUMNS, PRIORITY_ORDER
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for r in &rows {
        let t = todo_from_row(r)?;
        if filter.matches(&t) {
            out.push(t);
        }
    }
    Ok(out)
}

pub async fn list_pending(pool: &DbPool, user_id: &str) -> Result<Vec<Todo>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM todos WHERE user_id = ? AND completed = 0 ORDER BY created_at ASC",
        TODO_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(todo_from_row).collect()
}

/// Newest tasks regardless of completion, for the dashboard.
pub async fn list_recent(pool: &DbPool, user_id: &str, limit: i64) -> Result<Vec<Todo>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM todos WHERE user_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ?",
        TODO_COLUMNS
    ))
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(todo_from_row).collect()
}

pub async fn get_todo(pool: &DbPool, user_id: &str, id: &str) -> Result<Todo> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM todos WHERE user_id = ? AND id = ?",
        TODO_COLUMNS
    ))
    .bind(user_id)
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(r) => todo_from_row(&r),
        None => Err(CounsellorError::NotFound {
            entity: "todo",
            id: id.to_string(),
        }
        .into()),
    }
}

pub async fn create_todo(pool: &DbPool, user_id: &str, new: &NewTodo) -> Result<Todo> {
    let title = new.title.trim();
    if title.is_empty() {
        return Err(CounsellorError::Validation("todo title is required".into()).into());
    }

    let id = Uuid::new_v4().to_string();
    let now = db::now_text();
    sqlx::query(
        "INSERT INTO todos (id, user_id, title, description, category, priority, due_date, completed, university_id, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)",
    )
    .bind(&id)
    .bind(user_id)
    .bind(title)
    .bind(&new.description)
    .bind(&new.category)
    .bind(new.priority.as_str())
    .bind(db::date_text(new.due_date))
    .bind(&new.university_id)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    tracing::debug!("Created todo {} for user {}", id, user_id);
    get_todo(pool, user_id, &id).await
}

pub async fn set_completed(pool: &DbPool, user_id: &str, id: &str, completed: bool) -> Result<Todo> {
    let now = db::now_text();
    let completed_at = if completed { Some(now.clone()) } else { None };

    let result = sqlx::query(
        "UPDATE todos SET completed = ?, completed_at = ?, updated_at = ? WHERE user_id = ? AND id = ?",
    )
    .bind(completed)
    .bind(completed_at)
    .bind(&now)
    .bind(user_id)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CounsellorError::NotFound {
            entity: "todo",
            id: id.to_string(),
        }
        .into());
    }
    get_todo(pool, user_id, id).await
}

pub async fn toggle_completed(pool: &DbPool, user_id: &str, id: &str) -> Result<Todo> {
    let current = get_todo(pool, user_id, id).await?;
    set_completed(pool, user_id, id, !current.completed).await
}

pub async fn delete_todo(pool: &DbPool, user_id: &str, id: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM todos WHERE user_id = ? AND id = ?")
        .bind(user_id)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(CounsellorError::NotFound {
            entity: "todo",
            id: id.to_string(),
        }
        .into());
    }
    Ok(())
}
