use crate::db::{self, DbPool};
use crate::types::{Result, Role, WireMessage};
use uuid::Uuid;

/// Appends one user/assistant exchange atomically.
pub async fn append_exchange(
    pool: &DbPool,
    user_id: &str,
    user_content: &str,
    assistant_content: &str,
) -> Result<()> {
    let mut tx = pool.begin().await?;
    let now = db::now_text();

    for (role, content) in [(Role::User, user_content), (Role::Assistant, assistant_content)] {
        sqlx::query(
            "INSERT INTO chat_messages (id, user_id, role, content, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(role.as_str())
        .bind(content)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Stored log in insertion order.
pub async fn history(pool: &DbPool, user_id: &str) -> Result<Vec<WireMessage>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT role, content FROM chat_messages WHERE user_id = ? ORDER BY created_at ASC, rowid ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for (role, content) in rows {
        out.push(WireMessage {
            role: role.parse::<Role>()?,
            content,
        });
    }
    Ok(out)
}
