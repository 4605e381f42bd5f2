use crate::db::DbPool;
use crate::models::{Profile, ShortlistedUniversity, Todo};
use crate::store::{profiles, shortlist, todos};
use crate::types::Result;
use serde::{Deserialize, Serialize};

/// Side data sent with every chat request so the assistant can personalise its answer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CounsellorContext {
    pub profile: Option<Profile>,
    #[serde(default)]
    pub shortlisted_universities: Vec<ShortlistedUniversity>,
    #[serde(default)]
    pub pending_todos: Vec<Todo>,
}

pub async fn build_context(pool: &DbPool, user_id: &str) -> Result<CounsellorContext> {
    let (profile, shortlisted, pending) = tokio::try_join!(
        profiles::get_profile(pool, user_id),
        shortlist::list_shortlist(pool, user_id),
        todos::list_pending(pool, user_id),
    )?;

    tracing::debug!(
        "Context for {}: profile={} shortlisted={} pending_todos={}",
        user_id,
        profile.is_some(),
        shortlisted.len(),
        pending.len()
    );

    Ok(CounsellorContext {
        profile,
        shortlisted_universities: shortlisted,
        pending_todos: pending,
    })
}
