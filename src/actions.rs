//! Directives the assistant embeds in its stream, and their effect on the store.

use crate::db::DbPool;
use crate::models::{parse_due_date, NewTodo, Priority, RiskLevel, ShortlistEntry, ShortlistScores, Todo};
use crate::session::SessionEvent;
use crate::store::{shortlist, todos};
use crate::types::{CounsellorError, Result};
use serde::Deserialize;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Deserialize)]
pub struct RawAction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    ShortlistUniversity {
        university_id: String,
        scores: ShortlistScores,
    },
    LockUniversity {
        university_id: String,
    },
    CreateTodo(NewTodo),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShortlistData {
    university_id: String,
    #[serde(default)]
    risk_level: Option<serde_json::Value>,
    #[serde(default)]
    fit_score: Option<serde_json::Value>,
}

/// Accepts `"high"` style strings; anything else falls back to the derived risk.
fn lenient_risk(raw: Option<serde_json::Value>) -> Option<RiskLevel> {
    match raw? {
        serde_json::Value::String(r) => match r.parse::<RiskLevel>() {
            Ok(level) => Some(level),
            Err(e) => {
                tracing::warn!("Ignoring riskLevel from action: {}", e);
                None
            }
        },
        serde_json::Value::Null => None,
        other => {
            tracing::warn!("Ignoring riskLevel from action: {}", other);
            None
        }
    }
}

/// Accepts a number or a numeric string, rounded; anything else falls back to the derived fit.
fn lenient_fit(raw: Option<serde_json::Value>) -> Option<i64> {
    let score = match raw? {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        serde_json::Value::String(s) => s
            .trim()
            .trim_end_matches('%')
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| f.round() as i64),
        serde_json::Value::Null => return None,
        _ => None,
    };
    if score.is_none() {
        tracing::warn!("Ignoring unreadable fitScore from action");
    }
    score
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockData {
    university_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTodoData {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    due_date: Option<String>,
    #[serde(default)]
    university_id: Option<String>,
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl Action {
    /// Validates a raw directive. `Ok(None)` means the type is not one we handle.
    pub fn parse(raw: RawAction) -> Result<Option<Action>> {
        let action = match raw.kind.as_str() {
            "shortlist_university" => {
                let d: ShortlistData = serde_json::from_value(raw.data)?;
                Action::ShortlistUniversity {
                    university_id: d.university_id,
                    scores: ShortlistScores {
                        risk_level: lenient_risk(d.risk_level),
                        fit_score: lenient_fit(d.fit_score),
                    },
                }
            }
            "lock_university" => {
                let d: LockData = serde_json::from_value(raw.data)?;
                Action::LockUniversity {
                    university_id: d.university_id,
                }
            }
            "create_todo" => {
                let d: CreateTodoData = serde_json::from_value(raw.data)?;
                let title = match non_empty(d.title) {
                    Some(t) => t,
                    None => {
                        return Err(
                            CounsellorError::Validation("create_todo needs a title".into()).into(),
                        )
                    }
                };
                let priority = match d.priority.as_deref() {
                    Some(p) => p.parse::<Priority>().unwrap_or_else(|e| {
                        tracing::warn!("Unknown todo priority, using medium: {}", e);
                        Priority::default()
                    }),
                    None => Priority::default(),
                };
                let due_date = match d.due_date.as_deref() {
                    Some(raw_date) => {
                        let parsed = parse_due_date(raw_date);
                        if parsed.is_none() && !raw_date.trim().is_empty() {
                            tracing::warn!("Dropping unparsable dueDate {:?}", raw_date);
                        }
                        parsed
                    }
                    None => None,
                };
                Action::CreateTodo(NewTodo {
                    title,
                    description: non_empty(d.description),
                    category: non_empty(d.category),
                    priority,
                    due_date,
                    university_id: non_empty(d.university_id),
                })
            }
            _ => return Ok(None),
        };
        Ok(Some(action))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Action::ShortlistUniversity { .. } => "shortlist_university",
            Action::LockUniversity { .. } => "lock_university",
            Action::CreateTodo(_) => "create_todo",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Shortlisted(ShortlistEntry),
    Locked(ShortlistEntry),
    TodoCreated(Todo),
}

/// Applies assistant actions for one user and tells observers to re-fetch afterwards.
#[derive(Clone)]
pub struct ActionDispatcher {
    pool: DbPool,
    user_id: String,
    events: broadcast::Sender<SessionEvent>,
}

impl ActionDispatcher {
    pub fn new(pool: DbPool, user_id: impl Into<String>, events: broadcast::Sender<SessionEvent>) -> Self {
        Self {
            pool,
            user_id: user_id.into(),
            events,
        }
    }

    pub async fn apply(&self, action: &Action) -> Result<ActionOutcome> {
        match action {
            Action::ShortlistUniversity {
                university_id,
                scores,
            } => {
                let entry = shortlist::shortlist(&self.pool, &self.user_id, university_id, *scores).await?;
                Ok(ActionOutcome::Shortlisted(entry))
            }
            Action::LockUniversity { university_id } => {
                let entry = shortlist::lock(&self.pool, &self.user_id, university_id).await?;
                Ok(ActionOutcome::Locked(entry))
            }
            Action::CreateTodo(new) => {
                let todo = todos::create_todo(&self.pool, &self.user_id, new).await?;
                Ok(ActionOutcome::TodoCreated(todo))
            }
        }
    }

    /// Best-effort: failures are logged and swallowed. A refresh is broadcast after every attempt.
    pub async fn dispatch(&self, raw: &serde_json::Value) -> Option<ActionOutcome> {
        let outcome = self.try_dispatch(raw).await;
        let _ = self.events.send(SessionEvent::Refresh);
        outcome
    }

    async fn try_dispatch(&self, raw: &serde_json::Value) -> Option<ActionOutcome> {
        let raw: RawAction = match serde_json::from_value(raw.clone()) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("[🌐 -> 🗄️ ] Ignoring malformed action: {}", e);
                return None;
            }
        };

        let kind = raw.kind.clone();
        let action = match Action::parse(raw) {
            Ok(Some(a)) => a,
            Ok(None) => {
                tracing::warn!("[🌐 -> 🗄️ ] Ignoring unknown action type {:?}", kind);
                return None;
            }
            Err(e) => {
                tracing::warn!("[🌐 -> 🗄️ ] Invalid {} action: {}", kind, e);
                return None;
            }
        };

        match self.apply(&action).await {
            Ok(outcome) => {
                tracing::info!("[🌐 -> 🗄️ ] Applied {} for user {}", action.kind(), self.user_id);
                let _ = self.events.send(SessionEvent::ActionApplied(outcome.clone()));
                Some(outcome)
            }
            Err(e) => {
                tracing::error!("[🌐 -> 🗄️ ] Action {} failed: {}", action.kind(), e);
                None
            }
        }
    }
}
