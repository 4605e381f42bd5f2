//! Domain rows for the five tables plus the views derived from them.

use crate::types::CounsellorError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Text-backed enums: serde, `Display`, `FromStr` and `as_str` share one spelling.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = CounsellorError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(CounsellorError::Validation(format!(
                        "unknown {}: {:?}",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

text_enum!(
    /// Static catalog bucket a university sits in.
    Category { Dream => "dream", Target => "target", Safe => "safe" }
);

text_enum!(RiskLevel { Low => "low", Medium => "medium", High => "high" });

text_enum!(ShortlistStatus { Shortlisted => "shortlisted", Locked => "locked" });

text_enum!(Priority { Low => "low", Medium => "medium", High => "high" });

impl Priority {
    /// Sort key: high first.
    pub fn rank(&self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

/// Risk and fit assigned when an entry is first created. Unknown categories sit in the middle.
pub fn derive_risk_and_fit(category: Option<Category>) -> (RiskLevel, i64) {
    match category {
        Some(Category::Dream) => (RiskLevel::High, 60),
        Some(Category::Safe) => (RiskLevel::Low, 90),
        Some(Category::Target) | None => (RiskLevel::Medium, 75),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum Stage {
    Profile = 1,
    Discovery = 2,
    Finalizing = 3,
    Applying = 4,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Profile,
        Stage::Discovery,
        Stage::Finalizing,
        Stage::Applying,
    ];

    pub fn number(&self) -> i64 {
        *self as i64
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Profile => "Building Profile",
            Self::Discovery => "Discovering",
            Self::Finalizing => "Finalizing",
            Self::Applying => "Applying",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Profile => "Complete your profile",
            Self::Discovery => "Find universities",
            Self::Finalizing => "Lock your choices",
            Self::Applying => "Submit applications",
        }
    }
}

impl From<Stage> for i64 {
    fn from(s: Stage) -> Self {
        s.number()
    }
}

impl TryFrom<i64> for Stage {
    type Error = CounsellorError;

    fn try_from(n: i64) -> std::result::Result<Self, Self::Error> {
        match n {
            1 => Ok(Self::Profile),
            2 => Ok(Self::Discovery),
            3 => Ok(Self::Finalizing),
            4 => Ok(Self::Applying),
            other => Err(CounsellorError::Validation(format!(
                "stage out of range: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.number(), self.title())
    }
}

/// --- PROFILE ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: String,
    pub user_id: String,
    pub email: String,
    pub full_name: String,
    #[serde(flatten)]
    pub details: ProfileDetails,
    pub current_stage: Stage,
    pub onboarding_completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The academic, budget and exam answers collected during onboarding.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProfileDetails {
    pub education_level: Option<String>,
    pub degree_major: Option<String>,
    pub graduation_year: Option<i64>,
    pub gpa: Option<String>,
    pub intended_degree: Option<String>,
    pub field_of_study: Option<String>,
    pub target_intake_year: Option<i64>,
    #[serde(default)]
    pub preferred_countries: Vec<String>,
    pub budget_range: Option<String>,
    pub funding_plan: Option<String>,
    pub ielts_toefl_status: Option<String>,
    pub gre_gmat_status: Option<String>,
    pub sop_status: Option<String>,
}

impl Profile {
    pub fn first_name(&self) -> Option<&str> {
        self.full_name.split_whitespace().next()
    }

    pub fn can_access_dashboard(&self) -> bool {
        self.onboarding_completed
    }

    pub fn strength(&self) -> ProfileStrength {
        ProfileStrength::of(&self.details)
    }
}

impl ProfileDetails {
    /// Applies a JSON object of field edits; `null` clears a field, absent fields are kept.
    pub fn with_patch(&self, patch: &serde_json::Value) -> Result<ProfileDetails, CounsellorError> {
        let edits = match patch.as_object() {
            Some(o) => o,
            None => {
                return Err(CounsellorError::Validation(
                    "profile edits must be a JSON object".into(),
                ))
            }
        };
        let mut current = match serde_json::to_value(self)? {
            serde_json::Value::Object(m) => m,
            _ => return Err(CounsellorError::internal("profile details did not serialize to an object")),
        };
        for (key, value) in edits {
            match current.get_mut(key) {
                Some(slot) => *slot = value.clone(),
                None => {
                    return Err(CounsellorError::Validation(format!(
                        "unknown profile field: {}",
                        key
                    )))
                }
            }
        }
        Ok(serde_json::from_value(serde_json::Value::Object(current))?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileStrength {
    pub academics: &'static str,
    pub exams: &'static str,
    pub sop: String,
}

impl ProfileStrength {
    pub fn of(d: &ProfileDetails) -> Self {
        let academics = if d.gpa.as_deref().is_some_and(|g| !g.is_empty()) {
            "strong"
        } else if d.degree_major.as_deref().is_some_and(|m| !m.is_empty()) {
            "average"
        } else {
            "weak"
        };

        let exams = match d.ielts_toefl_status.as_deref() {
            Some(s) if s.contains("completed") => "completed",
            Some("preparing") => "in_progress",
            _ => "not_started",
        };

        let sop = match d.sop_status.as_deref() {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => "not_started".to_string(),
        };

        Self {
            academics,
            exams,
            sop,
        }
    }
}

/// --- CATALOG ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct University {
    pub id: String,
    pub name: String,
    pub country: String,
    pub category: Option<Category>,
    pub tuition_min: Option<i64>,
    pub tuition_max: Option<i64>,
    pub ranking: Option<i64>,
    pub acceptance_rate: Option<String>,
    #[serde(default)]
    pub programs: Vec<String>,
    pub deadline_fall: Option<NaiveDate>,
    pub deadline_spring: Option<NaiveDate>,
    pub description: Option<String>,
    pub requirements: Option<String>,
}

/// Catalog import record; `id` is generated when absent.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUniversity {
    pub id: Option<String>,
    pub name: String,
    pub country: String,
    pub category: Option<Category>,
    pub tuition_min: Option<i64>,
    pub tuition_max: Option<i64>,
    pub ranking: Option<i64>,
    pub acceptance_rate: Option<String>,
    #[serde(default)]
    pub programs: Vec<String>,
    pub deadline_fall: Option<NaiveDate>,
    pub deadline_spring: Option<NaiveDate>,
    pub description: Option<String>,
    pub requirements: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UniversityFilter {
    pub search: Option<String>,
    pub country: Option<String>,
    pub category: Option<Category>,
}

impl UniversityFilter {
    pub fn matches(&self, u: &University) -> bool {
        let matches_search = match self.search.as_deref().map(str::trim) {
            Some(q) if !q.is_empty() => {
                let q = q.to_lowercase();
                u.name.to_lowercase().contains(&q) || u.country.to_lowercase().contains(&q)
            }
            _ => true,
        };
        let matches_country = match &self.country {
            Some(c) => &u.country == c,
            None => true,
        };
        let matches_category = match self.category {
            Some(c) => u.category == Some(c),
            None => true,
        };
        matches_search && matches_country && matches_category
    }
}

/// --- SHORTLIST ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShortlistEntry {
    pub id: String,
    pub user_id: String,
    pub university_id: String,
    pub status: ShortlistStatus,
    pub risk_level: Option<RiskLevel>,
    pub fit_score: Option<i64>,
    pub locked_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShortlistEntry {
    pub fn is_locked(&self) -> bool {
        self.status == ShortlistStatus::Locked
    }
}

/// Joined university columns carried alongside a shortlist row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UniversitySummary {
    pub name: String,
    pub country: String,
    pub category: Option<Category>,
    pub tuition_min: Option<i64>,
    pub tuition_max: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShortlistedUniversity {
    #[serde(flatten)]
    pub entry: ShortlistEntry,
    pub universities: UniversitySummary,
}

/// Risk and fit to record when an entry is created; `None` fields fall back to the category.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ShortlistScores {
    pub risk_level: Option<RiskLevel>,
    pub fit_score: Option<i64>,
}

/// --- TODOS ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Todo {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<NaiveDate>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub university_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTodo {
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub university_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompletionFilter {
    #[default]
    All,
    Pending,
    Completed,
}

#[derive(Debug, Clone, Default)]
pub struct TodoFilter {
    pub completion: CompletionFilter,
    pub category: Option<String>,
}

impl TodoFilter {
    pub fn matches(&self, t: &Todo) -> bool {
        let completion_ok = match self.completion {
            CompletionFilter::All => true,
            CompletionFilter::Pending => !t.completed,
            CompletionFilter::Completed => t.completed,
        };
        let category_ok = match &self.category {
            Some(c) => t.category.as_deref() == Some(c.as_str()),
            None => true,
        };
        completion_ok && category_ok
    }
}

/// Lenient date parsing for assistant-supplied values: plain dates or full RFC 3339 timestamps.
pub fn parse_due_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d);
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => Some(dt.date_naive()),
        Err(_) => None,
    }
}
