use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StudyGroup {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A class on a study group's shared schedule. Grades stay personal.
#[derive(Debug, Clone, Serialize)]
pub struct GroupClass {
    pub id: Uuid,
    pub group_id: Uuid,
    pub name: String,
    pub period: Option<i32>,
    pub teacher: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassRecord {
    pub id: Uuid,
    pub name: String,
    pub period: Option<i32>,
    pub teacher: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A weighted grouping of assignments for one class.
///
/// `id` is `None` for definitions that were never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDefinition {
    pub id: Option<Uuid>,
    pub name: String,
    pub weight_percent: f64,
}

/// A single graded (or placeholder) assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub id: Option<Uuid>,
    pub title: String,
    pub points_earned: f64,
    pub points_possible: f64,
    pub category: Option<String>,
    pub due_date: Option<NaiveDate>,
}

/// One line of the per-category breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryRow {
    pub id: Option<Uuid>,
    pub name: String,
    pub weight_percent: f64,
    pub earned: f64,
    pub possible: f64,
    pub percent: Option<f64>,
    /// Set for rows synthesized from assignment labels with no matching
    /// definition.
    #[serde(skip)]
    pub orphan: bool,
}

impl CategoryRow {
    pub fn is_orphan(&self) -> bool {
        self.orphan
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResult {
    pub overall_percent: Option<f64>,
    pub categories: Vec<CategoryRow>,
    pub sum_weights: f64,
}

/// JSON body shape served for `GET /{class}/summary`.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub summary: SummaryResult,
}

impl From<SummaryResult> for SummaryResponse {
    fn from(summary: SummaryResult) -> Self {
        Self { ok: true, summary }
    }
}
