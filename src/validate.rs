//! Input checks applied before anything is written to the database.
//!
//! The summary engine accepts whatever it is given; these rules keep stored
//! data inside the ranges the engine is designed around.

use thiserror::Error;
use uuid::Uuid;

use crate::models::{CategoryDefinition, ClassRecord, UserProfile};
use crate::summary::normalize_category;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Class name is required.")]
    EmptyClassName,
    #[error("Title is required.")]
    EmptyTitle,
    #[error("Category name is required.")]
    EmptyCategoryName,
    #[error("Weight must be 1–100 (got {0}).")]
    WeightOutOfRange(f64),
    #[error("{field} must be a non-negative number (got {value}).")]
    InvalidPoints { field: &'static str, value: f64 },
    #[error("A category named \"{0}\" already exists for this class.")]
    DuplicateCategory(String),
    #[error("A class named \"{0}\" already exists.")]
    DuplicateClass(String),
    #[error("Username cannot be empty.")]
    EmptyUsername,
    #[error("Username already in use.")]
    UsernameTaken,
    #[error("Group name is required.")]
    EmptyGroupName,
}

fn required(value: &str, error: ValidationError) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(error)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn class_name(value: &str) -> Result<String, ValidationError> {
    required(value, ValidationError::EmptyClassName)
}

pub fn grade_title(value: &str) -> Result<String, ValidationError> {
    required(value, ValidationError::EmptyTitle)
}

pub fn category_name(value: &str) -> Result<String, ValidationError> {
    required(value, ValidationError::EmptyCategoryName)
}

pub fn group_name(value: &str) -> Result<String, ValidationError> {
    required(value, ValidationError::EmptyGroupName)
}

/// Usernames are stored lower-cased, which makes them unique regardless of case.
pub fn username(value: &str) -> Result<String, ValidationError> {
    required(value, ValidationError::EmptyUsername).map(|name| name.to_lowercase())
}

/// A blank display name clears it.
pub fn display_name(value: &str) -> Option<String> {
    Some(value.trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

pub fn weight_percent(value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() && value > 0.0 && value <= 100.0 {
        Ok(value)
    } else {
        Err(ValidationError::WeightOutOfRange(value))
    }
}

pub fn points(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ValidationError::InvalidPoints { field, value })
    }
}

/// Blank labels are stored as NULL so they land in the uncategorized bucket.
pub fn grade_category(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(str::to_string)
}

/// Rejects `candidate` when another category of the class normalizes to the
/// same name. `exclude_id` skips the row being renamed.
pub fn ensure_unique_category(
    existing: &[CategoryDefinition],
    candidate: &str,
    exclude_id: Option<Uuid>,
) -> Result<(), ValidationError> {
    let key = normalize_category(Some(candidate));
    let clash = existing
        .iter()
        .filter(|category| exclude_id.is_none() || category.id != exclude_id)
        .find(|category| normalize_category(Some(&category.name)) == key);

    match clash {
        Some(category) => Err(ValidationError::DuplicateCategory(category.name.clone())),
        None => Ok(()),
    }
}

fn name_key(value: &str) -> String {
    value.trim().to_lowercase()
}

pub fn ensure_unique_class(
    existing: &[ClassRecord],
    candidate: &str,
    exclude_id: Option<Uuid>,
) -> Result<(), ValidationError> {
    let key = name_key(candidate);
    let clash = existing
        .iter()
        .filter(|class| Some(class.id) != exclude_id)
        .find(|class| name_key(&class.name) == key);

    match clash {
        Some(class) => Err(ValidationError::DuplicateClass(class.name.clone())),
        None => Ok(()),
    }
}

/// `existing` holds the users whose names might clash; `current` is the user
/// being renamed.
pub fn ensure_unique_username(
    existing: &[UserProfile],
    candidate: &str,
    current: Uuid,
) -> Result<(), ValidationError> {
    let key = name_key(candidate);
    if existing
        .iter()
        .any(|user| user.id != current && name_key(&user.username) == key)
    {
        Err(ValidationError::UsernameTaken)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(name: &str) -> CategoryDefinition {
        CategoryDefinition {
            id: Some(Uuid::new_v4()),
            name: name.to_string(),
            weight_percent: 25.0,
        }
    }

    #[test]
    fn trims_required_text() {
        assert_eq!(class_name("  Algebra II "), Ok("Algebra II".to_string()));
        assert_eq!(grade_title("\tQuiz 1\n"), Ok("Quiz 1".to_string()));
        assert_eq!(class_name("   "), Err(ValidationError::EmptyClassName));
        assert_eq!(grade_title(""), Err(ValidationError::EmptyTitle));
        assert_eq!(category_name(" "), Err(ValidationError::EmptyCategoryName));
    }

    #[test]
    fn weight_bounds() {
        assert_eq!(weight_percent(100.0), Ok(100.0));
        assert_eq!(weight_percent(0.5), Ok(0.5));
        assert!(weight_percent(0.0).is_err());
        assert!(weight_percent(-10.0).is_err());
        assert!(weight_percent(100.01).is_err());
        assert!(weight_percent(f64::NAN).is_err());
    }

    #[test]
    fn points_must_be_non_negative() {
        assert_eq!(points("points_possible", 0.0), Ok(0.0));
        assert_eq!(
            points("points_earned", -1.0),
            Err(ValidationError::InvalidPoints {
                field: "points_earned",
                value: -1.0
            })
        );
        assert!(points("points_earned", f64::INFINITY).is_err());
    }

    #[test]
    fn blank_grade_category_becomes_none() {
        assert_eq!(grade_category(Some("  ")), None);
        assert_eq!(grade_category(None), None);
        assert_eq!(grade_category(Some(" Labs ")), Some("Labs".to_string()));
    }

    #[test]
    fn duplicate_names_collide_case_insensitively() {
        let existing = vec![stored("Homework"), stored("Tests")];

        assert_eq!(
            ensure_unique_category(&existing, "  homework ", None),
            Err(ValidationError::DuplicateCategory("Homework".to_string()))
        );
        assert!(ensure_unique_category(&existing, "Quizzes", None).is_ok());
    }

    #[test]
    fn renaming_a_category_to_itself_is_allowed() {
        let existing = vec![stored("Homework"), stored("Tests")];
        let id = existing[0].id;

        assert!(ensure_unique_category(&existing, "HOMEWORK", id).is_ok());
        assert!(ensure_unique_category(&existing, "tests", id).is_err());
    }

    fn class(name: &str) -> ClassRecord {
        ClassRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            period: None,
            teacher: None,
            created_at: chrono::Utc::now(),
        }
    }

    fn user(username: &str) -> UserProfile {
        UserProfile {
            id: Uuid::new_v4(),
            username: username.to_string(),
            display_name: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn class_rename_clashes_with_sibling_only() {
        let existing = vec![class("Biology"), class("Algebra II")];

        assert_eq!(
            ensure_unique_class(&existing, " algebra ii", Some(existing[0].id)),
            Err(ValidationError::DuplicateClass("Algebra II".to_string()))
        );
        assert!(ensure_unique_class(&existing, "BIOLOGY", Some(existing[0].id)).is_ok());
        assert!(ensure_unique_class(&existing, "Biology", None).is_err());
        assert!(ensure_unique_class(&existing, "Chemistry", None).is_ok());
    }

    #[test]
    fn usernames_are_trimmed_and_lowercased() {
        assert_eq!(username("  Avery.Lee "), Ok("avery.lee".to_string()));
        assert_eq!(username("  "), Err(ValidationError::EmptyUsername));
        assert_eq!(group_name(""), Err(ValidationError::EmptyGroupName));
    }

    #[test]
    fn blank_display_name_clears_it() {
        assert_eq!(display_name("  Avery  "), Some("Avery".to_string()));
        assert_eq!(display_name("   "), None);
    }

    #[test]
    fn rename_rejects_names_held_by_other_users() {
        let me = user("avery");
        let other = user("jules");
        let existing = vec![me.clone(), other];

        assert_eq!(
            ensure_unique_username(&existing, "JULES", me.id),
            Err(ValidationError::UsernameTaken)
        );
        assert!(ensure_unique_username(&existing, "Avery", me.id).is_ok());
        assert!(ensure_unique_username(&existing, "kiara", me.id).is_ok());
    }

    #[test]
    fn messages_are_readable() {
        assert_eq!(
            ValidationError::WeightOutOfRange(120.0).to_string(),
            "Weight must be 1–100 (got 120)."
        );
    }
}
