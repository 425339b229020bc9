use anyhow::Context;
use chrono::NaiveDate;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{
    AssignmentRecord, CategoryDefinition, ClassRecord, GroupClass, StudyGroup, UserProfile,
};
use crate::validate;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let user_id = ensure_user(pool, "demo").await?;

    let classes = vec![
        ("Biology", Some(1), Some("Ms. Alvarez")),
        ("Algebra II", Some(2), Some("Mr. Chen")),
        ("World History", Some(3), None),
    ];

    let mut class_ids = Vec::new();
    for (name, period, teacher) in classes {
        let class_id: Uuid = sqlx::query(
            r#"
            INSERT INTO gradebook.classes (id, user_id, name, period, teacher)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, (lower(name))) DO UPDATE
            SET period = EXCLUDED.period, teacher = EXCLUDED.teacher
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(name)
        .bind(period)
        .bind(teacher)
        .fetch_one(pool)
        .await?
        .get("id");
        class_ids.push(class_id);
    }

    let categories = vec![
        (class_ids[0], "Tests", 60.0),
        (class_ids[0], "Homework", 40.0),
        (class_ids[1], "Quizzes", 30.0),
        (class_ids[1], "Exams", 50.0),
        (class_ids[1], "Homework", 20.0),
    ];

    for (class_id, name, weight) in categories {
        sqlx::query(
            r#"
            INSERT INTO gradebook.categories (id, user_id, class_id, name, weight_percent)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, class_id, (lower(btrim(name)))) DO UPDATE
            SET weight_percent = EXCLUDED.weight_percent
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(class_id)
        .bind(name)
        .bind(weight)
        .execute(pool)
        .await?;
    }

    let grades = vec![
        (class_ids[0], "Cell structure test", 42.0, 50.0, Some("Tests"), (2026, 9, 12)),
        (class_ids[0], "Lab safety worksheet", 10.0, 10.0, Some("homework"), (2026, 9, 5)),
        (class_ids[0], "Osmosis lab write-up", 17.0, 20.0, Some("Lab Reports"), (2026, 9, 19)),
        (class_ids[1], "Quiz 1: functions", 8.0, 10.0, Some("Quizzes"), (2026, 9, 8)),
        (class_ids[1], "Quiz 2: polynomials", 9.5, 10.0, Some(" quizzes "), (2026, 9, 22)),
        (class_ids[1], "Problem set 1", 18.0, 20.0, Some("Homework"), (2026, 9, 10)),
        (class_ids[2], "Map reading", 14.0, 15.0, None, (2026, 9, 9)),
        (class_ids[2], "Reading log", 0.0, 0.0, None, (2026, 9, 30)),
    ];

    for (class_id, title, earned, possible, category, (year, month, day)) in grades {
        let due_date = NaiveDate::from_ymd_opt(year, month, day).context("invalid date")?;
        sqlx::query(
            r#"
            INSERT INTO gradebook.grades
            (id, user_id, class_id, title, points_earned, points_possible, category, due_date)
            SELECT $1, $2, $3, $4, $5, $6, $7, $8
            WHERE NOT EXISTS (
                SELECT 1 FROM gradebook.grades WHERE class_id = $3 AND title = $4
            )
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(class_id)
        .bind(title)
        .bind(earned)
        .bind(possible)
        .bind(category)
        .bind(due_date)
        .execute(pool)
        .await?;
    }

    tracing::info!(%user_id, classes = class_ids.len(), "seeded demo gradebook");
    Ok(())
}

pub async fn ensure_user(pool: &PgPool, username: &str) -> anyhow::Result<Uuid> {
    let username = validate::username(username)?;

    let user_id: Uuid = sqlx::query(
        r#"
        INSERT INTO gradebook.users (id, username)
        VALUES ($1, $2)
        ON CONFLICT (username) DO UPDATE SET username = EXCLUDED.username
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&username)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to resolve user {username}"))?
    .get("id");

    Ok(user_id)
}

/// Looks a user up without creating one.
pub async fn find_user(pool: &PgPool, username: &str) -> anyhow::Result<Uuid> {
    let username = username.trim().to_lowercase();

    let user_id: Uuid = sqlx::query("SELECT id FROM gradebook.users WHERE username = $1")
        .bind(&username)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("User \"{username}\" not found."))?
        .get("id");

    Ok(user_id)
}

fn profile_from_row(row: &PgRow) -> UserProfile {
    UserProfile {
        id: row.get("id"),
        username: row.get("username"),
        display_name: row.get("display_name"),
        created_at: row.get("created_at"),
    }
}

pub async fn user_profile(pool: &PgPool, user_id: Uuid) -> anyhow::Result<UserProfile> {
    let row = sqlx::query(
        "SELECT id, username, display_name, created_at FROM gradebook.users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .context("User not found.")?;

    Ok(profile_from_row(&row))
}

pub async fn set_display_name(
    pool: &PgPool,
    user_id: Uuid,
    display_name: &str,
) -> anyhow::Result<UserProfile> {
    let display_name = validate::display_name(display_name);

    let row = sqlx::query(
        r#"
        UPDATE gradebook.users
        SET display_name = $2
        WHERE id = $1
        RETURNING id, username, display_name, created_at
        "#,
    )
    .bind(user_id)
    .bind(&display_name)
    .fetch_optional(pool)
    .await?
    .context("User not found.")?;

    Ok(profile_from_row(&row))
}

pub async fn rename_user(
    pool: &PgPool,
    user_id: Uuid,
    new_username: &str,
) -> anyhow::Result<UserProfile> {
    let username = validate::username(new_username)?;

    let rows = sqlx::query(
        r#"
        SELECT id, username, display_name, created_at
        FROM gradebook.users
        WHERE lower(username) = $1
        "#,
    )
    .bind(&username)
    .fetch_all(pool)
    .await?;
    let existing: Vec<UserProfile> = rows.iter().map(profile_from_row).collect();
    validate::ensure_unique_username(&existing, &username, user_id)?;

    let row = sqlx::query(
        r#"
        UPDATE gradebook.users
        SET username = $2
        WHERE id = $1
        RETURNING id, username, display_name, created_at
        "#,
    )
    .bind(user_id)
    .bind(&username)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to rename user to {username}"))?
    .context("User not found.")?;

    tracing::info!(%user_id, %username, "renamed user");
    Ok(profile_from_row(&row))
}

fn class_from_row(row: &PgRow) -> ClassRecord {
    ClassRecord {
        id: row.get("id"),
        name: row.get("name"),
        period: row.get("period"),
        teacher: row.get("teacher"),
        created_at: row.get("created_at"),
    }
}

fn category_from_row(row: &PgRow) -> CategoryDefinition {
    CategoryDefinition {
        id: row.get("id"),
        name: row.get("name"),
        weight_percent: row.get("weight_percent"),
    }
}

fn grade_from_row(row: &PgRow) -> AssignmentRecord {
    AssignmentRecord {
        id: row.get("id"),
        title: row.get("title"),
        points_earned: row.get("points_earned"),
        points_possible: row.get("points_possible"),
        category: row.get("category"),
        due_date: row.get("due_date"),
    }
}

// ----------------------------------------------------------------- classes

/// `(true, value)` when the field should be written, `(false, None)` when it
/// should be left alone.
fn field_change<T>(change: Option<Option<T>>) -> (bool, Option<T>) {
    match change {
        Some(value) => (true, value),
        None => (false, None),
    }
}

pub async fn create_class(
    pool: &PgPool,
    user_id: Uuid,
    name: &str,
    period: Option<i32>,
    teacher: Option<&str>,
) -> anyhow::Result<ClassRecord> {
    let name = validate::class_name(name)?;
    let existing = list_classes(pool, user_id).await?;
    validate::ensure_unique_class(&existing, &name, None)?;

    let row = sqlx::query(
        r#"
        INSERT INTO gradebook.classes (id, user_id, name, period, teacher)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, name, period, teacher, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(&name)
    .bind(period)
    .bind(teacher)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to create class {name}"))?;

    let class = class_from_row(&row);
    tracing::info!(%user_id, class_id = %class.id, "created class");
    Ok(class)
}

pub async fn list_classes(pool: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<ClassRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, name, period, teacher, created_at
        FROM gradebook.classes
        WHERE user_id = $1
        ORDER BY period ASC NULLS LAST, name ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(class_from_row).collect())
}

pub async fn find_class(pool: &PgPool, user_id: Uuid, name: &str) -> anyhow::Result<ClassRecord> {
    let row = sqlx::query(
        r#"
        SELECT id, name, period, teacher, created_at
        FROM gradebook.classes
        WHERE user_id = $1 AND lower(name) = lower($2)
        "#,
    )
    .bind(user_id)
    .bind(name.trim())
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("Class \"{}\" not found.", name.trim()))?;

    Ok(class_from_row(&row))
}

/// Changes to a class. For `period` and `teacher`, `Some(None)` clears the
/// field.
#[derive(Debug, Default, PartialEq)]
pub struct ClassPatch {
    pub name: Option<String>,
    pub period: Option<Option<i32>>,
    pub teacher: Option<Option<String>>,
}

pub async fn update_class(
    pool: &PgPool,
    user_id: Uuid,
    class_id: Uuid,
    patch: ClassPatch,
) -> anyhow::Result<ClassRecord> {
    let name = patch.name.as_deref().map(validate::class_name).transpose()?;
    if let Some(name) = name.as_deref() {
        let existing = list_classes(pool, user_id).await?;
        validate::ensure_unique_class(&existing, name, Some(class_id))?;
    }
    let (set_period, period) = field_change(patch.period);
    let (set_teacher, teacher) = field_change(patch.teacher);

    let row = sqlx::query(
        r#"
        UPDATE gradebook.classes
        SET name = COALESCE($3, name),
            period = CASE WHEN $4 THEN $5 ELSE period END,
            teacher = CASE WHEN $6 THEN $7 ELSE teacher END
        WHERE id = $1 AND user_id = $2
        RETURNING id, name, period, teacher, created_at
        "#,
    )
    .bind(class_id)
    .bind(user_id)
    .bind(&name)
    .bind(set_period)
    .bind(period)
    .bind(set_teacher)
    .bind(teacher)
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to update class {class_id}"))?
    .context("Class not found.")?;

    Ok(class_from_row(&row))
}

pub async fn delete_class(pool: &PgPool, user_id: Uuid, class_id: Uuid) -> anyhow::Result<()> {
    let result = sqlx::query("DELETE FROM gradebook.classes WHERE id = $1 AND user_id = $2")
        .bind(class_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        anyhow::bail!("Class not found.");
    }

    tracing::info!(%user_id, %class_id, "deleted class with its categories and grades");
    Ok(())
}

// ------------------------------------------------------------------ groups

fn group_from_row(row: &PgRow) -> StudyGroup {
    StudyGroup {
        id: row.get("id"),
        name: row.get("name"),
        created_at: row.get("created_at"),
    }
}

fn group_class_from_row(row: &PgRow) -> GroupClass {
    GroupClass {
        id: row.get("id"),
        group_id: row.get("group_id"),
        name: row.get("name"),
        period: row.get("period"),
        teacher: row.get("teacher"),
        created_at: row.get("created_at"),
    }
}

/// Creates a study group with its creator as the first member.
pub async fn create_group(pool: &PgPool, user_id: Uuid, name: &str) -> anyhow::Result<StudyGroup> {
    let name = validate::group_name(name)?;

    let mut tx = pool.begin().await?;
    let row = sqlx::query(
        r#"
        INSERT INTO gradebook.groups (id, name)
        VALUES ($1, $2)
        RETURNING id, name, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&name)
    .fetch_one(&mut *tx)
    .await
    .with_context(|| format!("failed to create group {name}"))?;
    let group = group_from_row(&row);

    sqlx::query(
        "INSERT INTO gradebook.group_members (id, group_id, user_id) VALUES ($1, $2, $3)",
    )
    .bind(Uuid::new_v4())
    .bind(group.id)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(%user_id, group_id = %group.id, "created study group");
    Ok(group)
}

/// Joining a group twice is a no-op.
pub async fn join_group(pool: &PgPool, user_id: Uuid, group_id: Uuid) -> anyhow::Result<StudyGroup> {
    let row = sqlx::query("SELECT id, name, created_at FROM gradebook.groups WHERE id = $1")
        .bind(group_id)
        .fetch_optional(pool)
        .await?
        .context("Group not found.")?;

    sqlx::query(
        r#"
        INSERT INTO gradebook.group_members (id, group_id, user_id)
        VALUES ($1, $2, $3)
        ON CONFLICT (group_id, user_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(group_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    tracing::info!(%user_id, %group_id, "joined study group");
    Ok(group_from_row(&row))
}

pub async fn list_groups(pool: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<StudyGroup>> {
    let rows = sqlx::query(
        r#"
        SELECT g.id, g.name, g.created_at
        FROM gradebook.groups g
        JOIN gradebook.group_members m ON m.group_id = g.id
        WHERE m.user_id = $1
        ORDER BY g.name ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(group_from_row).collect())
}

async fn require_group_member(pool: &PgPool, user_id: Uuid, group_id: Uuid) -> anyhow::Result<()> {
    let member = sqlx::query(
        "SELECT 1 AS present FROM gradebook.group_members WHERE group_id = $1 AND user_id = $2",
    )
    .bind(group_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    if member.is_none() {
        anyhow::bail!("Not a member of group {group_id}.");
    }
    Ok(())
}

pub async fn list_group_classes(
    pool: &PgPool,
    user_id: Uuid,
    group_id: Uuid,
) -> anyhow::Result<Vec<GroupClass>> {
    require_group_member(pool, user_id, group_id).await?;

    let rows = sqlx::query(
        r#"
        SELECT id, group_id, name, period, teacher, created_at
        FROM gradebook.group_classes
        WHERE group_id = $1
        ORDER BY period ASC NULLS LAST, name ASC
        "#,
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(group_class_from_row).collect())
}

pub async fn create_group_class(
    pool: &PgPool,
    user_id: Uuid,
    group_id: Uuid,
    name: &str,
    period: Option<i32>,
    teacher: Option<&str>,
) -> anyhow::Result<GroupClass> {
    require_group_member(pool, user_id, group_id).await?;
    let name = validate::class_name(name)?;

    let row = sqlx::query(
        r#"
        INSERT INTO gradebook.group_classes (id, group_id, name, period, teacher)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, group_id, name, period, teacher, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(group_id)
    .bind(&name)
    .bind(period)
    .bind(teacher)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to add {name} to group {group_id}"))?;

    Ok(group_class_from_row(&row))
}

pub async fn update_group_class(
    pool: &PgPool,
    user_id: Uuid,
    group_id: Uuid,
    class_id: Uuid,
    patch: ClassPatch,
) -> anyhow::Result<GroupClass> {
    require_group_member(pool, user_id, group_id).await?;
    let name = patch.name.as_deref().map(validate::class_name).transpose()?;
    let (set_period, period) = field_change(patch.period);
    let (set_teacher, teacher) = field_change(patch.teacher);

    let row = sqlx::query(
        r#"
        UPDATE gradebook.group_classes
        SET name = COALESCE($3, name),
            period = CASE WHEN $4 THEN $5 ELSE period END,
            teacher = CASE WHEN $6 THEN $7 ELSE teacher END
        WHERE id = $1 AND group_id = $2
        RETURNING id, group_id, name, period, teacher, created_at
        "#,
    )
    .bind(class_id)
    .bind(group_id)
    .bind(name)
    .bind(set_period)
    .bind(period)
    .bind(set_teacher)
    .bind(teacher)
    .fetch_optional(pool)
    .await?
    .context("Group class not found.")?;

    Ok(group_class_from_row(&row))
}

pub async fn delete_group_class(
    pool: &PgPool,
    user_id: Uuid,
    group_id: Uuid,
    class_id: Uuid,
) -> anyhow::Result<()> {
    require_group_member(pool, user_id, group_id).await?;

    let result = sqlx::query("DELETE FROM gradebook.group_classes WHERE id = $1 AND group_id = $2")
        .bind(class_id)
        .bind(group_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        anyhow::bail!("Group class not found.");
    }

    Ok(())
}

// -------------------------------------------------------------- categories

pub async fn list_categories(
    pool: &PgPool,
    user_id: Uuid,
    class_id: Uuid,
) -> anyhow::Result<Vec<CategoryDefinition>> {
    let rows = sqlx::query(
        r#"
        SELECT id, name, weight_percent
        FROM gradebook.categories
        WHERE user_id = $1 AND class_id = $2
        ORDER BY name ASC
        "#,
    )
    .bind(user_id)
    .bind(class_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(category_from_row).collect())
}

pub async fn create_category(
    pool: &PgPool,
    user_id: Uuid,
    class_id: Uuid,
    name: &str,
    weight_percent: f64,
) -> anyhow::Result<CategoryDefinition> {
    let name = validate::category_name(name)?;
    let weight_percent = validate::weight_percent(weight_percent)?;

    let existing = list_categories(pool, user_id, class_id).await?;
    validate::ensure_unique_category(&existing, &name, None)?;

    let row = sqlx::query(
        r#"
        INSERT INTO gradebook.categories (id, user_id, class_id, name, weight_percent)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, name, weight_percent
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(class_id)
    .bind(&name)
    .bind(weight_percent)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to create category {name}"))?;

    let category = category_from_row(&row);
    tracing::info!(%user_id, %class_id, category = %category.name, weight_percent, "created category");
    Ok(category)
}

pub async fn update_category(
    pool: &PgPool,
    user_id: Uuid,
    category_id: Uuid,
    name: Option<&str>,
    weight_percent: Option<f64>,
) -> anyhow::Result<CategoryDefinition> {
    let name = name.map(validate::category_name).transpose()?;
    let weight_percent = weight_percent.map(validate::weight_percent).transpose()?;

    let class_id: Uuid = sqlx::query(
        "SELECT class_id FROM gradebook.categories WHERE id = $1 AND user_id = $2",
    )
    .bind(category_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .context("Category not found.")?
    .get("class_id");

    if let Some(name) = name.as_deref() {
        let existing = list_categories(pool, user_id, class_id).await?;
        validate::ensure_unique_category(&existing, name, Some(category_id))?;
    }

    let row = sqlx::query(
        r#"
        UPDATE gradebook.categories
        SET name = COALESCE($3, name),
            weight_percent = COALESCE($4, weight_percent)
        WHERE id = $1 AND user_id = $2
        RETURNING id, name, weight_percent
        "#,
    )
    .bind(category_id)
    .bind(user_id)
    .bind(name)
    .bind(weight_percent)
    .fetch_optional(pool)
    .await?
    .context("Category not found.")?;

    Ok(category_from_row(&row))
}

pub async fn delete_category(
    pool: &PgPool,
    user_id: Uuid,
    category_id: Uuid,
) -> anyhow::Result<()> {
    let result = sqlx::query("DELETE FROM gradebook.categories WHERE id = $1 AND user_id = $2")
        .bind(category_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        anyhow::bail!("Category not found.");
    }

    Ok(())
}

// ------------------------------------------------------------------ grades

#[derive(Debug, Clone)]
pub struct NewGrade {
    pub title: String,
    pub points_earned: f64,
    pub points_possible: f64,
    pub category: Option<String>,
    pub due_date: Option<NaiveDate>,
}

impl NewGrade {
    fn validated(self) -> anyhow::Result<Self> {
        Ok(Self {
            title: validate::grade_title(&self.title)?,
            points_earned: validate::points("points_earned", self.points_earned)?,
            points_possible: validate::points("points_possible", self.points_possible)?,
            category: validate::grade_category(self.category.as_deref()),
            due_date: self.due_date,
        })
    }
}

#[derive(Debug, Default)]
pub struct GradePatch {
    pub title: Option<String>,
    pub points_earned: Option<f64>,
    pub points_possible: Option<f64>,
    /// `Some(None)` clears the category.
    pub category: Option<Option<String>>,
    pub due_date: Option<NaiveDate>,
}

pub async fn list_grades(
    pool: &PgPool,
    user_id: Uuid,
    class_id: Uuid,
) -> anyhow::Result<Vec<AssignmentRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, title, points_earned, points_possible, category, due_date
        FROM gradebook.grades
        WHERE user_id = $1 AND class_id = $2
        ORDER BY due_date ASC NULLS LAST, created_at ASC
        "#,
    )
    .bind(user_id)
    .bind(class_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(grade_from_row).collect())
}

async fn insert_grade<'e, E>(
    executor: E,
    user_id: Uuid,
    class_id: Uuid,
    grade: &NewGrade,
) -> anyhow::Result<AssignmentRecord>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let row = sqlx::query(
        r#"
        INSERT INTO gradebook.grades
        (id, user_id, class_id, title, points_earned, points_possible, category, due_date)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id, title, points_earned, points_possible, category, due_date
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(class_id)
    .bind(&grade.title)
    .bind(grade.points_earned)
    .bind(grade.points_possible)
    .bind(&grade.category)
    .bind(grade.due_date)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to save grade {}", grade.title))?;

    Ok(grade_from_row(&row))
}

pub async fn create_grade(
    pool: &PgPool,
    user_id: Uuid,
    class_id: Uuid,
    grade: NewGrade,
) -> anyhow::Result<AssignmentRecord> {
    let grade = grade.validated()?;
    let record = insert_grade(pool, user_id, class_id, &grade).await?;
    tracing::debug!(%user_id, %class_id, title = %record.title, "created grade");
    Ok(record)
}

pub async fn update_grade(
    pool: &PgPool,
    user_id: Uuid,
    grade_id: Uuid,
    patch: GradePatch,
) -> anyhow::Result<AssignmentRecord> {
    let title = patch.title.as_deref().map(validate::grade_title).transpose()?;
    let points_earned = patch
        .points_earned
        .map(|value| validate::points("points_earned", value))
        .transpose()?;
    let points_possible = patch
        .points_possible
        .map(|value| validate::points("points_possible", value))
        .transpose()?;
    let (set_category, category) = field_change(
        patch
            .category
            .map(|label| validate::grade_category(label.as_deref())),
    );

    let row = sqlx::query(
        r#"
        UPDATE gradebook.grades
        SET title = COALESCE($3, title),
            points_earned = COALESCE($4, points_earned),
            points_possible = COALESCE($5, points_possible),
            category = CASE WHEN $6 THEN $7 ELSE category END,
            due_date = COALESCE($8, due_date)
        WHERE id = $1 AND user_id = $2
        RETURNING id, title, points_earned, points_possible, category, due_date
        "#,
    )
    .bind(grade_id)
    .bind(user_id)
    .bind(title)
    .bind(points_earned)
    .bind(points_possible)
    .bind(set_category)
    .bind(category)
    .bind(patch.due_date)
    .fetch_optional(pool)
    .await?
    .context("Grade not found.")?;

    Ok(grade_from_row(&row))
}

pub async fn delete_grade(pool: &PgPool, user_id: Uuid, grade_id: Uuid) -> anyhow::Result<()> {
    let result = sqlx::query("DELETE FROM gradebook.grades WHERE id = $1 AND user_id = $2")
        .bind(grade_id)
        .bind(user_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        anyhow::bail!("Grade not found.");
    }

    Ok(())
}

// ---------------------------------------------------------------- snapshot

/// Reads the categories and grades of one class from a single consistent
/// snapshot.
pub async fn fetch_snapshot(
    pool: &PgPool,
    user_id: Uuid,
    class_id: Uuid,
) -> anyhow::Result<(Vec<CategoryDefinition>, Vec<AssignmentRecord>)> {
    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
        .execute(&mut *tx)
        .await?;

    let categories = sqlx::query(
        r#"
        SELECT id, name, weight_percent
        FROM gradebook.categories
        WHERE user_id = $1 AND class_id = $2
        ORDER BY created_at ASC, name ASC
        "#,
    )
    .bind(user_id)
    .bind(class_id)
    .fetch_all(&mut *tx)
    .await
    .context("failed to load categories")?;

    let grades = sqlx::query(
        r#"
        SELECT id, title, points_earned, points_possible, category, due_date
        FROM gradebook.grades
        WHERE user_id = $1 AND class_id = $2
        ORDER BY created_at ASC
        "#,
    )
    .bind(user_id)
    .bind(class_id)
    .fetch_all(&mut *tx)
    .await
    .context("failed to load grades")?;

    tx.commit().await?;

    tracing::debug!(
        %user_id,
        %class_id,
        categories = categories.len(),
        grades = grades.len(),
        "loaded class snapshot"
    );

    Ok((
        categories.iter().map(category_from_row).collect(),
        grades.iter().map(grade_from_row).collect(),
    ))
}

// ------------------------------------------------------------------ import

pub async fn import_grades_csv(
    pool: &PgPool,
    user_id: Uuid,
    class_id: Uuid,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        title: String,
        points_earned: f64,
        points_possible: f64,
        category: Option<String>,
        due_date: Option<NaiveDate>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;

    let mut grades = Vec::new();
    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("malformed CSV row at line {line}"))?;
        let grade = NewGrade {
            title: row.title,
            points_earned: row.points_earned,
            points_possible: row.points_possible,
            category: row.category,
            due_date: row.due_date,
        }
        .validated()
        .with_context(|| format!("invalid grade at line {line}"))?;
        grades.push(grade);
    }

    let mut tx = pool.begin().await?;
    for grade in &grades {
        insert_grade(&mut *tx, user_id, class_id, grade).await?;
    }
    tx.commit().await?;

    tracing::info!(%user_id, %class_id, inserted = grades.len(), "imported grades");
    Ok(grades.len())
}
