use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{ArgGroup, Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

mod db;
mod logging;
mod models;
mod report;
mod summary;
mod validate;

use models::SummaryResponse;

#[derive(Parser)]
#[command(name = "gradebook")]
#[command(about = "Per-class grade tracking with weighted category summaries", long_about = None)]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,
    #[arg(long, default_value_t = 5)]
    max_connections: u32,
    /// Log level or filter directive (overridden by GRADEBOOK_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct UserArg {
    #[arg(long)]
    user: String,
}

#[derive(Args)]
struct ClassScope {
    #[arg(long)]
    user: String,
    #[arg(long = "class")]
    class_name: String,
}

#[derive(Args)]
struct ClassEdit {
    #[arg(long)]
    name: Option<String>,
    #[arg(long, conflicts_with = "clear_period")]
    period: Option<i32>,
    #[arg(long)]
    clear_period: bool,
    #[arg(long, conflicts_with = "clear_teacher")]
    teacher: Option<String>,
    #[arg(long)]
    clear_teacher: bool,
}

/// `Some(None)` when the field is being cleared.
fn clear_or<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
    if clear {
        Some(None)
    } else {
        value.map(Some)
    }
}

impl ClassEdit {
    fn into_patch(self) -> db::ClassPatch {
        db::ClassPatch {
            name: self.name,
            period: clear_or(self.period, self.clear_period),
            teacher: clear_or(self.teacher, self.clear_teacher),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo user with a few classes
    Seed,
    /// Create a class
    AddClass {
        #[command(flatten)]
        scope: UserArg,
        #[arg(long)]
        name: String,
        #[arg(long)]
        period: Option<i32>,
        #[arg(long)]
        teacher: Option<String>,
    },
    /// List classes
    Classes {
        #[command(flatten)]
        scope: UserArg,
    },
    /// Show a user's profile
    Profile {
        #[command(flatten)]
        scope: UserArg,
    },
    /// Set the display name; an empty name clears it
    SetDisplayName {
        #[command(flatten)]
        scope: UserArg,
        #[arg(long)]
        name: String,
    },
    /// Change a username
    RenameUser {
        #[command(flatten)]
        scope: UserArg,
        #[arg(long)]
        new_username: String,
    },
    /// Rename a class or change its period or teacher
    UpdateClass {
        #[command(flatten)]
        scope: ClassScope,
        #[command(flatten)]
        edit: ClassEdit,
    },
    /// Delete a class along with its categories and grades
    DeleteClass {
        #[command(flatten)]
        scope: ClassScope,
    },
    /// Define a weighted category for a class
    AddCategory {
        #[command(flatten)]
        scope: ClassScope,
        #[arg(long)]
        name: String,
        #[arg(long)]
        weight: f64,
    },
    /// List the categories of a class
    Categories {
        #[command(flatten)]
        scope: ClassScope,
    },
    /// Rename a category or change its weight
    UpdateCategory {
        #[command(flatten)]
        scope: UserArg,
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        weight: Option<f64>,
    },
    /// Delete a category; its grades stay and become unweighted
    DeleteCategory {
        #[command(flatten)]
        scope: UserArg,
        #[arg(long)]
        id: Uuid,
    },
    /// Record a grade
    AddGrade {
        #[command(flatten)]
        scope: ClassScope,
        #[arg(long)]
        title: String,
        #[arg(long)]
        earned: f64,
        #[arg(long)]
        possible: f64,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        due_date: Option<NaiveDate>,
    },
    /// List the grades of a class
    Grades {
        #[command(flatten)]
        scope: ClassScope,
    },
    /// Edit a recorded grade
    #[command(group(
        ArgGroup::new("category_change")
            .args(["category", "clear_category"])
            .multiple(false)
    ))]
    UpdateGrade {
        #[command(flatten)]
        scope: UserArg,
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        earned: Option<f64>,
        #[arg(long)]
        possible: Option<f64>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        clear_category: bool,
        #[arg(long)]
        due_date: Option<NaiveDate>,
    },
    /// Delete a grade
    DeleteGrade {
        #[command(flatten)]
        scope: UserArg,
        #[arg(long)]
        id: Uuid,
    },
    /// Import grades from a CSV file
    Import {
        #[command(flatten)]
        scope: ClassScope,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Compute the overall grade and category breakdown
    Summary {
        #[command(flatten)]
        scope: ClassScope,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        scope: ClassScope,
        #[arg(long, default_value = "summary.md")]
        out: PathBuf,
    },
    /// Start a study group
    CreateGroup {
        #[command(flatten)]
        scope: UserArg,
        #[arg(long)]
        name: String,
    },
    /// Join a study group by id
    JoinGroup {
        #[command(flatten)]
        scope: UserArg,
        #[arg(long)]
        group: Uuid,
    },
    /// List the study groups a user belongs to
    Groups {
        #[command(flatten)]
        scope: UserArg,
    },
    /// List the classes shared with a study group
    GroupClasses {
        #[command(flatten)]
        scope: UserArg,
        #[arg(long)]
        group: Uuid,
    },
    /// Add a class to a study group's schedule
    AddGroupClass {
        #[command(flatten)]
        scope: UserArg,
        #[arg(long)]
        group: Uuid,
        #[arg(long)]
        name: String,
        #[arg(long)]
        period: Option<i32>,
        #[arg(long)]
        teacher: Option<String>,
    },
    UpdateGroupClass {
        #[command(flatten)]
        scope: UserArg,
        #[arg(long)]
        group: Uuid,
        #[arg(long)]
        id: Uuid,
        #[command(flatten)]
        edit: ClassEdit,
    },
    DeleteGroupClass {
        #[command(flatten)]
        scope: UserArg,
        #[arg(long)]
        group: Uuid,
        #[arg(long)]
        id: Uuid,
    },
}

impl Commands {
    /// Commands that may register a new user on first use. Everything else
    /// requires the user to exist already.
    fn registers_user(&self) -> bool {
        matches!(
            self,
            Commands::AddClass { .. } | Commands::CreateGroup { .. } | Commands::JoinGroup { .. }
        )
    }
}

async fn lookup_user(pool: &sqlx::PgPool, username: &str, register: bool) -> anyhow::Result<Uuid> {
    if register {
        db::ensure_user(pool, username).await
    } else {
        db::find_user(pool, username).await
    }
}

async fn resolve_class(
    pool: &sqlx::PgPool,
    scope: &ClassScope,
) -> anyhow::Result<(Uuid, models::ClassRecord)> {
    let user_id = db::find_user(pool, &scope.user).await?;
    let class = db::find_class(pool, user_id, &scope.class_name).await?;
    Ok((user_id, class))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.log_level.as_deref(), cli.log_json)?;

    let pool = PgPoolOptions::new()
        .max_connections(cli.max_connections)
        .connect(&cli.database_url)
        .await
        .context("failed to connect to Postgres")?;

    let register = cli.command.registers_user();
    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted for user \"demo\".");
        }
        Commands::AddClass {
            scope,
            name,
            period,
            teacher,
        } => {
            let user_id = lookup_user(&pool, &scope.user, register).await?;
            let class = db::create_class(&pool, user_id, &name, period, teacher.as_deref()).await?;
            println!("Created class {} ({}).", class.name, class.id);
        }
        Commands::Classes { scope } => {
            let user_id = lookup_user(&pool, &scope.user, register).await?;
            let classes = db::list_classes(&pool, user_id).await?;

            if classes.is_empty() {
                println!("No classes yet.");
                return Ok(());
            }

            for class in classes.iter() {
                let period = class
                    .period
                    .map(|period| format!("P{period}"))
                    .unwrap_or_else(|| "--".to_string());
                println!(
                    "- [{}] {} {}{}",
                    class.id,
                    period,
                    class.name,
                    class
                        .teacher
                        .as_deref()
                        .map(|teacher| format!(" ({teacher})"))
                        .unwrap_or_default()
                );
            }
        }
        Commands::Profile { scope } => {
            let user_id = lookup_user(&pool, &scope.user, register).await?;
            let profile = db::user_profile(&pool, user_id).await?;
            println!("{} (@{})", profile.label(), profile.username);
            println!("Member since {}", profile.created_at.date_naive());
        }
        Commands::SetDisplayName { scope, name } => {
            let user_id = lookup_user(&pool, &scope.user, register).await?;
            let profile = db::set_display_name(&pool, user_id, &name).await?;
            match profile.display_name.as_deref() {
                Some(display_name) => println!("Display name set to {display_name}."),
                None => println!("Display name cleared."),
            }
        }
        Commands::RenameUser {
            scope,
            new_username,
        } => {
            let user_id = lookup_user(&pool, &scope.user, register).await?;
            let profile = db::rename_user(&pool, user_id, &new_username).await?;
            println!("Username changed to {}.", profile.username);
        }
        Commands::UpdateClass { scope, edit } => {
            let (user_id, class) = resolve_class(&pool, &scope).await?;
            let class = db::update_class(&pool, user_id, class.id, edit.into_patch()).await?;
            println!("Updated class {}.", class.name);
        }
        Commands::DeleteClass { scope } => {
            let (user_id, class) = resolve_class(&pool, &scope).await?;
            db::delete_class(&pool, user_id, class.id).await?;
            println!("Deleted class {}.", class.name);
        }
        Commands::AddCategory {
            scope,
            name,
            weight,
        } => {
            let (user_id, class) = resolve_class(&pool, &scope).await?;
            let category = db::create_category(&pool, user_id, class.id, &name, weight).await?;
            println!(
                "Created category {} ({:.1}%) in {}.",
                category.name, category.weight_percent, class.name
            );
        }
        Commands::Categories { scope } => {
            let (user_id, class) = resolve_class(&pool, &scope).await?;
            let categories = db::list_categories(&pool, user_id, class.id).await?;

            if categories.is_empty() {
                println!("No categories defined for {}.", class.name);
                return Ok(());
            }

            let total: f64 = categories.iter().map(|category| category.weight_percent).sum();
            for category in categories.iter() {
                println!(
                    "- [{}] {} {:.1}%",
                    category.id.map(|id| id.to_string()).unwrap_or_default(),
                    category.name,
                    category.weight_percent
                );
            }
            println!("Total weight: {total:.1}%");
        }
        Commands::UpdateCategory {
            scope,
            id,
            name,
            weight,
        } => {
            let user_id = lookup_user(&pool, &scope.user, register).await?;
            let category =
                db::update_category(&pool, user_id, id, name.as_deref(), weight).await?;
            println!(
                "Updated category {} ({:.1}%).",
                category.name, category.weight_percent
            );
        }
        Commands::DeleteCategory { scope, id } => {
            let user_id = lookup_user(&pool, &scope.user, register).await?;
            db::delete_category(&pool, user_id, id).await?;
            println!("Deleted category {id}.");
        }
        Commands::AddGrade {
            scope,
            title,
            earned,
            possible,
            category,
            due_date,
        } => {
            let (user_id, class) = resolve_class(&pool, &scope).await?;
            let grade = db::create_grade(
                &pool,
                user_id,
                class.id,
                db::NewGrade {
                    title,
                    points_earned: earned,
                    points_possible: possible,
                    category,
                    due_date,
                },
            )
            .await?;
            println!(
                "Recorded {} ({}/{}) in {}.",
                grade.title, grade.points_earned, grade.points_possible, class.name
            );
        }
        Commands::Grades { scope } => {
            let (user_id, class) = resolve_class(&pool, &scope).await?;
            let grades = db::list_grades(&pool, user_id, class.id).await?;

            if grades.is_empty() {
                println!("No grades recorded for {}.", class.name);
                return Ok(());
            }

            for grade in grades.iter() {
                println!(
                    "- [{}] {} {}/{} ({}){}",
                    grade.id.map(|id| id.to_string()).unwrap_or_default(),
                    grade.title,
                    grade.points_earned,
                    grade.points_possible,
                    grade.category.as_deref().unwrap_or(summary::UNCATEGORIZED_LABEL),
                    grade
                        .due_date
                        .map(|date| format!(" due {date}"))
                        .unwrap_or_default()
                );
            }
        }
        Commands::UpdateGrade {
            scope,
            id,
            title,
            earned,
            possible,
            category,
            clear_category,
            due_date,
        } => {
            let user_id = lookup_user(&pool, &scope.user, register).await?;
            let patch = db::GradePatch {
                title,
                points_earned: earned,
                points_possible: possible,
                category: clear_or(category, clear_category),
                due_date,
            };
            let grade = db::update_grade(&pool, user_id, id, patch).await?;
            println!(
                "Updated {} ({}/{}).",
                grade.title, grade.points_earned, grade.points_possible
            );
        }
        Commands::DeleteGrade { scope, id } => {
            let user_id = lookup_user(&pool, &scope.user, register).await?;
            db::delete_grade(&pool, user_id, id).await?;
            println!("Deleted grade {id}.");
        }
        Commands::Import { scope, csv } => {
            let (user_id, class) = resolve_class(&pool, &scope).await?;
            let inserted = db::import_grades_csv(&pool, user_id, class.id, &csv).await?;
            println!(
                "Inserted {inserted} grades into {} from {}.",
                class.name,
                csv.display()
            );
        }
        Commands::Summary { scope, json } => {
            let (user_id, class) = resolve_class(&pool, &scope).await?;
            let (categories, assignments) = db::fetch_snapshot(&pool, user_id, class.id).await?;
            let result = summary::compute_summary(&categories, &assignments);

            if json {
                let response = SummaryResponse::from(result);
                println!("{}", serde_json::to_string_pretty(&response)?);
                return Ok(());
            }

            println!(
                "{}: {}",
                class.name,
                report::format_percent(result.overall_percent)
            );
            for row in result.categories.iter() {
                let weight = if row.is_orphan() {
                    "unweighted".to_string()
                } else {
                    format!("{:.1}%", row.weight_percent)
                };
                println!(
                    "- {} [{}] {}/{} -> {}",
                    row.name,
                    weight,
                    row.earned,
                    row.possible,
                    report::format_percent(row.percent)
                );
            }
        }
        Commands::Report { scope, out } => {
            let (user_id, class) = resolve_class(&pool, &scope).await?;
            let (categories, assignments) = db::fetch_snapshot(&pool, user_id, class.id).await?;
            let result = summary::compute_summary(&categories, &assignments);
            let report = report::build_report(&class, &result, Utc::now().date_naive());
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::CreateGroup { scope, name } => {
            let user_id = lookup_user(&pool, &scope.user, register).await?;
            let group = db::create_group(&pool, user_id, &name).await?;
            println!("Created group {} ({}).", group.name, group.id);
        }
        Commands::JoinGroup { scope, group } => {
            let user_id = lookup_user(&pool, &scope.user, register).await?;
            let group = db::join_group(&pool, user_id, group).await?;
            println!("Joined group {}.", group.name);
        }
        Commands::Groups { scope } => {
            let user_id = lookup_user(&pool, &scope.user, register).await?;
            let groups = db::list_groups(&pool, user_id).await?;

            if groups.is_empty() {
                println!("Not a member of any study group.");
                return Ok(());
            }

            for group in groups.iter() {
                println!("- [{}] {}", group.id, group.name);
            }
        }
        Commands::GroupClasses { scope, group } => {
            let user_id = lookup_user(&pool, &scope.user, register).await?;
            let classes = db::list_group_classes(&pool, user_id, group).await?;

            if classes.is_empty() {
                println!("No shared classes yet.");
                return Ok(());
            }

            for class in classes.iter() {
                println!(
                    "- [{}] {} {}{}",
                    class.id,
                    class
                        .period
                        .map(|period| format!("P{period}"))
                        .unwrap_or_else(|| "--".to_string()),
                    class.name,
                    class
                        .teacher
                        .as_deref()
                        .map(|teacher| format!(" ({teacher})"))
                        .unwrap_or_default()
                );
            }
        }
        Commands::AddGroupClass {
            scope,
            group,
            name,
            period,
            teacher,
        } => {
            let user_id = lookup_user(&pool, &scope.user, register).await?;
            let class = db::create_group_class(
                &pool,
                user_id,
                group,
                &name,
                period,
                teacher.as_deref(),
            )
            .await?;
            println!("Added {} to the group ({}).", class.name, class.id);
        }
        Commands::UpdateGroupClass {
            scope,
            group,
            id,
            edit,
        } => {
            let user_id = lookup_user(&pool, &scope.user, register).await?;
            let class = db::update_group_class(&pool, user_id, group, id, edit.into_patch()).await?;
            println!("Updated shared class {}.", class.name);
        }
        Commands::DeleteGroupClass { scope, group, id } => {
            let user_id = lookup_user(&pool, &scope.user, register).await?;
            db::delete_group_class(&pool, user_id, group, id).await?;
            println!("Removed shared class {id}.");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["gradebook", "--database-url", "postgres://localhost/gradebook"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn only_first_contact_commands_register_users() {
        let registering = [
            parse(&["add-class", "--user", "avery", "--name", "Biology"]),
            parse(&["create-group", "--user", "avery", "--name", "Study hall"]),
            parse(&["join-group", "--user", "avery", "--group", &Uuid::nil().to_string()]),
        ];
        for cli in registering.iter() {
            assert!(cli.command.registers_user());
        }

        let lookups = [
            parse(&["classes", "--user", "avery"]),
            parse(&["grades", "--user", "avery", "--class", "Biology"]),
            parse(&["summary", "--user", "avery", "--class", "Biology", "--json"]),
            parse(&["report", "--user", "avery", "--class", "Biology"]),
            parse(&["profile", "--user", "avery"]),
        ];
        for cli in lookups.iter() {
            assert!(!cli.command.registers_user());
        }
    }

    #[test]
    fn update_class_can_clear_period_and_teacher() {
        let cli = parse(&[
            "update-class",
            "--user",
            "avery",
            "--class",
            "Biology",
            "--clear-period",
            "--teacher",
            "Mr. Chen",
        ]);
        let Commands::UpdateClass { edit, .. } = cli.command else {
            panic!("expected update-class");
        };

        assert_eq!(
            edit.into_patch(),
            db::ClassPatch {
                name: None,
                period: Some(None),
                teacher: Some(Some("Mr. Chen".to_string())),
            }
        );
    }

    #[test]
    fn untouched_class_fields_stay_unset() {
        let cli = parse(&[
            "update-class",
            "--user",
            "avery",
            "--class",
            "Biology",
            "--name",
            "AP Biology",
        ]);
        let Commands::UpdateClass { edit, .. } = cli.command else {
            panic!("expected update-class");
        };

        let patch = edit.into_patch();
        assert_eq!(patch.name.as_deref(), Some("AP Biology"));
        assert_eq!(patch.period, None);
        assert_eq!(patch.teacher, None);
    }

    #[test]
    fn clearing_and_setting_the_same_field_is_rejected() {
        let argv = [
            "gradebook",
            "--database-url",
            "postgres://localhost/gradebook",
            "update-class",
            "--user",
            "avery",
            "--class",
            "Biology",
            "--period",
            "3",
            "--clear-period",
        ];
        assert!(Cli::try_parse_from(argv).is_err());
    }
}
