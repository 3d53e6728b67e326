use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{ScreenSnapshot, TutorListScreen};
use shared::{domain::TutorId, protocol::FilterField};
use storage::Storage;
use tracing::info;

mod config;

use config::{load_settings, normalize_database_url, validate_server_url};

#[derive(Parser, Debug)]
#[command(
    name = "tutors",
    about = "Browse available tutors and manage local favorites"
)]
struct Cli {
    /// Catalog service base URL; overrides tutors.toml and environment.
    #[arg(long)]
    server_url: Option<String>,
    /// Local store database URL; overrides tutors.toml and environment.
    #[arg(long)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Query available tutors, optionally filtered by subject, weekday and time.
    List {
        #[arg(long, default_value = "")]
        subject: String,
        #[arg(long, default_value = "")]
        week_day: String,
        #[arg(long, default_value = "")]
        time: String,
    },
    /// Show the locally favorited tutors.
    Favorites,
    /// Mark a tutor from the catalog as a favorite.
    Favorite { tutor_id: i64 },
    /// Remove a tutor from the local favorites.
    Unfavorite { tutor_id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let cli = Cli::parse();
    let mut settings = load_settings();
    if let Some(server_url) = cli.server_url {
        settings.server_url = server_url;
    }
    if let Some(database_url) = cli.database_url {
        settings.database_url = database_url;
    }
    validate_server_url(&settings.server_url)?;

    let database_url = normalize_database_url(&settings.database_url);
    let storage = Storage::new(&database_url)
        .await
        .context("failed to open local store")?;

    match cli.command {
        Command::List {
            subject,
            week_day,
            time,
        } => list_tutors(settings.server_url, storage, subject, week_day, time).await,
        Command::Favorites => show_favorites(storage).await,
        Command::Favorite { tutor_id } => {
            favorite_tutor(settings.server_url, storage, TutorId(tutor_id)).await
        }
        Command::Unfavorite { tutor_id } => unfavorite_tutor(storage, TutorId(tutor_id)).await,
    }
}

async fn list_tutors(
    server_url: String,
    storage: Storage,
    subject: String,
    week_day: String,
    time: String,
) -> Result<()> {
    let screen = TutorListScreen::new(server_url, Arc::new(storage));
    screen.on_focus().await;

    let filtered = !(subject.is_empty() && week_day.is_empty() && time.is_empty());
    if filtered {
        screen.toggle_filter_visibility().await;
    }
    screen.set_filter_field(FilterField::Subject, subject).await;
    screen.set_filter_field(FilterField::WeekDay, week_day).await;
    screen.set_filter_field(FilterField::Time, time).await;
    screen.submit_filters().await?;

    let snapshot = screen.snapshot().await;
    print!("{}", render_rows(&snapshot));
    Ok(())
}

async fn show_favorites(storage: Storage) -> Result<()> {
    let favorites = storage.list_favorites().await?;
    if favorites.is_empty() {
        println!("no favorites yet");
        return Ok(());
    }
    if let Some(updated_at) = storage.entry_updated_at(storage::FAVORITES_KEY).await? {
        println!("favorites last updated {updated_at}");
    }
    for tutor in favorites {
        println!(
            "#{} {}  {}  R$ {:.2}/h",
            tutor.id.0, tutor.name, tutor.subject, tutor.cost
        );
    }
    Ok(())
}

async fn favorite_tutor(server_url: String, storage: Storage, tutor_id: TutorId) -> Result<()> {
    let screen = TutorListScreen::new(server_url, Arc::new(storage.clone()));
    screen.submit_filters().await?;

    let snapshot = screen.snapshot().await;
    let Some(row) = snapshot.rows.iter().find(|row| row.tutor.id == tutor_id) else {
        bail!("tutor {} not found in the catalog", tutor_id.0);
    };

    if storage.add_favorite(&row.tutor).await? {
        info!(tutor_id = tutor_id.0, "tutor favorited");
        println!("favorited #{} {}", row.tutor.id.0, row.tutor.name);
    } else {
        println!("#{} {} is already a favorite", row.tutor.id.0, row.tutor.name);
    }
    Ok(())
}

async fn unfavorite_tutor(storage: Storage, tutor_id: TutorId) -> Result<()> {
    if storage.remove_favorite(tutor_id).await? {
        println!("removed tutor {} from favorites", tutor_id.0);
    } else {
        println!("tutor {} was not favorited", tutor_id.0);
    }
    Ok(())
}

fn render_rows(snapshot: &ScreenSnapshot) -> String {
    if snapshot.rows.is_empty() {
        return "no tutors matched the current filters\n".to_string();
    }

    let mut out = String::new();
    for row in &snapshot.rows {
        let marker = if row.favorited { '*' } else { ' ' };
        out.push_str(&format!(
            "[{marker}] #{} {}  {}  R$ {:.2}/h\n",
            row.tutor.id.0, row.tutor.name, row.tutor.subject, row.tutor.cost
        ));
    }
    out
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
