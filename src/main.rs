use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use story_dispatch::StoryService;
use story_dispatch::config::Config;
use story_dispatch::models::{ChildProfile, Language, StoryLength};

#[derive(Parser, Debug)]
#[command(name = "story-dispatch", version, about = "Generate a bedtime story for a child")]
struct Cli {
    /// Child's first name
    name: String,

    /// Child's age in years
    age: u32,

    /// What the child likes, free text
    interests: String,

    /// Theme or lesson of the story
    theme: String,

    /// short, medium or long
    #[arg(long, default_value = "medium")]
    length: StoryLength,

    /// fr, en, es or ru; anything else falls back to French
    #[arg(long, default_value = Language::DEFAULT.code())]
    language: String,

    #[arg(long, default_value = "reading")]
    activity: String,

    /// Write narrated MP3 audio to this file
    #[arg(long)]
    speak: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so the story on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load();

    let profile = ChildProfile::new(cli.name, cli.age, cli.activity, cli.interests);
    if !profile.is_valid() {
        bail!("profile needs a name, an age above zero, an activity and interests");
    }

    let service = StoryService::new(&config).context("failed to build story service")?;
    let _tasks = service.start();

    let request = profile.story_request(cli.theme, cli.length, cli.language);
    let ticket = service.submit(request).await;
    if service.dispatcher().pending() > 0 {
        tracing::info!(
            reason = ?service.service_status().reason,
            "Request queued until the network and API are available"
        );
    }

    let story = ticket.wait().await.context("story generation failed")?;
    println!("{}\n\n{}", story.title, story.body);

    if let Some(path) = cli.speak {
        let audio = service.narrate(&story).await.context("narration failed")?;
        tokio::fs::write(&path, &audio)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), bytes = audio.len(), "Narration saved");
    }

    Ok(())
}
