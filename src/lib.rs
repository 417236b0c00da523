// Clicker Sound - tap-to-play character sound player
// Module declarations
pub mod audio;
pub mod commands;
pub mod error;
pub mod settings;
pub mod state;

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

use audio::AudioEnvironment;
use commands::{execute, parse_command};
use settings::SoundSettings;
use state::AppState;

pub use error::SoundError;

/// Run the terminal clicker: every line read from stdin is a tap
pub async fn run(app_dir: PathBuf) -> Result<()> {
    let settings = SoundSettings::load(&app_dir)
        .context("Failed to load sound settings")?;

    let env = AudioEnvironment::system();
    let app_state = AppState::new(settings, env, app_dir);

    println!(
        "{} characters. Enter: tap, <n>: tap character n, v <0-100>: volume, m: mute, f: focus, q: quit",
        app_state.character_count()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        if !execute(&app_state, parse_command(&line)).await {
            break;
        }
    }

    app_state.settings.lock().save(&app_state.app_dir)
        .context("Failed to save sound settings")?;
    app_state.player.shutdown();
    Ok(())
}
