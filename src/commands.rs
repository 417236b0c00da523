// Command handlers for the terminal front end
// Each input line is one user gesture; every gesture also counts as
// an interaction that may unlock a suspended device.

use crate::audio::PageEvent;
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Tap the selected character
    Tap,
    /// Select character `n` and tap it
    TapCharacter(usize),
    SetVolume(u8),
    ToggleSound,
    /// Window focus came back
    Focus,
    Quit,
    Unknown(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Tap;
    }
    if let Ok(index) = line.parse::<usize>() {
        return Command::TapCharacter(index);
    }

    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("v"), Some(value)) => match value.parse::<u16>() {
            Ok(volume) => Command::SetVolume(volume.min(100) as u8),
            Err(_) => Command::Unknown(line.to_string()),
        },
        (Some("m"), None) => Command::ToggleSound,
        (Some("f"), None) => Command::Focus,
        (Some("q"), None) => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    }
}

/// Run one command. Returns false when the loop should stop.
pub async fn execute(state: &AppState, command: Command) -> bool {
    match command {
        Command::Tap => tap(state).await,
        Command::TapCharacter(index) => {
            if index >= state.character_count() {
                println!("No character {} (have {})", index, state.character_count());
                return true;
            }
            state.select(index);
            tap(state).await;
        }
        Command::SetVolume(volume) => {
            state.player.set_volume(volume);
            state.settings.lock().set_volume(volume);
            println!("Volume {}", volume);
        }
        Command::ToggleSound => {
            let enabled = !state.player.sound_enabled();
            state.player.set_sound_enabled(enabled);
            state.settings.lock().sound_enabled = enabled;
            println!("Sound {}", if enabled { "on" } else { "off" });
        }
        Command::Focus => state.env.notify(PageEvent::FocusGained),
        Command::Quit => return false,
        Command::Unknown(input) => println!("Unknown command: {}", input),
    }
    true
}

async fn tap(state: &AppState) {
    state.env.notify(PageEvent::UserInteraction);
    let index = state.selected();
    let count = state.record_click(index);
    state.player.play(index).await;
    println!("Character {}: {} clicks", index, count);
}
