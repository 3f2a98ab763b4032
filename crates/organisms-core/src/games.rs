//! Registry of the classroom games a session can belong to.

use serde::Serialize;

use crate::error::{OrganismsError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Game {
    pub id: &'static str,
    pub name: &'static str,
    /// Only enabled games accept new sessions.
    pub enabled: bool,
}

pub const GAMES: [Game; 5] = [
    Game { id: "alien-invasion", name: "Alien Invasion", enabled: true },
    Game { id: "whisper-web", name: "Whisper Web", enabled: false },
    Game { id: "logistics-league", name: "Logistics League", enabled: false },
    Game { id: "pollination-party", name: "Pollination Party", enabled: false },
    Game { id: "rush-hour-rebels", name: "Rush Hour Rebels", enabled: false },
];

pub fn game(id: &str) -> Option<&'static Game> {
    GAMES.iter().find(|g| g.id == id)
}

/// The game `id` names, if it exists and is enabled.
pub fn enabled_game(id: &str) -> Result<&'static Game> {
    match game(id) {
        Some(g) if g.enabled => Ok(g),
        Some(g) => Err(OrganismsError::Config(format!(
            "game `{}` ({}) is not enabled",
            g.id, g.name
        ))),
        None => Err(OrganismsError::Config(format!("unknown game `{id}`"))),
    }
}

/// Display name for a stored game id, falling back to the id itself.
pub fn display_name(id: &str) -> &str {
    game(id).map(|g| g.name).unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_ids_unique() {
        for (i, g) in GAMES.iter().enumerate() {
            assert!(GAMES[i + 1..].iter().all(|other| other.id != g.id), "duplicate {}", g.id);
        }
    }

    #[test]
    fn test_enabled_game_accepted() {
        let g = enabled_game("alien-invasion").unwrap();
        assert_eq!(g.name, "Alien Invasion");
    }

    #[test]
    fn test_disabled_game_rejected() {
        let err = enabled_game("whisper-web").unwrap_err();
        assert!(matches!(err, OrganismsError::Config(_)));
        assert!(err.to_string().contains("not enabled"));
    }

    #[test]
    fn test_unknown_game_rejected() {
        let err = enabled_game("alien-invashun").unwrap_err();
        assert!(err.to_string().contains("unknown game"));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("rush-hour-rebels"), "Rush Hour Rebels");
        assert_eq!(display_name("custom"), "custom");
    }
}
