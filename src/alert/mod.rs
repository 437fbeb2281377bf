//! Module d'alerte sonore
//!
//! Joue le son d'avertissement quand la surveillance juge la pièce trop bruyante.

mod player;

pub use player::{player_from_config, AlertConfig, AlertPlayer};

#[cfg(test)]
pub use player::{AlertError, MockAlertPlayer, TerminalBell};
