//! Surface de contrôle
//!
//! Configure la boucle d'alerte, la démarre, l'arrête et expose ce qu'elle publie.

mod commands;
pub mod console;

pub use commands::{ControlError, ControlSurface, StatusResponse};
