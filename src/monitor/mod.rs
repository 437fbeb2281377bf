//! Boucle d'alerte
//!
//! Lit des blocs du microphone, en tire un niveau crête et décide quand
//! déclencher l'alerte.

mod config;
mod cooldown;
mod level;
mod realtime;

pub use config::{LoopTiming, MonitorConfig, SharedConfig};
pub use realtime::{MonitorContext, MonitorEvent, MonitorHandle};
