//! Réglages de la surveillance

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Réglages modifiés par l'utilisateur pendant la surveillance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorConfig {
    /// Index du périphérique d'entrée sélectionné
    pub device: Option<usize>,
    /// Multiplicateur linéaire appliqué à la crête, attendu dans [0, 1]
    pub sensitivity: f32,
    /// Niveau au-dessus duquel l'alerte se déclenche
    pub threshold: f32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            device: None,
            sensitivity: 0.5,
            threshold: 50.0,
        }
    }
}

/// Configuration partagée entre la surface de contrôle (écriture) et la boucle (lecture)
pub type SharedConfig = Arc<RwLock<MonitorConfig>>;

/// Cadence de la boucle
#[derive(Debug, Clone, Copy)]
pub struct LoopTiming {
    /// Pause entre deux cycles, en plus de la lecture bloquante
    pub cycle_pause: Duration,
    /// Durée pendant laquelle les alertes sont suspendues après un déclenchement
    pub cooldown: Duration,
}

impl Default for LoopTiming {
    fn default() -> Self {
        Self {
            cycle_pause: Duration::from_millis(100),
            cooldown: Duration::from_secs(3),
        }
    }
}
