//! Commandes de la surface de contrôle
//!
//! Tout ce qu'un front-end peut faire sur la surveillance: choisir un
//! périphérique, régler la sensibilité et le seuil, démarrer et arrêter.

use crate::alert::AlertPlayer;
use crate::audio::{AudioBackend, AudioConfig, InputDevice, MicrophoneError};
use crate::monitor::{
    LoopTiming, MonitorConfig, MonitorContext, MonitorEvent, MonitorHandle, SharedConfig,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};

/// Erreurs de la surface de contrôle
#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Aucun périphérique d'entrée sélectionné")]
    NoDeviceSelected,

    #[error("Périphérique d'entrée inconnu: {0}")]
    UnknownDevice(usize),

    #[error("Seuil invalide {0:?}: nombre positif attendu")]
    InvalidThreshold(String),

    #[error("Surveillance déjà en cours")]
    AlreadyRunning,

    #[error("Erreur audio: {0}")]
    Audio(#[from] MicrophoneError),
}

/// État courant pour le front-end
#[derive(Debug, Clone, PartialEq)]
pub struct StatusResponse {
    pub monitoring: bool,
    pub device: Option<InputDevice>,
    pub sensitivity: f32,
    pub threshold: f32,
    pub level: f32,
    pub cooldown_active: bool,
}

/// Possède la configuration et la session de surveillance en cours
pub struct ControlSurface {
    devices: Vec<InputDevice>,
    context: MonitorContext,
    monitor: Option<MonitorHandle>,
}

impl ControlSurface {
    /// Crée la surface avec les réglages de stream par défaut
    pub fn new(backend: Arc<dyn AudioBackend>, player: Arc<dyn AlertPlayer>) -> Self {
        Self::with_settings(backend, player, AudioConfig::default(), LoopTiming::default())
    }

    /// Crée la surface; les périphériques d'entrée sont énumérés une seule fois, ici
    pub fn with_settings(
        backend: Arc<dyn AudioBackend>,
        player: Arc<dyn AlertPlayer>,
        audio: AudioConfig,
        timing: LoopTiming,
    ) -> Self {
        let devices = backend.input_devices();
        tracing::info!("{} périphérique(s) d'entrée trouvé(s)", devices.len());
        tracing::info!("Alerte: {}", player.describe());

        let (events, _) = broadcast::channel(100);
        let config: SharedConfig = Arc::new(RwLock::new(MonitorConfig::default()));

        Self {
            devices,
            context: MonitorContext {
                backend,
                player,
                config,
                audio,
                timing,
                events,
            },
            monitor: None,
        }
    }

    /// Périphériques d'entrée trouvés au démarrage
    pub fn list_devices(&self) -> &[InputDevice] {
        &self.devices
    }

    /// Fait de `index` le périphérique du prochain `start`
    pub async fn select_device(&self, index: usize) -> Result<InputDevice, ControlError> {
        let device = self
            .devices
            .iter()
            .find(|device| device.index == index)
            .cloned()
            .ok_or(ControlError::UnknownDevice(index))?;

        self.context.config.write().await.device = Some(index);
        tracing::info!("Périphérique d'entrée sélectionné: {}", device);
        Ok(device)
    }

    /// Met à jour la sensibilité, prise en compte au cycle suivant
    ///
    /// La valeur est stockée telle quelle.
    pub async fn set_sensitivity(&self, value: f32) {
        self.context.config.write().await.sensitivity = value;
        tracing::debug!("Sensibilité: {}", value);
    }

    /// Lit et stocke le seuil d'alerte, pris en compte au cycle suivant
    pub async fn set_threshold(&self, input: &str) -> Result<f32, ControlError> {
        let threshold = parse_threshold(input)?;
        self.context.config.write().await.threshold = threshold;
        tracing::debug!("Seuil: {}", threshold);
        Ok(threshold)
    }

    /// Ouvre le périphérique sélectionné et lance la boucle d'alerte
    pub async fn start(&mut self) -> Result<(), ControlError> {
        self.reap().await;
        if self.monitor.is_some() {
            return Err(ControlError::AlreadyRunning);
        }

        let device = self
            .context
            .config
            .read()
            .await
            .device
            .ok_or(ControlError::NoDeviceSelected)?;

        let handle = MonitorHandle::spawn(device, self.context.clone()).await?;
        self.monitor = Some(handle);
        tracing::info!("Surveillance démarrée sur le périphérique {}", device);
        Ok(())
    }

    /// Arrête la boucle d'alerte et libère le stream
    ///
    /// Renvoie false si rien ne tournait.
    pub async fn stop(&mut self) -> bool {
        match self.monitor.take() {
            Some(handle) => {
                release(handle).await;
                tracing::info!("Surveillance arrêtée");
                true
            }
            None => false,
        }
    }

    /// Arrête la surveillance et coupe le son d'alerte avant la sortie de l'application
    pub async fn shutdown(&mut self) {
        self.stop().await;
        self.context.player.silence();
        tracing::info!("Arrêt terminé");
    }

    /// Abonnement aux notifications de niveau, d'alerte et de cycle de vie
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.context.events.subscribe()
    }

    /// Indique si la commande start est disponible
    pub async fn can_start(&mut self) -> bool {
        self.reap().await;
        self.monitor.is_none() && self.context.config.read().await.device.is_some()
    }

    /// Indique si la commande stop est disponible
    pub async fn can_stop(&mut self) -> bool {
        self.reap().await;
        self.monitor.is_some()
    }

    pub async fn status(&mut self) -> StatusResponse {
        self.reap().await;
        let config = *self.context.config.read().await;
        let state = self
            .monitor
            .as_ref()
            .map(|handle| handle.state())
            .unwrap_or_default();

        StatusResponse {
            monitoring: state.monitoring,
            device: config
                .device
                .and_then(|index| self.devices.iter().find(|d| d.index == index).cloned()),
            sensitivity: config.sensitivity,
            threshold: config.threshold,
            level: state.last_level,
            cooldown_active: state.cooldown_active,
        }
    }

    /// Récupère une session dont la boucle s'est déjà terminée seule
    async fn reap(&mut self) {
        let finished = self
            .monitor
            .as_ref()
            .is_some_and(|handle| !handle.is_running());
        if finished {
            if let Some(handle) = self.monitor.take() {
                tracing::debug!("Récupération de la session terminée sur le périphérique {}", handle.device());
                release(handle).await;
            }
        }
    }
}

/// Attend le thread de la boucle hors du runtime async
async fn release(mut handle: MonitorHandle) {
    if let Err(e) = tokio::task::spawn_blocking(move || handle.stop()).await {
        tracing::error!("Impossible d'attendre la boucle d'alerte: {}", e);
    }
}

/// Accepte entiers et décimaux, refuse les négatifs et les valeurs non finies
fn parse_threshold(input: &str) -> Result<f32, ControlError> {
    let trimmed = input.trim();
    match trimmed.parse::<f32>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
        _ => Err(ControlError::InvalidThreshold(trimmed.to_string())),
    }
}
