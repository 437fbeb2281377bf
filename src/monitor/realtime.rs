//! Boucle de surveillance temps réel
//!
//! La boucle tourne sur un thread dédié qui ouvre lui-même le stream d'entrée,
//! le garde toute la session et le libère à chaque sortie.

use super::config::{LoopTiming, MonitorConfig, SharedConfig};
use super::cooldown::Cooldown;
use super::level::peak_level;
use crate::alert::AlertPlayer;
use crate::audio::{AudioBackend, AudioConfig, MicrophoneError};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, oneshot};

/// Notifications publiées par le thread de surveillance
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    /// Stream ouvert, boucle lancée
    Started { device: usize },
    /// Niveau calculé pour le dernier bloc
    Level(f32),
    /// Son d'alerte déclenché
    Alert { level: f32 },
    /// Délai écoulé, le prochain bloc trop fort déclenche à nouveau
    CooldownEnded,
    /// Boucle interrompue par une erreur audio
    Failed(String),
    /// Boucle terminée, stream libéré
    Stopped,
}

/// État instantané d'une session
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MonitorState {
    pub monitoring: bool,
    pub cooldown_active: bool,
    pub last_level: f32,
}

/// Résultat d'un cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleOutcome {
    pub level: f32,
    pub alerted: bool,
    pub cooldown_ended: bool,
}

/// Décisions de seuil et de délai, sans thread ni périphérique
pub struct AlertLoop {
    cooldown: Cooldown,
    player: Arc<dyn AlertPlayer>,
    last_level: f32,
}

impl AlertLoop {
    pub fn new(player: Arc<dyn AlertPlayer>, cooldown: Duration) -> Self {
        Self {
            cooldown: Cooldown::new(cooldown),
            player,
            last_level: 0.0,
        }
    }

    /// Mesure un bloc et déclenche l'alerte s'il est trop fort et que le
    /// délai le permet
    pub fn cycle(&mut self, block: &[i16], config: &MonitorConfig, now: Instant) -> CycleOutcome {
        let cooldown_ended = self.cooldown.expire(now);
        if cooldown_ended {
            tracing::debug!("Fin du délai entre alertes");
        }

        let level = peak_level(block, config.sensitivity);
        self.last_level = level;

        let alerted = level > config.threshold && self.cooldown.try_trigger(now);
        if alerted {
            tracing::info!(
                "Niveau {:.2} au-dessus du seuil {}, alerte (délai {:?})",
                level,
                config.threshold,
                self.cooldown.duration()
            );
            if let Err(e) = self.player.play() {
                tracing::warn!("Échec de lecture de l'alerte: {}", e);
            }
        }

        CycleOutcome {
            level,
            alerted,
            cooldown_ended,
        }
    }

    pub fn cooldown_active(&self, now: Instant) -> bool {
        self.cooldown.is_active(now)
    }

    pub fn last_level(&self) -> f32 {
        self.last_level
    }
}

/// Tout ce dont une session a besoin hormis le périphérique
#[derive(Clone)]
pub struct MonitorContext {
    pub backend: Arc<dyn AudioBackend>,
    pub player: Arc<dyn AlertPlayer>,
    pub config: SharedConfig,
    pub audio: AudioConfig,
    pub timing: LoopTiming,
    pub events: broadcast::Sender<MonitorEvent>,
}

/// Indicateurs écrits par le thread de la boucle, lus par la surface de contrôle
#[derive(Default)]
struct SessionFlags {
    running: AtomicBool,
    cooldown: AtomicBool,
    level_bits: AtomicU32,
}

impl SessionFlags {
    fn publish(&self, level: f32, cooldown_active: bool) {
        self.level_bits.store(level.to_bits(), Ordering::Relaxed);
        self.cooldown.store(cooldown_active, Ordering::Relaxed);
    }

    fn snapshot(&self) -> MonitorState {
        MonitorState {
            monitoring: self.running.load(Ordering::Acquire),
            cooldown_active: self.cooldown.load(Ordering::Relaxed),
            last_level: f32::from_bits(self.level_bits.load(Ordering::Relaxed)),
        }
    }
}

/// Handle sur un thread de surveillance en cours
pub struct MonitorHandle {
    device: usize,
    flags: Arc<SessionFlags>,
    thread_handle: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Ouvre le périphérique sur un nouveau thread et lance la boucle
    ///
    /// Se résout une fois le stream ouvert, ou avec l'erreur qui l'en a empêché.
    pub async fn spawn(device: usize, context: MonitorContext) -> Result<Self, MicrophoneError> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let flags = Arc::new(SessionFlags::default());
        flags.running.store(true, Ordering::Release);

        let thread_flags = Arc::clone(&flags);
        let thread_handle = thread::Builder::new()
            .name("alert-loop".to_string())
            .spawn(move || run_alert_loop(device, context, thread_flags, ready_tx))
            .map_err(|e| MicrophoneError::StreamError(e.to_string()))?;

        let opened = ready_rx.await.unwrap_or_else(|_| {
            Err(MicrophoneError::StreamError(
                "le thread de surveillance s'est arrêté avant l'ouverture du stream".to_string(),
            ))
        });

        let mut handle = Self {
            device,
            flags,
            thread_handle: Some(thread_handle),
        };

        match opened {
            Ok(()) => Ok(handle),
            Err(e) => {
                // Le thread est déjà en train de se terminer
                tokio::task::spawn_blocking(move || handle.stop())
                    .await
                    .ok();
                Err(e)
            }
        }
    }

    /// Périphérique de la session
    pub fn device(&self) -> usize {
        self.device
    }

    /// Faux dès que la boucle est sortie, sur demande ou après une erreur
    pub fn is_running(&self) -> bool {
        self.flags.running.load(Ordering::Acquire)
    }

    pub fn state(&self) -> MonitorState {
        self.flags.snapshot()
    }

    /// Signale l'arrêt à la boucle et attend qu'elle libère le stream
    ///
    /// Bloque au plus un cycle. Peut être appelé plusieurs fois.
    pub fn stop(&mut self) {
        self.flags.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                tracing::error!("Le thread de la boucle d'alerte a paniqué");
            }
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Corps du thread de surveillance
fn run_alert_loop(
    device: usize,
    context: MonitorContext,
    flags: Arc<SessionFlags>,
    ready: oneshot::Sender<Result<(), MicrophoneError>>,
) {
    let mut source = match context.backend.open_input(device, &context.audio) {
        Ok(source) => source,
        Err(e) => {
            tracing::error!("Impossible d'ouvrir le périphérique d'entrée {}: {}", device, e);
            flags.running.store(false, Ordering::Release);
            let _ = ready.send(Err(e));
            return;
        }
    };

    if ready.send(Ok(())).is_err() {
        tracing::warn!("Démarrage abandonné, fermeture du périphérique {}", device);
        flags.running.store(false, Ordering::Release);
        return;
    }

    tracing::info!("Surveillance du périphérique {}", device);
    let _ = context.events.send(MonitorEvent::Started { device });

    let mut alert_loop = AlertLoop::new(Arc::clone(&context.player), context.timing.cooldown);
    let mut block = vec![0i16; context.audio.block_size];

    while flags.running.load(Ordering::Acquire) {
        if let Err(e) = source.read_block(&mut block) {
            tracing::error!("Échec de lecture audio, surveillance arrêtée: {}", e);
            let _ = context.events.send(MonitorEvent::Failed(e.to_string()));
            break;
        }

        let config = *context.config.blocking_read();
        let now = Instant::now();
        let outcome = alert_loop.cycle(&block, &config, now);
        flags.publish(outcome.level, alert_loop.cooldown_active(now));

        if outcome.cooldown_ended {
            let _ = context.events.send(MonitorEvent::CooldownEnded);
        }
        if outcome.alerted {
            let _ = context.events.send(MonitorEvent::Alert {
                level: outcome.level,
            });
        }
        let _ = context.events.send(MonitorEvent::Level(outcome.level));

        thread::sleep(context.timing.cycle_pause);
    }

    flags.running.store(false, Ordering::Release);
    flags.publish(0.0, false);
    drop(source);

    tracing::info!("Surveillance arrêtée, dernier niveau {:.2}", alert_loop.last_level());
    let _ = context.events.send(MonitorEvent::Stopped);
}
