//! Délai entre deux alertes
//!
//! Échéance vérifiée à chaque cycle plutôt qu'un timer: rien ne reste actif
//! quand la surveillance s'arrête pendant le délai.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Cooldown {
    duration: Duration,
    until: Option<Instant>,
}

impl Cooldown {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            until: None,
        }
    }

    /// Indique si les alertes sont suspendues
    pub fn is_active(&self, now: Instant) -> bool {
        self.until.is_some_and(|until| now < until)
    }

    /// Arme le délai s'il ne court pas déjà; renvoie true s'il a été armé
    pub fn try_trigger(&mut self, now: Instant) -> bool {
        if self.is_active(now) {
            return false;
        }
        self.until = Some(now + self.duration);
        true
    }

    /// Efface une échéance passée; renvoie true une seule fois par expiration
    pub fn expire(&mut self, now: Instant) -> bool {
        match self.until {
            Some(until) if now >= until => {
                self.until = None;
                true
            }
            _ => false,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}
