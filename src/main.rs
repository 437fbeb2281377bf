//! Stop Yelling - surveillance du volume du microphone
//!
//! Écoute un microphone et émet un bip quand le niveau dépasse le seuil.

mod alert;
mod audio;
mod control;
mod monitor;

use alert::AlertConfig;
use audio::CpalBackend;
use control::console::{self, ConsoleCommand, Flow};
use control::ControlSurface;
use monitor::MonitorEvent;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stop_yelling=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Stop Yelling v{}", env!("CARGO_PKG_VERSION"));

    let player = alert::player_from_config(&AlertConfig::default());
    let mut surface = ControlSurface::new(Arc::new(CpalBackend::new()), player);

    println!("Stop Yelling - surveillance du microphone");
    println!();
    println!("Périphériques d'entrée:");
    println!("{}", console::render_devices(&surface));
    println!();
    println!("Tapez 'help' pour la liste des commandes.");

    let display = tokio::spawn(display_events(surface.subscribe()));

    read_commands(&mut surface, BufReader::new(tokio::io::stdin())).await;

    surface.shutdown().await;
    display.abort();
    Ok(())
}

/// Exécute les commandes lues sur `input` jusqu'à quit, fin de flux, erreur de lecture ou Ctrl-C
async fn read_commands<R: AsyncBufRead + Unpin>(surface: &mut ControlSurface, input: R) {
    let mut lines = input.lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!("Erreur de lecture de l'entrée standard: {}", e);
                    None
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interruption");
                None
            }
        };

        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let command = match line.parse::<ConsoleCommand>() {
            Ok(command) => command,
            Err(message) => {
                eprintln!("{}", message);
                continue;
            }
        };

        match console::execute(surface, command).await {
            Ok(Flow::Continue(output)) => println!("{}", output),
            Ok(Flow::Quit) => break,
            Err(e) => eprintln!("Erreur: {}", e),
        }
    }
}

/// Affiche le niveau sur une seule ligne réécrite, les autres notifications sur leur propre ligne
async fn display_events(mut events: broadcast::Receiver<MonitorEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("Affichage: {} événements sautés", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let Some(text) = console::render_event(&event) else {
            continue;
        };

        let mut stdout = std::io::stdout();
        let _ = match event {
            MonitorEvent::Level(_) => write!(stdout, "\r{:<32}", text),
            _ => writeln!(stdout, "\r{:<32}", text),
        };
        let _ = stdout.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::scripted_backend;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, ReadBuf};

    /// Entrée qui livre `lines` puis échoue
    struct BrokenInput {
        lines: &'static [u8],
        sent: bool,
    }

    impl AsyncRead for BrokenInput {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<std::io::Result<()>> {
            if self.sent {
                return Poll::Ready(Err(std::io::Error::other("terminal fermé")));
            }
            self.sent = true;
            buf.put_slice(self.lines);
            Poll::Ready(Ok(()))
        }
    }

    fn surface(drops: &Arc<AtomicUsize>) -> ControlSurface {
        let backend = scripted_backend(16384, None, Arc::clone(drops));
        ControlSurface::new(Arc::new(backend), Arc::new(alert::TerminalBell))
    }

    #[tokio::test]
    async fn input_error_ends_loop_and_shutdown_still_runs() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut surface = surface(&drops);
        let input = BufReader::new(BrokenInput {
            lines: b"select 0\nthreshold 90\nstart\n",
            sent: false,
        });

        tokio::time::timeout(std::time::Duration::from_secs(2), read_commands(&mut surface, input))
            .await
            .expect("la boucle se termine sur l'erreur");

        assert!(surface.can_stop().await);
        surface.shutdown().await;
        assert!(!surface.can_stop().await);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn quit_stops_reading() {
        let drops = Arc::new(AtomicUsize::new(0));
        let mut surface = surface(&drops);
        let input = BufReader::new(&b"quit\nselect 0\n"[..]);

        read_commands(&mut surface, input).await;

        assert!(surface.status().await.device.is_none());
    }
}
