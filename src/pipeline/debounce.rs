//! # Debounce Module
//!
//! Timer cancellabile identificato da un token monotono.
//! Ogni nuovo evento riarma il timer; solo il token più recente è valido
//! quando arriva al coordinatore.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Identifies one arming of the timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceToken(u64);

/// Re-armable quiescence timer
pub struct Debouncer {
    delay: Duration,
    token: u64,
    timer: Option<JoinHandle<()>>,
    fire_tx: mpsc::UnboundedSender<DebounceToken>,
}

impl Debouncer {
    /// Crea il debouncer e il canale su cui arrivano gli scatti del timer
    pub fn new(delay: Duration) -> (Self, mpsc::UnboundedReceiver<DebounceToken>) {
        let (fire_tx, fire_rx) = mpsc::unbounded_channel();
        let debouncer = Self {
            delay,
            token: 0,
            timer: None,
            fire_tx,
        };
        (debouncer, fire_rx)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// (Ri)arma il timer, invalidando il token precedente
    pub fn arm(&mut self) -> DebounceToken {
        self.abort_timer();
        self.token += 1;

        let token = DebounceToken(self.token);
        let fire_tx = self.fire_tx.clone();
        let delay = self.delay;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = fire_tx.send(token);
        }));

        token
    }

    /// Disarma il timer; anche un token già consegnato diventa stale
    pub fn cancel(&mut self) {
        self.abort_timer();
        self.token += 1;
    }

    /// Consumes a delivered token. Returns false for stale tokens.
    pub fn accept(&mut self, token: DebounceToken) -> bool {
        if self.timer.is_some() && token.0 == self.token {
            self.timer = None;
            true
        } else {
            false
        }
    }

    fn abort_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.abort_timer();
    }
}
