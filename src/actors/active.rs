//! Cooperative stop flag
//!
//! Every actor loop reads the flag at the top of each iteration. While an
//! actor is idle (sleeping until its next tick or waiting on its bus) it
//! also wakes up when the flag flips, but work that has already started is
//! never interrupted.

use tokio::sync::watch;

/// Owning side of the flag, held by the controller
#[derive(Debug)]
pub struct ActiveSwitch {
    tx: watch::Sender<bool>,
}

impl ActiveSwitch {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(true);
        Self { tx }
    }

    pub fn subscribe(&self) -> ActiveFlag {
        ActiveFlag {
            rx: self.tx.subscribe(),
        }
    }

    pub fn is_active(&self) -> bool {
        *self.tx.borrow()
    }

    /// Clear the flag. Returns whether it was set before.
    pub fn deactivate(&self) -> bool {
        self.tx.send_replace(false)
    }
}

impl Default for ActiveSwitch {
    fn default() -> Self {
        Self::new()
    }
}

/// Read side of the flag, one clone per actor
#[derive(Debug, Clone)]
pub struct ActiveFlag {
    rx: watch::Receiver<bool>,
}

impl ActiveFlag {
    pub fn is_active(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the flag is cleared (or its switch is gone).
    pub async fn deactivated(&mut self) {
        loop {
            if !*self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}
