//! Background thread running periodic stale-lock sweeps.

use std::io;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use super::{LOCK_TARGET, Shared};

#[derive(Debug)]
pub(super) struct Sweeper {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    pub(super) fn spawn(shared: Arc<Shared>, interval: Duration) -> io::Result<Self> {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("ledgerguard-sweeper".to_string())
            .spawn(move || {
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => match shared.cleanup_stale_locks() {
                            Ok(reclaimed) => debug!(
                                target: LOCK_TARGET,
                                reclaimed = reclaimed.len(),
                                "stale lock sweep finished"
                            ),
                            Err(error) => warn!(
                                target: LOCK_TARGET,
                                error = %error,
                                "stale lock sweep failed"
                            ),
                        },
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;
        Ok(Self { stop, handle })
    }

    pub(super) fn stop(self) {
        if self.stop.send(()).is_err() {
            debug!(target: LOCK_TARGET, "stale lock sweeper already exited");
        }
        if self.handle.join().is_err() {
            warn!(target: LOCK_TARGET, "stale lock sweeper panicked");
        }
    }
}
