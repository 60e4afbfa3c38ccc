use std::process;
use std::thread;

use harvest_engine::Canceller;
use harvest_logging::{harvest_error, harvest_warn};

/// Exit code used when a run stops on Ctrl-C.
pub const INTERRUPTED: u8 = 130;

/// First Ctrl-C cancels the engine's current run; a second one exits.
pub fn cancel_on_ctrl_c(canceller: Canceller) {
    let spawned = thread::Builder::new()
        .name("harvest-signal".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    harvest_error!("Ctrl-C handling unavailable: {}", err);
                    return;
                }
            };
            runtime.block_on(async move {
                if tokio::signal::ctrl_c().await.is_err() {
                    return;
                }
                harvest_warn!("Interrupted, finishing chapters already in flight");
                canceller.cancel();
                if tokio::signal::ctrl_c().await.is_ok() {
                    process::exit(i32::from(INTERRUPTED));
                }
            });
        });
    if let Err(err) = spawned {
        harvest_error!("Failed to start signal thread: {}", err);
    }
}
