use std::{future::Future, thread};
use tokio::runtime::{Builder, Handle};

/// Runs a session future to completion without requiring the caller to hold
/// a runtime: reuse the ambient Tokio runtime when there is one, otherwise
/// dedicate a current-thread runtime on a named thread.
pub(crate) fn spawn_detached<F>(name: &str, future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn(future);
        }
        Err(_) => {
            thread::Builder::new()
                .name(format!("rcon-{name}"))
                .spawn(move || {
                    let runtime =
                        Builder::new_current_thread().enable_all().build().expect("rcon session runtime");
                    runtime.block_on(future);
                })
                .expect("spawn rcon session thread");
        }
    }
}
