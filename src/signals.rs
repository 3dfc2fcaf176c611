use signal_hook::{consts::SIGINT, iterator::Signals};
use tokio::sync::watch;

/// What should we do when the user stops this program?
///
/// The first SIGINT cancels every running wait. The second one exits right
/// away.
pub fn handle_sigint(cancel: watch::Sender<bool>) -> std::io::Result<()> {
    let mut signals = Signals::new([SIGINT])?;

    std::thread::spawn(move || {
        for _ in signals.forever() {
            if *cancel.borrow() {
                log::warn!("Interrupted twice, exiting");
                std::process::exit(130);
            }
            log::info!("Interrupted, cancelling");
            cancel.send_replace(true);
        }
    });

    Ok(())
}
