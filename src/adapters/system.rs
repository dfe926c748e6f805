//! Device restart.

use log::info;

/// Full device restart — the post-update "process exit".
///
/// On host targets this terminates the process instead, which is the
/// closest simulation of a reboot the environment offers.
pub fn restart() -> ! {
    info!("system: restarting");

    #[cfg(target_os = "espidf")]
    esp_ota::restart();

    #[cfg(not(target_os = "espidf"))]
    std::process::exit(0);
}
