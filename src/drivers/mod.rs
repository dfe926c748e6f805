//! Peripheral drivers for the indicator LED and the task watchdog.

pub mod blink;
pub mod watchdog;
