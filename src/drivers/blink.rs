//! Indicator LED driver.
//!
//! A single GPIO toggled by the blink task to prove liveness. Generic
//! over [`embedded_hal::digital::OutputPin`] so the logic runs against
//! an ESP-IDF `PinDriver` on device and a trivial pin on the host.

use embedded_hal::digital::OutputPin;

pub struct BlinkLed<P: OutputPin> {
    pin: P,
    on: bool,
}

impl<P: OutputPin> BlinkLed<P> {
    pub fn new(pin: P) -> Self {
        Self { pin, on: false }
    }

    /// Flip the LED. The blink task calls this every half period.
    pub fn toggle(&mut self) -> Result<(), P::Error> {
        self.set(!self.on)
    }

    pub fn set(&mut self, on: bool) -> Result<(), P::Error> {
        if on {
            self.pin.set_high()?;
        } else {
            self.pin.set_low()?;
        }
        self.on = on;
        Ok(())
    }

    pub fn is_on(&self) -> bool {
        self.on
    }
}

/// Host-side pin: tracks state in memory only.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Default)]
pub struct SimPin {
    pub high: bool,
}

#[cfg(not(target_os = "espidf"))]
impl embedded_hal::digital::ErrorType for SimPin {
    type Error = core::convert::Infallible;
}

#[cfg(not(target_os = "espidf"))]
impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high = true;
        Ok(())
    }
}
