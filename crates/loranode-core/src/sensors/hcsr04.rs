//! HC-SR04 ultrasonic range finder
//!
//! A 10 µs trigger pulse starts a ping; the echo line then stays high for the
//! round-trip time of the sound. At roughly 58 µs per centimetre the 500 cm
//! range limit bounds how long an echo may last.

use core::fmt::Debug;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use log::error;

use super::{Sensor, SensorError};
use crate::time::Clock;

const SENSOR: &str = "HC-SR04";

/// Largest distance reported; longer echoes count as a timeout.
pub const MAX_DISTANCE_CM: u16 = 500;

const US_PER_CM: u64 = 58;
const TRIGGER_PULSE_US: u32 = 10;
/// Echo must start within this time after the trigger.
const ECHO_START_TIMEOUT_US: u64 = 6_000;

pub struct HcSr04<T, E, D, C> {
    trigger: T,
    echo: E,
    delay: D,
    clock: C,
}

impl<T, E, D, C> HcSr04<T, E, D, C>
where
    T: OutputPin,
    E: InputPin,
    T::Error: Debug,
    E::Error: Debug,
    D: DelayNs,
    C: Clock,
{
    pub fn new(mut trigger: T, echo: E, delay: D, clock: C) -> Result<Self, SensorError> {
        trigger.set_low().map_err(pin_error)?;
        Ok(Self {
            trigger,
            echo,
            delay,
            clock,
        })
    }

    /// One ping, in whole centimetres.
    pub fn measure_cm(&mut self) -> Result<u16, SensorError> {
        let max_echo_us = u64::from(MAX_DISTANCE_CM) * US_PER_CM;

        self.trigger.set_low().map_err(pin_error)?;
        self.delay.delay_us(2);
        self.trigger.set_high().map_err(pin_error)?;
        self.delay.delay_us(TRIGGER_PULSE_US);
        self.trigger.set_low().map_err(pin_error)?;

        let armed = self.clock.now_us();
        while self.echo.is_low().map_err(pin_error)? {
            if self.clock.now_us() - armed > ECHO_START_TIMEOUT_US {
                return Err(SensorError::Timeout {
                    sensor: SENSOR,
                    operation: "wait for echo",
                });
            }
        }

        let start = self.clock.now_us();
        while self.echo.is_high().map_err(pin_error)? {
            if self.clock.now_us() - start > max_echo_us {
                return Err(SensorError::Timeout {
                    sensor: SENSOR,
                    operation: "echo out of range",
                });
            }
        }
        let width = self.clock.now_us() - start;

        Ok((width / US_PER_CM) as u16)
    }
}

fn pin_error<E: Debug>(e: E) -> SensorError {
    error!("HC-SR04 pin error: {:?}", e);
    SensorError::ReadFailed {
        sensor: SENSOR,
        operation: "access trigger/echo pin",
        details: "GPIO error",
    }
}

impl<T, E, D, C> Sensor for HcSr04<T, E, D, C>
where
    T: OutputPin,
    E: InputPin,
    T::Error: Debug,
    E::Error: Debug,
    D: DelayNs,
    C: Clock,
{
    type Reading = u16;

    async fn read(&mut self) -> Result<u16, SensorError> {
        self.measure_cm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::VirtualTime;
    use alloc::rc::Rc;
    use core::cell::Cell;
    use core::convert::Infallible;
    use embassy_futures::block_on;

    /// Echo line driven by virtual time: goes high `delay_us` after the
    /// trigger falls and stays high for `width_us`. Every poll costs 1 µs.
    struct EchoLine {
        time: VirtualTime,
        fired_at: Rc<Cell<Option<u64>>>,
        delay_us: u64,
        width_us: Option<u64>,
    }

    impl EchoLine {
        fn level(&mut self) -> bool {
            self.time.advance_us(1);
            let (Some(fired), Some(width)) = (self.fired_at.get(), self.width_us) else {
                return false;
            };
            let now = self.time.now_us();
            now >= fired + self.delay_us && now < fired + self.delay_us + width
        }
    }

    impl embedded_hal::digital::ErrorType for EchoLine {
        type Error = Infallible;
    }

    impl InputPin for EchoLine {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(self.level())
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            Ok(!self.level())
        }
    }

    struct TriggerLine {
        time: VirtualTime,
        fired_at: Rc<Cell<Option<u64>>>,
        high: bool,
    }

    impl embedded_hal::digital::ErrorType for TriggerLine {
        type Error = Infallible;
    }

    impl OutputPin for TriggerLine {
        fn set_low(&mut self) -> Result<(), Infallible> {
            if self.high {
                self.fired_at.set(Some(self.time.now_us()));
            }
            self.high = false;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.high = true;
            Ok(())
        }
    }

    fn sensor(
        width_us: Option<u64>,
    ) -> HcSr04<TriggerLine, EchoLine, crate::testing::VirtualDelay, VirtualTime> {
        let time = VirtualTime::new();
        let fired_at = Rc::new(Cell::new(None));
        let trigger = TriggerLine {
            time: time.clone(),
            fired_at: fired_at.clone(),
            high: false,
        };
        let echo = EchoLine {
            time: time.clone(),
            fired_at,
            delay_us: 200,
            width_us,
        };
        HcSr04::new(trigger, echo, time.delay(), time).unwrap()
    }

    #[test]
    fn test_distance_from_echo_width() {
        let mut sensor = sensor(Some(58 * 42 + 20));
        assert_eq!(block_on(sensor.read()), Ok(42));
    }

    #[test]
    fn test_missing_echo_times_out() {
        let mut sensor = sensor(None);
        assert_eq!(
            sensor.measure_cm(),
            Err(SensorError::Timeout {
                sensor: SENSOR,
                operation: "wait for echo",
            })
        );
    }

    #[test]
    fn test_echo_beyond_range_times_out() {
        let mut sensor = sensor(Some(58 * 600));
        assert_eq!(
            sensor.measure_cm(),
            Err(SensorError::Timeout {
                sensor: SENSOR,
                operation: "echo out of range",
            })
        );
    }
}
