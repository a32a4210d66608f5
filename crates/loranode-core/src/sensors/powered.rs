use core::fmt::Debug;

use embedded_hal::digital::OutputPin;
use log::warn;

use super::{Sensor, SensorError};

/// Sensor whose supply is switched on only for the duration of a read.
pub struct PoweredSensor<S, P> {
    sensor: S,
    power: P,
}

impl<S, P> PoweredSensor<S, P>
where
    S: Sensor,
    P: OutputPin,
    P::Error: Debug,
{
    pub fn new(sensor: S, mut power: P) -> Self {
        if let Err(e) = power.set_low() {
            warn!("Could not switch sensor supply off: {:?}", e);
        }
        Self { sensor, power }
    }

    pub fn into_inner(self) -> (S, P) {
        (self.sensor, self.power)
    }
}

impl<S, P> Sensor for PoweredSensor<S, P>
where
    S: Sensor,
    P: OutputPin,
    P::Error: Debug,
{
    type Reading = S::Reading;

    async fn read(&mut self) -> Result<S::Reading, SensorError> {
        self.power.set_high().map_err(|e| {
            warn!("Could not switch sensor supply on: {:?}", e);
            SensorError::ReadFailed {
                sensor: "power switch",
                operation: "enable supply",
                details: "GPIO error",
            }
        })?;
        let reading = self.sensor.read().await;
        if let Err(e) = self.power.set_low() {
            warn!("Could not switch sensor supply off: {:?}", e);
        }
        reading
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::rc::Rc;
    use alloc::vec::Vec;
    use core::cell::RefCell;
    use core::convert::Infallible;
    use embassy_futures::block_on;

    #[derive(Clone, Default)]
    struct Supply {
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl embedded_hal::digital::ErrorType for Supply {
        type Error = Infallible;
    }

    impl OutputPin for Supply {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.log.borrow_mut().push("off");
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.log.borrow_mut().push("on");
            Ok(())
        }
    }

    struct Probe {
        log: Rc<RefCell<Vec<&'static str>>>,
        fail: bool,
    }

    impl Sensor for Probe {
        type Reading = u16;

        async fn read(&mut self) -> Result<u16, SensorError> {
            self.log.borrow_mut().push("read");
            if self.fail {
                Err(SensorError::Timeout {
                    sensor: "probe",
                    operation: "read",
                })
            } else {
                Ok(7)
            }
        }
    }

    #[test]
    fn test_supply_wraps_each_read() {
        let supply = Supply::default();
        let probe = Probe {
            log: supply.log.clone(),
            fail: false,
        };
        let mut sensor = PoweredSensor::new(probe, supply.clone());

        assert_eq!(block_on(sensor.read()), Ok(7));
        assert_eq!(*supply.log.borrow(), ["off", "on", "read", "off"]);
    }

    #[test]
    fn test_supply_is_switched_off_after_a_failed_read() {
        let supply = Supply::default();
        let probe = Probe {
            log: supply.log.clone(),
            fail: true,
        };
        let mut sensor = PoweredSensor::new(probe, supply.clone());

        assert!(block_on(sensor.read()).is_err());
        assert_eq!(supply.log.borrow().last(), Some(&"off"));
    }
}
