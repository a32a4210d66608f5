//! DS18B20 one-wire temperature sensor
//!
//! The sensor is discovered once with Read ROM, which only works with a
//! single device on the bus (several devices garble the ROM and fail the
//! CRC). Every measurement then addresses it with Match ROM.

use embedded_hal_async::delay::DelayNs;
use log::{debug, info};

use super::onewire::{OneWireBus, crc8};
use super::{Sensor, SensorError};

const SENSOR: &str = "DS18B20";

const FAMILY_CODE: u8 = 0x28;

const CMD_READ_ROM: u8 = 0x33;
const CMD_MATCH_ROM: u8 = 0x55;
const CMD_CONVERT_T: u8 = 0x44;
const CMD_READ_SCRATCHPAD: u8 = 0xBE;

/// Conversion time at 12-bit resolution.
const CONVERSION_TIME_MS: u32 = 750;

/// Temperature with 1/16 °C resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemperatureReading {
    pub sixteenths: i16,
}

impl TemperatureReading {
    pub fn celsius(self) -> f32 {
        f32::from(self.sixteenths) / 16.0
    }

    /// Whole degrees, fraction dropped toward zero.
    pub fn truncated_celsius(self) -> i8 {
        // -55..=125 °C always fits
        (self.sixteenths / 16) as i8
    }
}

pub struct Ds18b20<B, D> {
    bus: B,
    delay: D,
    rom: [u8; 8],
}

impl<B: OneWireBus, D: DelayNs> Ds18b20<B, D> {
    /// Find the single sensor on `bus`.
    pub fn discover(mut bus: B, delay: D) -> Result<Self, SensorError> {
        if !bus.reset()? {
            return Err(SensorError::InitializationFailed {
                sensor: SENSOR,
                details: "no presence pulse on the bus",
            });
        }
        bus.write_byte(CMD_READ_ROM)?;
        let mut rom = [0u8; 8];
        bus.read_bytes(&mut rom)?;

        if crc8(&rom[..7]) != rom[7] {
            return Err(SensorError::InitializationFailed {
                sensor: SENSOR,
                details: "ROM CRC mismatch (none or several devices)",
            });
        }
        if rom[0] != FAMILY_CODE {
            return Err(SensorError::InitializationFailed {
                sensor: SENSOR,
                details: "device is not a DS18B20",
            });
        }

        info!("DS18B20 found, ROM {:02X?}", rom);
        Ok(Self { bus, delay, rom })
    }

    pub fn rom(&self) -> [u8; 8] {
        self.rom
    }

    fn select(&mut self) -> Result<(), SensorError> {
        if !self.bus.reset()? {
            return Err(SensorError::ReadFailed {
                sensor: SENSOR,
                operation: "bus reset",
                details: "no presence pulse",
            });
        }
        self.bus.write_byte(CMD_MATCH_ROM)?;
        self.bus.write_bytes(&self.rom)
    }

    pub async fn measure(&mut self) -> Result<TemperatureReading, SensorError> {
        self.select()?;
        self.bus.write_byte(CMD_CONVERT_T)?;
        self.delay.delay_ms(CONVERSION_TIME_MS).await;

        self.select()?;
        self.bus.write_byte(CMD_READ_SCRATCHPAD)?;
        let mut scratchpad = [0u8; 9];
        self.bus.read_bytes(&mut scratchpad)?;

        if crc8(&scratchpad[..8]) != scratchpad[8] {
            return Err(SensorError::CrcMismatch { sensor: SENSOR });
        }

        let reading = TemperatureReading {
            sixteenths: i16::from_le_bytes([scratchpad[0], scratchpad[1]]),
        };
        debug!("DS18B20 raw {} ({} C)", reading.sixteenths, reading.celsius());
        Ok(reading)
    }
}

impl<B: OneWireBus, D: DelayNs> Sensor for Ds18b20<B, D> {
    type Reading = TemperatureReading;

    async fn read(&mut self) -> Result<TemperatureReading, SensorError> {
        self.measure().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::VirtualTime;
    use alloc::collections::VecDeque;
    use alloc::vec::Vec;
    use embassy_futures::block_on;

    /// Bus answering reads from a script and logging writes.
    #[derive(Default)]
    struct ScriptedBus {
        present: bool,
        resets: usize,
        written: Vec<u8>,
        to_read: VecDeque<u8>,
    }

    impl OneWireBus for ScriptedBus {
        fn reset(&mut self) -> Result<bool, SensorError> {
            self.resets += 1;
            Ok(self.present)
        }

        fn write_byte(&mut self, byte: u8) -> Result<(), SensorError> {
            self.written.push(byte);
            Ok(())
        }

        fn read_byte(&mut self) -> Result<u8, SensorError> {
            Ok(self.to_read.pop_front().unwrap_or(0xFF))
        }
    }

    fn with_crc<const N: usize>(body: &[u8]) -> [u8; N] {
        let mut out = [0u8; N];
        out[..N - 1].copy_from_slice(body);
        out[N - 1] = crc8(body);
        out
    }

    fn rom() -> [u8; 8] {
        with_crc(&[0x28, 0xFF, 0x4C, 0x6D, 0x63, 0x16, 0x03])
    }

    fn discovered(time: &VirtualTime) -> Ds18b20<ScriptedBus, crate::testing::VirtualDelay> {
        let bus = ScriptedBus {
            present: true,
            to_read: rom().into_iter().collect(),
            ..Default::default()
        };
        Ds18b20::discover(bus, time.delay()).unwrap()
    }

    #[test]
    fn test_discovery_reads_rom() {
        let time = VirtualTime::new();
        let sensor = discovered(&time);
        assert_eq!(sensor.rom(), rom());
        assert_eq!(sensor.bus.written, [CMD_READ_ROM]);
    }

    #[test]
    fn test_discovery_without_device_fails() {
        let time = VirtualTime::new();
        let result = Ds18b20::discover(ScriptedBus::default(), time.delay());
        assert!(matches!(
            result,
            Err(SensorError::InitializationFailed { .. })
        ));
    }

    #[test]
    fn test_discovery_with_garbled_rom_fails() {
        let time = VirtualTime::new();
        let mut bad = rom();
        bad[3] ^= 0x10;
        let bus = ScriptedBus {
            present: true,
            to_read: bad.into_iter().collect(),
            ..Default::default()
        };
        assert!(Ds18b20::discover(bus, time.delay()).is_err());
    }

    #[test]
    fn test_measure() {
        let time = VirtualTime::new();
        let mut sensor = discovered(&time);
        // 25.0625 C = 0x0191
        let scratchpad: [u8; 9] = with_crc(&[0x91, 0x01, 0x4B, 0x46, 0x7F, 0xFF, 0x0F, 0x10]);
        sensor.bus.to_read.extend(scratchpad);
        sensor.bus.written.clear();

        let reading = block_on(sensor.read()).unwrap();

        assert_eq!(reading.sixteenths, 401);
        assert_eq!(reading.celsius(), 25.0625);
        assert_eq!(reading.truncated_celsius(), 25);
        assert_eq!(time.now_ms(), 750);

        let mut expected = Vec::new();
        expected.push(CMD_MATCH_ROM);
        expected.extend_from_slice(&rom());
        expected.push(CMD_CONVERT_T);
        expected.push(CMD_MATCH_ROM);
        expected.extend_from_slice(&rom());
        expected.push(CMD_READ_SCRATCHPAD);
        assert_eq!(sensor.bus.written, expected);
    }

    #[test]
    fn test_measure_rejects_corrupt_scratchpad() {
        let time = VirtualTime::new();
        let mut sensor = discovered(&time);
        let mut scratchpad: [u8; 9] = with_crc(&[0x91, 0x01, 0x4B, 0x46, 0x7F, 0xFF, 0x0F, 0x10]);
        scratchpad[0] = 0x92;
        sensor.bus.to_read.extend(scratchpad);

        assert_eq!(
            block_on(sensor.read()),
            Err(SensorError::CrcMismatch { sensor: SENSOR })
        );
    }

    #[test]
    fn test_negative_temperatures_truncate_toward_zero() {
        // -10.125 C
        let reading = TemperatureReading { sixteenths: -162 };
        assert_eq!(reading.celsius(), -10.125);
        assert_eq!(reading.truncated_celsius(), -10);
    }
}
