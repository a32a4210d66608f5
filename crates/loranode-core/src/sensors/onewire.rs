//! Bit-banged 1-Wire bus master
//!
//! The data line is an open-drain output with an external pull-up: driving it
//! high releases the bus. Each time slot runs inside a critical section so an
//! interrupt cannot stretch it past the protocol limits.

use core::fmt::Debug;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use log::error;

use super::SensorError;

const BUS: &str = "1-Wire";

/// Byte-level access to a 1-Wire bus.
pub trait OneWireBus {
    /// Issue a reset pulse. Returns whether any device answered with a
    /// presence pulse.
    fn reset(&mut self) -> Result<bool, SensorError>;
    fn write_byte(&mut self, byte: u8) -> Result<(), SensorError>;
    fn read_byte(&mut self) -> Result<u8, SensorError>;

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), SensorError> {
        bytes.iter().try_for_each(|&b| self.write_byte(b))
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), SensorError> {
        for byte in buf.iter_mut() {
            *byte = self.read_byte()?;
        }
        Ok(())
    }
}

/// 1-Wire master on a single open-drain GPIO.
pub struct OneWirePin<P, D> {
    pin: P,
    delay: D,
}

impl<P, D> OneWirePin<P, D>
where
    P: InputPin + OutputPin,
    P::Error: Debug,
    D: DelayNs,
{
    pub fn new(pin: P, delay: D) -> Self {
        Self { pin, delay }
    }

    fn write_bit(&mut self, bit: bool) -> Result<(), SensorError> {
        let (low_us, high_us) = if bit { (6, 64) } else { (60, 10) };
        critical_section::with(|_| {
            self.pin.set_low().map_err(pin_error)?;
            self.delay.delay_us(low_us);
            self.pin.set_high().map_err(pin_error)?;
            self.delay.delay_us(high_us);
            Ok(())
        })
    }

    fn read_bit(&mut self) -> Result<bool, SensorError> {
        critical_section::with(|_| {
            self.pin.set_low().map_err(pin_error)?;
            self.delay.delay_us(6);
            self.pin.set_high().map_err(pin_error)?;
            self.delay.delay_us(9);
            let bit = self.pin.is_high().map_err(pin_error)?;
            self.delay.delay_us(55);
            Ok(bit)
        })
    }
}

fn pin_error<E: Debug>(e: E) -> SensorError {
    error!("1-Wire pin error: {:?}", e);
    SensorError::ReadFailed {
        sensor: BUS,
        operation: "drive data line",
        details: "GPIO error",
    }
}

impl<P, D> OneWireBus for OneWirePin<P, D>
where
    P: InputPin + OutputPin,
    P::Error: Debug,
    D: DelayNs,
{
    fn reset(&mut self) -> Result<bool, SensorError> {
        critical_section::with(|_| {
            self.pin.set_low().map_err(pin_error)?;
            self.delay.delay_us(480);
            self.pin.set_high().map_err(pin_error)?;
            self.delay.delay_us(70);
            let present = self.pin.is_low().map_err(pin_error)?;
            self.delay.delay_us(410);
            Ok(present)
        })
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), SensorError> {
        (0..8).try_for_each(|i| self.write_bit((byte >> i) & 1 == 1))
    }

    fn read_byte(&mut self) -> Result<u8, SensorError> {
        let mut byte = 0;
        for i in 0..8 {
            if self.read_bit()? {
                byte |= 1 << i;
            }
        }
        Ok(byte)
    }
}

/// Dallas/Maxim CRC-8 (polynomial x⁸ + x⁵ + x⁴ + 1, LSB first).
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in data {
        let mut b = byte;
        for _ in 0..8 {
            let mix = (crc ^ b) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            b >>= 1;
        }
    }
    crc
}
