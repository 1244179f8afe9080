//! HD44780 16x2 character display behind a PCF8574 I2C backpack
//!
//! The backpack maps the expander's eight outputs onto the controller's
//! 4-bit bus: P0 = RS, P1 = RW, P2 = E, P3 = backlight, P4..P7 = D4..D7.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::hal::{CharDisplay, HalError};

/// Usual 7-bit address of a PCF8574 backpack with A0..A2 high
pub const DEFAULT_ADDRESS: u8 = 0x27;

const RS: u8 = 0x01;
const ENABLE: u8 = 0x04;
const BACKLIGHT: u8 = 0x08;

const CLEAR: u8 = 0x01;
const ENTRY_LEFT: u8 = 0x06;
const DISPLAY_ON: u8 = 0x0C;
const FUNCTION_4BIT_2LINE: u8 = 0x28;
const SET_DDRAM: u8 = 0x80;

const ROW_OFFSETS: [u8; 2] = [0x00, 0x40];

pub struct I2cLcd<I, D> {
    i2c: I,
    delay: D,
    address: u8,
    columns: u8,
}

impl<I, D> I2cLcd<I, D>
where
    I: I2c,
    D: DelayNs,
{
    pub fn new(i2c: I, delay: D, address: u8) -> Self {
        Self { i2c, delay, address, columns: 16 }
    }

    fn expander_write(&mut self, byte: u8) -> Result<(), HalError> {
        self.i2c
            .write(self.address, &[byte | BACKLIGHT])
            .map_err(|_| HalError::DisplayError)
    }

    fn pulse(&mut self, byte: u8) -> Result<(), HalError> {
        self.expander_write(byte | ENABLE)?;
        self.delay.delay_us(1);
        self.expander_write(byte & !ENABLE)?;
        self.delay.delay_us(50);
        Ok(())
    }

    fn write_nibble(&mut self, nibble: u8, mode: u8) -> Result<(), HalError> {
        self.pulse((nibble << 4) | mode)
    }

    fn send(&mut self, value: u8, mode: u8) -> Result<(), HalError> {
        self.write_nibble(value >> 4, mode)?;
        self.write_nibble(value & 0x0F, mode)
    }

    fn command(&mut self, value: u8) -> Result<(), HalError> {
        self.send(value, 0)
    }

    pub fn release(self) -> I {
        self.i2c
    }
}

impl<I, D> CharDisplay for I2cLcd<I, D>
where
    I: I2c,
    D: DelayNs,
{
    type Error = HalError;

    fn begin(&mut self) -> Result<(), Self::Error> {
        self.delay.delay_ms(50);
        self.expander_write(0)?;

        // Force 8-bit mode three times, then drop to 4-bit
        self.write_nibble(0x03, 0)?;
        self.delay.delay_us(4_500);
        self.write_nibble(0x03, 0)?;
        self.delay.delay_us(4_500);
        self.write_nibble(0x03, 0)?;
        self.delay.delay_us(150);
        self.write_nibble(0x02, 0)?;

        self.command(FUNCTION_4BIT_2LINE)?;
        self.command(DISPLAY_ON)?;
        self.command(CLEAR)?;
        self.delay.delay_ms(2);
        self.command(ENTRY_LEFT)?;

        #[cfg(feature = "defmt")]
        defmt::info!("🖥️ LCD ready at {=u8:#x}", self.address);
        Ok(())
    }

    fn set_cursor(&mut self, column: u8, row: u8) -> Result<(), Self::Error> {
        let offset = ROW_OFFSETS.get(row as usize).ok_or(HalError::DisplayError)?;
        if column >= self.columns {
            return Err(HalError::DisplayError);
        }
        self.command(SET_DDRAM | (offset + column))
    }

    fn print(&mut self, text: &str) -> Result<(), Self::Error> {
        for byte in text.bytes() {
            self.send(byte, RS)?;
        }
        Ok(())
    }
}
