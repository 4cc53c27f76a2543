//! Byte-stream trait implementations
//!
//! [`SoftSerial`] speaks `embedded-io` and the HAL's own blocking UART
//! traits. The port is usually a `static`, so the `embedded-io` traits are
//! also implemented for `&SoftSerial`.

use core::fmt;

use embedded_io::{ErrorKind, ErrorType, Read, ReadReady, Write, WriteReady};
use timuart_hal::{TimerPort, UartRx, UartTx};

use crate::port::SoftSerial;

/// Error type of the stream traits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SerialError {
    /// Port has not been initialised or has been ended
    NotReady,
}

impl fmt::Display for SerialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerialError::NotReady => f.write_str("port not initialised"),
        }
    }
}

impl embedded_io::Error for SerialError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl<T: TimerPort, const TX: usize, const RX: usize> SoftSerial<T, TX, RX> {
    /// Wait for one received byte
    fn read_byte_blocking(&self) -> Result<u8, SerialError> {
        loop {
            if let Some(byte) = self.try_read() {
                return Ok(byte);
            }
            if !self.is_ready() {
                return Err(SerialError::NotReady);
            }
            core::hint::spin_loop();
        }
    }

    /// Block for the first byte, then take whatever else is buffered
    fn read_some(&self, buf: &mut [u8]) -> Result<usize, SerialError> {
        let Some((first, rest)) = buf.split_first_mut() else {
            return Ok(0);
        };
        *first = self.read_byte_blocking()?;
        let mut n = 1;
        for slot in rest {
            match self.try_read() {
                Some(byte) => *slot = byte,
                None => break,
            }
            n += 1;
        }
        Ok(n)
    }

    /// Block until the first byte is queued, then queue what fits
    fn write_some(&self, buf: &[u8]) -> Result<usize, SerialError> {
        let Some((&first, rest)) = buf.split_first() else {
            return Ok(0);
        };
        if self.write(first) == 0 {
            return Err(SerialError::NotReady);
        }
        let mut n = 1;
        for &byte in rest {
            match self.try_write(byte) {
                Ok(()) => n += 1,
                Err(_) => break,
            }
        }
        Ok(n)
    }

    fn write_ready_checked(&self) -> Result<bool, SerialError> {
        if self.is_ready() {
            Ok(self.can_write())
        } else {
            Err(SerialError::NotReady)
        }
    }
}

impl<T: TimerPort, const TX: usize, const RX: usize> ErrorType for SoftSerial<T, TX, RX> {
    type Error = SerialError;
}

impl<T: TimerPort, const TX: usize, const RX: usize> Read for SoftSerial<T, TX, RX> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.read_some(buf)
    }
}

impl<T: TimerPort, const TX: usize, const RX: usize> ReadReady for SoftSerial<T, TX, RX> {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.is_empty())
    }
}

impl<T: TimerPort, const TX: usize, const RX: usize> Write for SoftSerial<T, TX, RX> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.write_some(buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.flush_output();
        Ok(())
    }
}

impl<T: TimerPort, const TX: usize, const RX: usize> WriteReady for SoftSerial<T, TX, RX> {
    fn write_ready(&mut self) -> Result<bool, Self::Error> {
        self.write_ready_checked()
    }
}

impl<T: TimerPort, const TX: usize, const RX: usize> ErrorType for &SoftSerial<T, TX, RX> {
    type Error = SerialError;
}

impl<T: TimerPort, const TX: usize, const RX: usize> Read for &SoftSerial<T, TX, RX> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.read_some(buf)
    }
}

impl<T: TimerPort, const TX: usize, const RX: usize> ReadReady for &SoftSerial<T, TX, RX> {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.is_empty())
    }
}

impl<T: TimerPort, const TX: usize, const RX: usize> Write for &SoftSerial<T, TX, RX> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.write_some(buf)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.flush_output();
        Ok(())
    }
}

impl<T: TimerPort, const TX: usize, const RX: usize> WriteReady for &SoftSerial<T, TX, RX> {
    fn write_ready(&mut self) -> Result<bool, Self::Error> {
        self.write_ready_checked()
    }
}

impl<T: TimerPort, const TX: usize, const RX: usize> UartTx for SoftSerial<T, TX, RX> {
    type Error = SerialError;

    fn write_blocking(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        for &byte in data {
            if SoftSerial::write(self, byte) == 0 {
                return Err(SerialError::NotReady);
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.flush_output();
        Ok(())
    }
}

impl<T: TimerPort, const TX: usize, const RX: usize> UartRx for SoftSerial<T, TX, RX> {
    type Error = SerialError;

    fn read_blocking(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        for slot in buf.iter_mut() {
            *slot = self.read_byte_blocking()?;
        }
        Ok(buf.len())
    }
}
