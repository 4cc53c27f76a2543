//! Blocking serial byte streams
//!
//! Implemented by ports built on a [`TimerPort`](crate::TimerPort). Frames
//! are always 8-N-1, so there is nothing to configure here; the bit period
//! is fixed when the port is initialised.

/// Transmit half of a serial port
pub trait UartTx {
    /// Reported when the port cannot accept bytes at all
    type Error;

    /// Hand every byte in `data` to the transmitter
    ///
    /// Waits for queue space as needed. Returning `Ok` means each byte is
    /// queued or already on the line, not that the line is quiet.
    fn write_blocking(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Wait until the stop bit of the last queued byte has been sent
    fn flush(&mut self) -> Result<(), Self::Error>;
}

/// Receive half of a serial port
pub trait UartRx {
    /// Reported when no further bytes can arrive
    type Error;

    /// Fill `buf` with received bytes, waiting for each in turn
    ///
    /// Fails as soon as the port stops receiving with the buffer still
    /// short; bytes taken before that point are lost to the caller.
    fn read_blocking(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Wait for a single received byte
    fn read_byte(&mut self) -> Result<u8, Self::Error> {
        let mut byte = [0u8; 1];
        self.read_blocking(&mut byte)?;
        Ok(byte[0])
    }
}
