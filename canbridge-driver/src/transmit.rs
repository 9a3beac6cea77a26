//! Bus send primitive

use crate::frame::Frame;

/// The peripheral cannot accept a frame right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Busy;

/// Non-blocking frame sink implemented by a CAN driver
///
/// `try_transmit` may be called again with the same frame after it returned [`Busy`].
/// `fd` is set when the bus runs with the CAN FD MTU.
pub trait Transmitter {
    fn try_transmit(&mut self, frame: &Frame, fd: bool) -> Result<(), Busy>;
}

impl<F> Transmitter for F
where
    F: FnMut(&Frame, bool) -> Result<(), Busy>,
{
    fn try_transmit(&mut self, frame: &Frame, fd: bool) -> Result<(), Busy> {
        self(frame, fd)
    }
}
