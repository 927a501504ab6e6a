//! Packet transport to the AT co-processor.
//!
//! The link is split into a read half, drained by the line receiver, and a
//! write half, owned by the command protocol. Platform code implements both
//! for its bus (SPI with a handshake line, or a UART framed by
//! [`LineFramer`](crate::comm::LineFramer)).

use core::fmt::Debug;

/// Why a packet read produced no line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadError<E> {
    /// Data-pending was asserted but the link had nothing to read.
    NoData,
    /// A packet is still arriving; read again on the next poll.
    Incomplete,
    /// Bus-level failure.
    Io(E),
}

/// Receive half of the co-processor link.
pub trait PacketRead {
    type Error: Debug;

    /// Level of the "data pending" signal. Polled, never awaited.
    fn data_pending(&mut self) -> bool;

    /// Read one packet into `buf`, returning its length.
    fn read_packet(&mut self, buf: &mut [u8]) -> Result<usize, ReadError<Self::Error>>;
}

/// Send half of the co-processor link.
pub trait PacketWrite {
    type Error: Debug;

    /// Send one packet. `data` never exceeds the transport chunk size.
    fn write_packet(&mut self, data: &[u8]) -> Result<(), Self::Error>;
}

impl<T: PacketRead + ?Sized> PacketRead for &mut T {
    type Error = T::Error;

    fn data_pending(&mut self) -> bool {
        (**self).data_pending()
    }

    fn read_packet(&mut self, buf: &mut [u8]) -> Result<usize, ReadError<Self::Error>> {
        (**self).read_packet(buf)
    }
}

impl<T: PacketWrite + ?Sized> PacketWrite for &mut T {
    type Error = T::Error;

    fn write_packet(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        (**self).write_packet(data)
    }
}
