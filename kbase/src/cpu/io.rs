//! Port-mapped I/O and the serial COM port used for kernel diagnostics.

use core::arch::asm;
use core::fmt;

/// An x86 I/O port number.
#[derive(Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Debug)]
pub struct PortNumber(pub u16);

/// Write a byte to the given port.
#[inline]
pub unsafe fn outb(port: PortNumber, data: u8) {
    asm!("out dx, al", in("dx") port.0, in("al") data, options(nomem, nostack));
}

/// Read a byte from the given port.
#[inline]
pub unsafe fn inb(port: PortNumber) -> u8 {
    let data: u8;
    asm!("in al, dx", in("dx") port.0, out("al") data, options(nomem, nostack));
    data
}

/// The usual address of the COM1 port.
pub const COM1_ADDR: PortNumber = PortNumber(0x3F8);

const DATA: u16 = 0;
const INTERRUPT_ENABLE: u16 = 1;
const FIFO_CTRL: u16 = 2;
const LINE_CTRL: u16 = 3;
const MODEM_CTRL: u16 = 4;
const LINE_STATUS: u16 = 5;

/// Interface to a 16550-compatible serial port identified by its base port
/// number.
#[derive(Debug, Eq, PartialEq)]
pub struct SerialPort(PortNumber);

impl SerialPort {
    /// Creates a new handle to a serial port.
    ///
    /// The caller must ensure that the port number refers to a COM port and
    /// that no second handle to the same port exists, since concurrent access
    /// would interleave the wire protocol.
    pub const unsafe fn new(base: PortNumber) -> SerialPort {
        SerialPort(base)
    }

    /// Program 115200 baud, 8 data bits, no parity, one stop bit.
    pub fn configure(&mut self) {
        unsafe {
            outb(self.reg(INTERRUPT_ENABLE), 0x00);
            outb(self.reg(LINE_CTRL), 0x80); // DLAB on
            outb(self.reg(DATA), 0x01); // divisor = 1
            outb(self.reg(INTERRUPT_ENABLE), 0x00);
            outb(self.reg(LINE_CTRL), 0x03); // 8n1, DLAB off
            outb(self.reg(FIFO_CTRL), 0xC7);
            outb(self.reg(MODEM_CTRL), 0x0B);
        }
    }

    pub fn write_byte(&mut self, data: u8) {
        unsafe {
            // wait for the transmit holding register to drain
            while inb(self.reg(LINE_STATUS)) & 0x20 == 0 {}
            outb(self.reg(DATA), data);
        }
    }

    pub fn write(&mut self, data: &[u8]) {
        for &byte in data {
            self.write_byte(byte);
        }
    }

    fn reg(&self, offset: u16) -> PortNumber {
        PortNumber(self.0 .0 + offset)
    }
}

impl fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write(s.as_bytes());
        Ok(())
    }
}
