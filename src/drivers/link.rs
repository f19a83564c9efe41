//! Duplex byte stream to the companion computer.
//!
//! Receive is line oriented and non-blocking: a separate reader assembles
//! lines into a [`LineChannel`] and the communication loop polls it. Transmit
//! is an async write of a whole buffer.

use core::fmt;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, Receiver};

use crate::drivers::command::CommandLine;

/// Complete lines waiting for the communication loop
pub const LINE_QUEUE_DEPTH: usize = 4;

pub type LineChannel<M> = Channel<M, CommandLine, LINE_QUEUE_DEPTH>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    Write,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Write => write!(f, "host link write failed"),
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait HostLink {
    /// Next complete line, if one has arrived.
    fn poll_line(&mut self) -> Option<CommandLine>;

    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError>;
}

/// Raw transmit half of a host port
#[allow(async_fn_in_trait)]
pub trait LinkTx {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError>;
}

/// Transmit half plus the line queue fed by the matching receive task.
pub struct HostPort<'a, M: RawMutex, T: LinkTx> {
    tx: T,
    lines: Receiver<'a, M, CommandLine, LINE_QUEUE_DEPTH>,
}

impl<'a, M: RawMutex, T: LinkTx> HostPort<'a, M, T> {
    pub fn new(tx: T, lines: Receiver<'a, M, CommandLine, LINE_QUEUE_DEPTH>) -> Self {
        Self { tx, lines }
    }
}

impl<'a, M: RawMutex, T: LinkTx> HostLink for HostPort<'a, M, T> {
    fn poll_line(&mut self) -> Option<CommandLine> {
        self.lines.try_receive().ok()
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.tx.write(bytes).await
    }
}

// ── STM32 transports ──────────────────────────────────────────────────────────

#[cfg(feature = "board")]
pub use self::stm32::*;

#[cfg(feature = "board")]
mod stm32 {
    use embassy_stm32::peripherals::{DMA1_CH2, DMA1_CH4, UART4, USB_OTG_FS};
    use embassy_stm32::usart::{UartRx, UartTx};
    use embassy_stm32::usb_otg::Driver;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use embassy_sync::channel::Sender;
    use embassy_usb::class::cdc_acm;

    use super::{LinkError, LinkTx, LINE_QUEUE_DEPTH};
    use crate::drivers::command::{CommandLine, LineBuffer};

    pub type LineSender = Sender<'static, CriticalSectionRawMutex, CommandLine, LINE_QUEUE_DEPTH>;

    /// Production link: UART4 to the companion computer.
    pub struct UartLinkTx(pub UartTx<'static, UART4, DMA1_CH4>);

    impl LinkTx for UartLinkTx {
        async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
            self.0.write(bytes).await.map_err(|_| LinkError::Write)
        }
    }

    /// Reads UART4 until idle and forwards every completed line.
    pub async fn uart_line_reader(mut rx: UartRx<'static, UART4, DMA1_CH2>, lines: LineSender) -> ! {
        let mut assembler = LineBuffer::new();
        let mut buf = [0u8; 64];
        loop {
            match rx.read_until_idle(&mut buf).await {
                Ok(n) => forward(&mut assembler, &buf[..n], &lines),
                Err(_) => crate::log_warn!("host uart rx error"),
            }
        }
    }

    pub type UsbDriver = Driver<'static, USB_OTG_FS>;

    /// Debug link: USB CDC-ACM. Writes are split into max-size packets.
    pub struct UsbLinkTx(pub cdc_acm::Sender<'static, UsbDriver>);

    impl LinkTx for UsbLinkTx {
        async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
            if !self.0.dtr() {
                // Nobody listening on the host side, drop silently
                return Ok(());
            }
            let max = self.0.max_packet_size() as usize;
            for chunk in bytes.chunks(max) {
                self.0.write_packet(chunk).await.map_err(|_| LinkError::Write)?;
            }
            Ok(())
        }
    }

    pub async fn usb_line_reader(mut rx: cdc_acm::Receiver<'static, UsbDriver>, lines: LineSender) -> ! {
        let mut assembler = LineBuffer::new();
        let mut buf = [0u8; 64];
        loop {
            rx.wait_connection().await;
            while let Ok(n) = rx.read_packet(&mut buf).await {
                forward(&mut assembler, &buf[..n], &lines);
            }
        }
    }

    fn forward(assembler: &mut LineBuffer, data: &[u8], lines: &LineSender) {
        assembler.push_bytes(data, |line| {
            if lines.try_send(line).is_err() {
                crate::log_warn!("host line queue full, line dropped");
            }
        });
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    /// In-memory host link: scripted incoming lines, captured outgoing bytes
    #[derive(Default)]
    pub(crate) struct MemoryLink {
        pub incoming: std::collections::VecDeque<CommandLine>,
        pub written: Vec<u8>,
        pub fail_writes: bool,
    }

    impl MemoryLink {
        pub fn with_lines(lines: &[&str]) -> Self {
            Self {
                incoming: lines.iter().map(|l| CommandLine::try_from(*l).unwrap()).collect(),
                ..Default::default()
            }
        }
    }

    impl HostLink for MemoryLink {
        fn poll_line(&mut self) -> Option<CommandLine> {
            self.incoming.pop_front()
        }

        async fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
            if self.fail_writes {
                return Err(LinkError::Write);
            }
            self.written.extend_from_slice(bytes);
            Ok(())
        }
    }

    struct VecTx(Vec<u8>);

    impl LinkTx for VecTx {
        async fn write(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
            self.0.extend_from_slice(bytes);
            Ok(())
        }
    }

    #[test]
    fn host_port_polls_queue_and_writes_through() {
        let lines: LineChannel<CriticalSectionRawMutex> = Channel::new();
        let mut port = HostPort::new(VecTx(Vec::new()), lines.receiver());

        assert!(port.poll_line().is_none());
        lines.try_send(CommandLine::try_from("DRIVE:1,1").unwrap()).unwrap();
        assert_eq!(port.poll_line().as_deref(), Some("DRIVE:1,1"));
        assert!(port.poll_line().is_none());

        embassy_futures::block_on(port.write_all(b"abc")).unwrap();
        assert_eq!(port.tx.0, b"abc");
    }
}
