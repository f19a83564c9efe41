use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Ticker;

use crate::config::{COMMS_PERIOD, TRACE_COMMANDS};
use crate::drivers::command::HostCommand;
use crate::drivers::link::HostLink;
use crate::drivers::telemetry::{TelemetryFormat, TelemetryRecord, VerboseLine, FRAME_LEN};
use crate::state::{SharedCommand, TelemetryReceiver};

/// Host-facing loop: commands in, telemetry out.
pub struct CommsLoop<'a, M: RawMutex, L: HostLink> {
    link: L,
    command: &'a SharedCommand<M>,
    telemetry: TelemetryReceiver<'a, M>,
    format: TelemetryFormat,
    write_errors: u32,
}

impl<'a, M: RawMutex, L: HostLink> CommsLoop<'a, M, L> {
    pub fn new(
        link: L,
        command: &'a SharedCommand<M>,
        telemetry: TelemetryReceiver<'a, M>,
        format: TelemetryFormat,
    ) -> Self {
        Self {
            link,
            command,
            telemetry,
            format,
            write_errors: 0,
        }
    }

    /// One iteration: at most one command line, at most one telemetry record.
    pub async fn step(&mut self) {
        if let Some(line) = self.link.poll_line() {
            self.handle_line(&line).await;
        }

        if let Ok(record) = self.telemetry.try_receive() {
            self.send_record(&record).await;
        }
    }

    async fn handle_line(&mut self, line: &str) {
        if TRACE_COMMANDS {
            crate::log_debug!("host: {}", line);
        }
        let Some(command) = HostCommand::parse(line) else {
            if !line.trim().is_empty() {
                crate::log_warn!("host: ignoring malformed line");
            }
            return;
        };
        let (mode, speed) = command.resolve();
        if TRACE_COMMANDS {
            crate::log_debug!("host: -> {} at {}%", mode.as_str(), speed);
        }
        self.command.set(mode, speed).await;
    }

    async fn send_record(&mut self, record: &TelemetryRecord) {
        let result = match self.format {
            TelemetryFormat::Binary => {
                let frame: [u8; FRAME_LEN] = record.to_frame();
                self.link.write_all(&frame).await
            }
            TelemetryFormat::Verbose => {
                let mut line = VerboseLine::new();
                if record.write_verbose(&mut line).is_err() {
                    crate::log_warn!("verbose telemetry line truncated");
                }
                self.link.write_all(line.as_bytes()).await
            }
        };

        if result.is_err() {
            self.write_errors = self.write_errors.wrapping_add(1);
            if self.write_errors % 50 == 1 {
                crate::log_warn!("telemetry write failed ({} so far)", self.write_errors);
            }
        }
    }

    pub fn write_errors(&self) -> u32 {
        self.write_errors
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub async fn run(mut self) -> ! {
        crate::log_info!("comms loop started ({} ms period)", COMMS_PERIOD.as_millis());
        let mut ticker = Ticker::every(COMMS_PERIOD);
        loop {
            self.step().await;
            ticker.next().await;
        }
    }
}
