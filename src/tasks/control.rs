use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::{Instant, Ticker};

use crate::config::{BATTERY_WINDOW, COMPLEMENTARY_ALPHA, CONTROL_PERIOD, ENCODER_WINDOW};
use crate::drivers::filter::{ComplementaryFilter, MovingAverage};
use crate::drivers::motor::{MotorActuator, MotorController};
use crate::drivers::sensors::{battery_millivolts, BatteryAdc, InertialSensor, PulseCounter};
use crate::drivers::telemetry::{TelemetryRecord, TelemetrySample};
use crate::state::{CommandReader, TelemetrySender};

/// Peripherals owned by the control loop.
pub struct ControlHardware<E, I, B, A> {
    pub left_encoder: E,
    pub right_encoder: E,
    pub imu: I,
    pub battery: B,
    pub motors: A,
}

/// Sensor/actuation loop state.
///
/// One [`step`](Self::step) per period: sample, filter, publish telemetry,
/// then act on the latest host command.
pub struct ControlLoop<'a, M: RawMutex, E, I, B, A>
where
    E: PulseCounter,
    I: InertialSensor,
    B: BatteryAdc,
    A: MotorActuator,
{
    left_encoder: E,
    right_encoder: E,
    imu: I,
    battery: B,
    motors: MotorController<A>,

    filter: ComplementaryFilter,
    left_avg: MovingAverage<ENCODER_WINDOW>,
    right_avg: MovingAverage<ENCODER_WINDOW>,
    battery_avg: MovingAverage<BATTERY_WINDOW>,

    command: CommandReader<'a, M>,
    telemetry: TelemetrySender<'a, M>,

    /// False when the inertial sensor failed bring-up
    imu_available: bool,
    dropped_records: u32,
}

impl<'a, M, E, I, B, A> ControlLoop<'a, M, E, I, B, A>
where
    M: RawMutex,
    E: PulseCounter,
    I: InertialSensor,
    B: BatteryAdc,
    A: MotorActuator,
{
    pub fn new(
        hw: ControlHardware<E, I, B, A>,
        imu_available: bool,
        command: CommandReader<'a, M>,
        telemetry: TelemetrySender<'a, M>,
        start: Instant,
    ) -> Self {
        Self::with_motors(
            hw.left_encoder,
            hw.right_encoder,
            hw.imu,
            hw.battery,
            MotorController::new(hw.motors),
            imu_available,
            command,
            telemetry,
            start,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn with_motors(
        left_encoder: E,
        right_encoder: E,
        imu: I,
        battery: B,
        motors: MotorController<A>,
        imu_available: bool,
        command: CommandReader<'a, M>,
        telemetry: TelemetrySender<'a, M>,
        start: Instant,
    ) -> Self {
        if !imu_available {
            crate::log_error!("inertial sensor unavailable: attitude reported as NaN, motors disabled");
        }
        Self {
            left_encoder,
            right_encoder,
            imu,
            battery,
            motors,
            filter: ComplementaryFilter::new(COMPLEMENTARY_ALPHA, start),
            left_avg: MovingAverage::new(),
            right_avg: MovingAverage::new(),
            battery_avg: MovingAverage::new(),
            command,
            telemetry,
            imu_available,
            dropped_records: 0,
        }
    }

    /// One control cycle at time `now`.
    pub async fn step(&mut self, now: Instant) {
        // ── A. Sample ─────────────────────────────────────────────────────────
        let left_raw = self.left_encoder.take_count();
        let right_raw = self.right_encoder.take_count();

        let imu = if self.imu_available {
            match self.imu.read().await {
                Ok(sample) => Some(sample),
                Err(e) => {
                    crate::log_warn!("imu read failed ({}), holding attitude", e.as_str());
                    None
                }
            }
        } else {
            None
        };

        let adc_raw = self.battery.read_raw();

        // ── B. Fusion + smoothing ─────────────────────────────────────────────
        let (pitch, roll, gyro_z_raw) = match imu {
            Some(sample) => {
                let att = self.filter.update(now, sample.accel, sample.gyro);
                (att.pitch, att.roll, sample.gyro_z_raw)
            }
            None if self.imu_available => {
                let att = self.filter.attitude();
                (att.pitch, att.roll, 0)
            }
            None => (f32::NAN, f32::NAN, 0),
        };

        let left_encoder = self.left_avg.push(left_raw as i32);
        let right_encoder = self.right_avg.push(right_raw as i32);
        let battery_mv = self.battery_avg.push(battery_millivolts(adc_raw) as i32) as u16;

        // ── C. Publish telemetry (never blocks) ───────────────────────────────
        let record = TelemetryRecord::seal(TelemetrySample {
            timestamp_us: now.as_micros() as i64,
            pitch,
            roll,
            gyro_z_raw,
            left_encoder,
            right_encoder,
            battery_mv,
        });
        if self.telemetry.try_send(record).is_err() {
            self.dropped_records = self.dropped_records.wrapping_add(1);
            if self.dropped_records % 100 == 1 {
                crate::log_warn!("telemetry queue full, {} records dropped", self.dropped_records);
            }
        }

        // ── D. Actuate ────────────────────────────────────────────────────────
        let command = self.command.get().await;
        if self.imu_available {
            self.motors.apply(command).await;
        } else if self.motors.output_duty() != 0 {
            self.motors.force_off();
        }
    }

    pub fn dropped_records(&self) -> u32 {
        self.dropped_records
    }

    pub fn motors(&self) -> &MotorController<A> {
        &self.motors
    }

    /// Run forever at `CONTROL_PERIOD`.
    pub async fn run(mut self) -> ! {
        crate::log_info!("control loop started ({} ms period)", CONTROL_PERIOD.as_millis());
        let mut ticker = Ticker::every(CONTROL_PERIOD);
        loop {
            self.step(Instant::now()).await;
            ticker.next().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MAX_DUTY, TELEMETRY_QUEUE_DEPTH};
    use crate::drivers::motor::tests::RecordingActuator;
    use crate::drivers::motor::Bridge;
    use crate::drivers::sensors::{ImuSample, SensorError};
    use crate::drivers::telemetry::xor_checksum;
    use crate::state::{MotionMode, SharedCommand, TelemetryChannel};
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use embassy_sync::channel::Channel;
    use embassy_time::Duration;

    struct FixedCounter(i16);

    impl PulseCounter for FixedCounter {
        fn take_count(&mut self) -> i16 {
            self.0
        }
    }

    struct ScriptedImu {
        sample: ImuSample,
        fail: bool,
    }

    impl InertialSensor for ScriptedImu {
        async fn read(&mut self) -> Result<ImuSample, SensorError> {
            if self.fail {
                Err(SensorError::Bus)
            } else {
                Ok(self.sample)
            }
        }
    }

    struct FixedAdc(u16);

    impl BatteryAdc for FixedAdc {
        fn read_raw(&mut self) -> u16 {
            self.0
        }
    }

    type TestLoop<'a> =
        ControlLoop<'a, CriticalSectionRawMutex, FixedCounter, ScriptedImu, FixedAdc, RecordingActuator>;

    fn level_imu() -> ScriptedImu {
        ScriptedImu {
            sample: ImuSample {
                accel: [0.0, 0.0, 1.0],
                gyro: [0.0; 3],
                gyro_z_raw: -321,
            },
            fail: false,
        }
    }

    fn build<'a>(
        command: &'a SharedCommand<CriticalSectionRawMutex>,
        telemetry: &'a TelemetryChannel<CriticalSectionRawMutex>,
        imu: ScriptedImu,
        imu_available: bool,
    ) -> TestLoop<'a> {
        ControlLoop::with_motors(
            FixedCounter(10),
            FixedCounter(-5),
            imu,
            FixedAdc(1656),
            MotorController::with_step_delay(RecordingActuator::default(), Duration::from_ticks(0)),
            imu_available,
            command.reader(),
            telemetry.sender(),
            Instant::from_micros(0),
        )
    }

    fn at(cycle: u64) -> Instant {
        Instant::from_micros(cycle * 10_000)
    }

    #[test]
    fn publishes_smoothed_telemetry_each_cycle() {
        let command = SharedCommand::new();
        let telemetry: TelemetryChannel<CriticalSectionRawMutex> = Channel::new();
        let mut ctl = build(&command, &telemetry, level_imu(), true);
        let rx = telemetry.receiver();

        block_on(async {
            for cycle in 1..=5 {
                ctl.step(at(cycle)).await;
                let record = rx.try_receive().unwrap();
                let s = record.sample();
                assert_eq!(s.timestamp_us, (cycle * 10_000) as i64);
                assert_eq!(s.gyro_z_raw, -321);
                // Window of 5 fills one sample per cycle
                assert_eq!(s.left_encoder, 10 * cycle as i32 / 5);
                assert_eq!(s.right_encoder, -5 * cycle as i32 / 5);
                assert_eq!(xor_checksum(&record.to_bytes()), 0);
            }
        });

        let battery_mv = battery_millivolts(1656) as i32;
        block_on(async {
            for _ in 0..5 {
                ctl.step(at(10)).await;
            }
        });
        let last = {
            let mut last = None;
            while let Ok(r) = rx.try_receive() {
                last = Some(r);
            }
            last.unwrap()
        };
        assert_eq!(last.sample().battery_mv as i32, battery_mv);
        assert!(last.sample().pitch.abs() < 1e-3);
    }

    #[test]
    fn full_queue_drops_new_records_without_blocking() {
        let command = SharedCommand::new();
        let telemetry: TelemetryChannel<CriticalSectionRawMutex> = Channel::new();
        let mut ctl = build(&command, &telemetry, level_imu(), true);

        block_on(async {
            for cycle in 1..=(TELEMETRY_QUEUE_DEPTH as u64 + 3) {
                ctl.step(at(cycle)).await;
            }
        });
        assert_eq!(telemetry.len(), TELEMETRY_QUEUE_DEPTH);
        assert_eq!(ctl.dropped_records(), 3);

        // Oldest records survive, in order
        let rx = telemetry.receiver();
        for cycle in 1..=TELEMETRY_QUEUE_DEPTH as i64 {
            assert_eq!(rx.try_receive().unwrap().sample().timestamp_us, cycle * 10_000);
        }
    }

    #[test]
    fn drives_motors_from_shared_command() {
        let command = SharedCommand::new();
        let telemetry: TelemetryChannel<CriticalSectionRawMutex> = Channel::new();
        let mut ctl = build(&command, &telemetry, level_imu(), true);

        block_on(async {
            command.set(MotionMode::TurnRight, 100).await;
            ctl.step(at(1)).await;
        });
        assert_eq!(ctl.motors().mode(), MotionMode::TurnRight);
        assert_eq!(ctl.motors().output_duty(), MAX_DUTY);
        assert_eq!(
            ctl.motors().actuator().last_bridges(),
            Some((Bridge::Forward, Bridge::Reverse))
        );

        block_on(async {
            command.set(MotionMode::Stop, 0).await;
            ctl.step(at(2)).await;
        });
        assert_eq!(ctl.motors().mode(), MotionMode::Stop);
        assert_eq!(ctl.motors().output_duty(), 0);
        assert_eq!(ctl.motors().actuator().last_bridges(), Some((Bridge::Off, Bridge::Off)));
    }

    #[test]
    fn missing_imu_reports_nan_and_keeps_motors_off() {
        let command = SharedCommand::new();
        let telemetry: TelemetryChannel<CriticalSectionRawMutex> = Channel::new();
        let mut ctl = build(&command, &telemetry, level_imu(), false);

        block_on(async {
            command.set(MotionMode::Forward, 80).await;
            ctl.step(at(1)).await;
        });

        let record = telemetry.receiver().try_receive().unwrap();
        assert!(record.sample().pitch.is_nan());
        assert!(record.sample().roll.is_nan());
        assert_eq!(record.sample().left_encoder, 2);
        assert_eq!(xor_checksum(&record.to_bytes()), 0);

        assert_eq!(ctl.motors().mode(), MotionMode::Stop);
        assert_eq!(ctl.motors().output_duty(), 0);
        assert!(ctl.motors().actuator().duties().iter().all(|d| *d == 0));
    }

    #[test]
    fn failed_read_holds_previous_attitude() {
        let command = SharedCommand::new();
        let telemetry: TelemetryChannel<CriticalSectionRawMutex> = Channel::new();
        let (s, c) = (20f32.to_radians().sin(), 20f32.to_radians().cos());
        let imu = ScriptedImu {
            sample: ImuSample {
                accel: [0.0, s, c],
                gyro: [0.0; 3],
                gyro_z_raw: 7,
            },
            fail: false,
        };
        let mut ctl = build(&command, &telemetry, imu, true);
        let rx = telemetry.receiver();

        block_on(ctl.step(at(1)));
        let roll_before = rx.try_receive().unwrap().sample().roll;
        assert!(roll_before > 0.0);

        ctl.imu.fail = true;
        block_on(ctl.step(at(2)));
        let held = rx.try_receive().unwrap();
        assert_eq!(held.sample().roll, roll_before);
        assert_eq!(held.sample().gyro_z_raw, 0);
    }
}
