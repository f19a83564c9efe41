#[allow(unused_imports)]
use micromath::F32Ext;

use embassy_time::Instant;

/// Pitch/roll estimate in degrees
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Attitude {
    pub pitch: f32,
    pub roll: f32,
}

/// First-order complementary filter.
/// Gyro integration carries the short term, the accelerometer tilt pulls the
/// estimate back over the long term.
pub struct ComplementaryFilter {
    alpha: f32,
    attitude: Attitude,
    last_update: Instant,
}

impl ComplementaryFilter {
    pub fn new(alpha: f32, start: Instant) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            attitude: Attitude::default(),
            last_update: start,
        }
    }

    /// `accel` in any consistent unit (only ratios are used), `gyro` in rad/s.
    /// Axis convention: pitch rotates about y, roll about x.
    pub fn update(&mut self, now: Instant, accel: [f32; 3], gyro: [f32; 3]) -> Attitude {
        // A clock that did not advance (or went backwards) integrates nothing.
        let dt = now
            .checked_duration_since(self.last_update)
            .map(|d| d.as_micros() as f32 / 1_000_000.0)
            .unwrap_or(0.0);
        self.last_update = now;

        let [ax, ay, az] = accel;
        let pitch_acc = (-ax).atan2((ay * ay + az * az).sqrt()).to_degrees();
        let roll_acc = ay.atan2(az).to_degrees();

        let gyro_pitch_rate = gyro[1].to_degrees();
        let gyro_roll_rate = gyro[0].to_degrees();

        self.attitude.pitch = self.blend(self.attitude.pitch, gyro_pitch_rate, dt, pitch_acc);
        self.attitude.roll = self.blend(self.attitude.roll, gyro_roll_rate, dt, roll_acc);
        self.attitude
    }

    fn blend(&self, angle: f32, rate: f32, dt: f32, measured: f32) -> f32 {
        let integrated = if rate.is_finite() { angle + rate * dt } else { angle };
        if measured.is_finite() {
            self.alpha * integrated + (1.0 - self.alpha) * measured
        } else {
            integrated
        }
    }

    pub fn attitude(&self) -> Attitude {
        self.attitude
    }
}

/// Fixed-window moving average over the last `N` integer samples.
/// Starts from an all-zero window, so the first `N - 1` outputs lean toward 0.
pub struct MovingAverage<const N: usize> {
    buffer: [i32; N],
    sum: i32,
    index: usize,
}

impl<const N: usize> MovingAverage<N> {
    pub const fn new() -> Self {
        Self {
            buffer: [0; N],
            sum: 0,
            index: 0,
        }
    }

    /// Push a sample, return the truncated average of the window.
    pub fn push(&mut self, value: i32) -> i32 {
        self.sum -= self.buffer[self.index];
        self.buffer[self.index] = value;
        self.sum += value;
        self.index = (self.index + 1) % N;
        self.average()
    }

    pub fn average(&self) -> i32 {
        self.sum / N as i32
    }
}

impl<const N: usize> Default for MovingAverage<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32, tol: f32) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn level_and_still_stays_at_zero() {
        let mut f = ComplementaryFilter::new(0.98, Instant::from_micros(0));
        for i in 1..=100u64 {
            let att = f.update(Instant::from_micros(i * 10_000), [0.0, 0.0, 1.0], [0.0; 3]);
            assert!(approx(att.pitch, 0.0, 1e-3));
            assert!(approx(att.roll, 0.0, 1e-3));
        }
    }

    #[test]
    fn converges_to_accelerometer_tilt() {
        // 30 degrees of roll: gravity seen on y and z
        let (s, c) = (30f32.to_radians().sin(), 30f32.to_radians().cos());
        let mut f = ComplementaryFilter::new(0.98, Instant::from_micros(0));
        let mut att = Attitude::default();
        for i in 1..=1000u64 {
            att = f.update(Instant::from_micros(i * 10_000), [0.0, s, c], [0.0; 3]);
        }
        assert!(approx(att.roll, 30.0, 0.1), "roll = {}", att.roll);
        assert!(approx(att.pitch, 0.0, 0.1));
    }

    #[test]
    fn single_step_matches_blend_formula() {
        let mut f = ComplementaryFilter::new(0.98, Instant::from_micros(0));
        // 10 ms at 1 rad/s about y, level accelerometer
        let att = f.update(Instant::from_micros(10_000), [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]);
        let expected = 0.98 * (1.0f32.to_degrees() * 0.01);
        assert!(approx(att.pitch, expected, 1e-4), "pitch = {}", att.pitch);
        assert!(approx(att.roll, 0.0, 1e-6));
    }

    #[test]
    fn zero_or_backward_dt_does_not_integrate() {
        let mut f = ComplementaryFilter::new(0.98, Instant::from_micros(50_000));
        let same = f.update(Instant::from_micros(50_000), [0.0, 0.0, 1.0], [0.0, 100.0, 100.0]);
        assert!(same.pitch.is_finite() && same.roll.is_finite());
        assert!(approx(same.pitch, 0.0, 1e-6));

        let back = f.update(Instant::from_micros(10_000), [0.0, 0.0, 1.0], [0.0, 100.0, 100.0]);
        assert!(approx(back.pitch, 0.0, 1e-6));
        assert!(approx(back.roll, 0.0, 1e-6));
    }

    #[test]
    fn free_fall_sample_stays_finite() {
        let mut f = ComplementaryFilter::new(0.98, Instant::from_micros(0));
        let att = f.update(Instant::from_micros(10_000), [0.0; 3], [0.0; 3]);
        assert!(att.pitch.is_finite());
        assert!(att.roll.is_finite());
    }

    #[test]
    fn window_average_equals_mean_of_last_n() {
        let mut avg = MovingAverage::<5>::new();
        let samples = [10, 20, 30, 40, 50];
        let mut out = 0;
        for s in samples {
            out = avg.push(s);
        }
        assert_eq!(out, 30);

        // Oldest sample (10) leaves the window
        assert_eq!(avg.push(60), (20 + 30 + 40 + 50 + 60) / 5);
    }

    #[test]
    fn window_starts_biased_toward_zero() {
        let mut avg = MovingAverage::<10>::new();
        assert_eq!(avg.push(7400), 740);
        assert_eq!(avg.push(7400), 1480);
    }

    #[test]
    fn window_truncates_toward_zero() {
        let mut avg = MovingAverage::<5>::new();
        assert_eq!(avg.push(-7), -1);
        assert_eq!(avg.push(3), 0);
    }

    #[test]
    fn running_sum_tracks_buffer() {
        let mut avg = MovingAverage::<5>::new();
        for i in 0..23 {
            avg.push(i * 3 - 17);
            assert_eq!(avg.sum, avg.buffer.iter().sum::<i32>());
        }
    }
}
