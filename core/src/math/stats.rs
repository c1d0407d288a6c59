pub struct StatsHelper;

impl StatsHelper {
    pub fn mean<I>(samples: I) -> Option<f32>
    where
        I: IntoIterator<Item = u16>,
    {
        let (sum, count) = samples
            .into_iter()
            .fold((0u64, 0usize), |(sum, count), v| (sum + v as u64, count + 1));
        if count == 0 {
            None
        } else {
            Some(sum as f32 / count as f32)
        }
    }

    /// Signal-to-noise ratio with the noise floored to one LSB.
    pub fn snr(signal: u16, noise: f32) -> f32 {
        signal as f32 / noise.max(1.0)
    }
}
