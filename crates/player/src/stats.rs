/// Decode statistics of one substream over a full playback pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stats {
    pub num_total_frames: u32,
    pub average_fps: f32,
    pub average_frame_duration_ms: u32,
}

impl Stats {
    /// Derives the averages from a pass duration and frame count.
    pub fn from_pass(total_decoding_time_ms: u64, frames_decoded: u64) -> Self {
        if frames_decoded == 0 {
            return Self::default();
        }

        let average_frame_duration_ms = (total_decoding_time_ms / frames_decoded) as u32;

        Self {
            num_total_frames: frames_decoded as u32,
            average_fps: if average_frame_duration_ms > 0 {
                1000.0 / average_frame_duration_ms as f32
            } else {
                0.0
            },
            average_frame_duration_ms,
        }
    }
}

/// Per-substream statistics, refreshed at every loop restart.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsCollection {
    pub geometry: Stats,
    pub texture: Stats,
    pub occupancy: Stats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_from_a_pass() {
        let stats = Stats::from_pass(1000, 40);

        assert_eq!(stats.num_total_frames, 40);
        assert_eq!(stats.average_frame_duration_ms, 25);
        assert_eq!(stats.average_fps, 40.0);
    }

    #[test]
    fn empty_pass_is_all_zero() {
        assert_eq!(Stats::from_pass(1000, 0), Stats::default());
    }
}
