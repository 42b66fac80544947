use crate::tables::QOA_LMS_LEN;

/// State of the 4-tap least-mean-squares predictor of one channel.
///
/// Both arrays are 16 bit on the wire and all updates wrap at 16 bits, so
/// they are stored as `i16` and updated with wrapping arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QoaLms {
    pub history: [i16; QOA_LMS_LEN],
    pub weights: [i16; QOA_LMS_LEN],
}

impl Default for QoaLms {
    /// The stable starting filter every encoder channel begins with.
    fn default() -> Self {
        Self {
            history: [0; QOA_LMS_LEN],
            weights: [0, 0, -(1 << 13), 1 << 14],
        }
    }
}

impl QoaLms {
    #[inline(always)]
    pub fn predict(&self) -> i32 {
        let mut prediction: i32 = 0;
        for i in 0..QOA_LMS_LEN {
            // Four i16 products can exceed i32 on hostile input. Wrapping
            // keeps decoding total instead of panicking in debug builds.
            prediction = prediction
                .wrapping_add(i32::from(self.weights[i]) * i32::from(self.history[i]));
        }
        prediction >> 13
    }

    #[inline(always)]
    pub fn update(&mut self, sample: i16, residual: i16) {
        let delta = residual >> 4;
        for i in 0..QOA_LMS_LEN {
            self.weights[i] = if self.history[i] < 0 {
                self.weights[i].wrapping_sub(delta)
            } else {
                self.weights[i].wrapping_add(delta)
            };
        }

        self.history.copy_within(1.., 0);
        self.history[QOA_LMS_LEN - 1] = sample;
    }

    /// Sum of squared weights scaled down, the encoder's measure of how far
    /// the filter has drifted towards instability.
    #[inline(always)]
    pub(crate) fn weights_penalty(&self) -> u64 {
        let energy: i64 = self.weights.iter().map(|&w| i64::from(w) * i64::from(w)).sum();
        let penalty = ((energy >> 18) - 0x8ff).max(0) as u64;
        penalty * penalty
    }
}
