//! Format constants and the fixed quantization tables.

/// Number of samples per channel sharing one scale factor.
pub const QOA_SLICE_LEN: usize = 20;
/// Number of taps of the LMS predictor.
pub const QOA_LMS_LEN: usize = 4;
/// Size of the stream header and of every frame header, in bytes.
pub const QOA_HEADER_SIZE: usize = 8;
pub const QOA_MAGIC: u32 = u32::from_be_bytes(*b"qoaf");
pub const QOA_MAX_CHANNELS: usize = 8;
/// Largest frame a decoder accepts, in slices per channel.
pub const MAX_SLICES_PER_CHANNEL_PER_FRAME: usize = 256;
/// Samples per channel of a full frame at the slice cap.
pub const QOA_FRAME_LEN: usize = MAX_SLICES_PER_CHANNEL_PER_FRAME * QOA_SLICE_LEN;
/// Sample rates are stored in 24 bits.
pub const QOA_MAX_SAMPLE_RATE: u32 = 0xff_ffff;

/// QOA encoder reciprocal table
pub(crate) const QOA_RECIPROCAL_TAB: [i32; 16] = [
    65536, 9363, 3121, 1457, 781, 475, 311, 216, 156, 117, 90, 71, 57, 47, 39, 32,
];

/// QOA encoder quantization table, indexed by a scaled residual in `-8..=8`
/// offset by 8.
pub(crate) const QOA_QUANT_TAB: [u8; 17] = [7, 7, 7, 5, 5, 3, 3, 1, 0, 0, 2, 2, 4, 4, 6, 6, 6];

pub(crate) const QOA_DEQUANT_TAB: [[i16; 8]; 16] = [
    [1, -1, 3, -3, 5, -5, 7, -7],
    [5, -5, 18, -18, 32, -32, 49, -49],
    [16, -16, 53, -53, 95, -95, 147, -147],
    [34, -34, 113, -113, 203, -203, 315, -315],
    [63, -63, 210, -210, 378, -378, 588, -588],
    [104, -104, 345, -345, 621, -621, 966, -966],
    [158, -158, 528, -528, 950, -950, 1477, -1477],
    [228, -228, 760, -760, 1368, -1368, 2128, -2128],
    [316, -316, 1053, -1053, 1895, -1895, 2947, -2947],
    [422, -422, 1405, -1405, 2529, -2529, 3934, -3934],
    [548, -548, 1828, -1828, 3290, -3290, 5117, -5117],
    [696, -696, 2320, -2320, 4176, -4176, 6496, -6496],
    [868, -868, 2893, -2893, 5207, -5207, 8099, -8099],
    [1064, -1064, 3548, -3548, 6386, -6386, 9933, -9933],
    [1286, -1286, 4288, -4288, 7718, -7718, 12005, -12005],
    [1536, -1536, 5120, -5120, 9216, -9216, 14336, -14336],
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dequant_rows_are_symmetric() {
        for row in QOA_DEQUANT_TAB.iter() {
            for pair in row.chunks_exact(2) {
                assert_eq!(pair[0], -pair[1]);
            }
        }
    }

    #[test]
    fn test_quant_tab_sign_matches_dequant() {
        // Odd codes dequantize to negative values, even codes to positive.
        for (i, &code) in QOA_QUANT_TAB.iter().enumerate() {
            let scaled = i as i32 - 8;
            let dequantized = QOA_DEQUANT_TAB[0][code as usize];
            if scaled < 0 {
                assert!(dequantized < 0, "scaled {} gave {}", scaled, dequantized);
            } else {
                assert!(dequantized > 0, "scaled {} gave {}", scaled, dequantized);
            }
        }
    }

    #[test]
    fn test_frame_len() {
        assert_eq!(QOA_FRAME_LEN, 5120);
        assert_eq!(&QOA_MAGIC.to_be_bytes(), b"qoaf");
    }
}
