use crate::tables::{QOA_DEQUANT_TAB, QOA_QUANT_TAB, QOA_RECIPROCAL_TAB};

/// QOA division with rounding away from zero
#[inline(always)]
pub(crate) fn qoa_div(v: i32, scalefactor: usize) -> i32 {
    let reciprocal = QOA_RECIPROCAL_TAB[scalefactor];
    // Residuals can exceed 16 bits once the predictor overshoots, so the
    // product is formed in 64 bits.
    let n = ((i64::from(v) * i64::from(reciprocal) + (1 << 15)) >> 16) as i32;
    n + (v.signum() - n.signum())
}

/// Quantize `residual` with `scalefactor`, returning the 3-bit code and the
/// value the decoder will reconstruct from it.
#[inline(always)]
pub(crate) fn quantize(residual: i32, scalefactor: usize) -> (u8, i16) {
    let scaled = qoa_div(residual, scalefactor).clamp(-8, 8);
    let quantized = QOA_QUANT_TAB[(scaled + 8) as usize];
    (quantized, QOA_DEQUANT_TAB[scalefactor][quantized as usize])
}

#[inline(always)]
pub(crate) fn dequantize(scalefactor: usize, quantized: usize) -> i16 {
    QOA_DEQUANT_TAB[scalefactor][quantized]
}

#[inline(always)]
pub(crate) fn clamp_i16(v: i32) -> i16 {
    v.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}
