use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
pub type Fixed64 = I32F32;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// Energy amounts are whole units. Never negative.
pub type Energy = u64;

/// Ratio `part / whole` as a Fixed64 clamped to [0, 1].
///
/// A zero `whole` yields 0. Both operands are integers so the result is
/// deterministic across platforms.
#[inline]
pub fn ratio(part: Energy, whole: Energy) -> Fixed64 {
    if whole == 0 {
        return Fixed64::from_num(0);
    }
    if part >= whole {
        return Fixed64::from_num(1);
    }
    // part < whole, so the quotient is in [0, 1) and the shift cannot overflow.
    let scaled = ((part as u128) << 32) / whole as u128;
    Fixed64::from_bits(scaled as i64)
}

/// Convert Fixed64 to f64. Use only for display, never in the sim loop.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}
