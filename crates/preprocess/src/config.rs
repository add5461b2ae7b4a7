/// Square edge of the classifier input, in pixels.
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// Channel values are mapped with `p / NORMALIZE_DIVISOR - 1.0`.
///
/// 127.0 rather than 127.5 is what the deployed models were trained with,
/// which puts white at ~1.0079 instead of 1.0.
pub const NORMALIZE_DIVISOR: f32 = 127.0;
