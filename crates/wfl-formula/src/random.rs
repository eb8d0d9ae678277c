//! Random source for the dice operator

use crate::error::{EvalError, EvalResult};

/// Supplies dice rolls to the `d` operator
pub trait RandomSource {
    /// A uniformly distributed value in `1..=faces`; `faces` is positive
    fn roll(&mut self, faces: i64) -> i64;
}

impl<R: rand::Rng + ?Sized> RandomSource for R {
    fn roll(&mut self, faces: i64) -> i64 {
        self.gen_range(1..=faces)
    }
}

/// Most dice a single `d` expression rolls
pub const MAX_DICE: u64 = 100_000;

/// Sum of `rolls` dice with `faces` sides each
///
/// Non-positive counts or face numbers roll nothing and sum to zero. More
/// than [`MAX_DICE`] rolls is an error.
pub fn roll_dice(rng: &mut dyn RandomSource, rolls: i64, faces: i64) -> EvalResult<i64> {
    if faces <= 0 || rolls <= 0 {
        return Ok(0);
    }
    let count = rolls.unsigned_abs();
    if count > MAX_DICE {
        return Err(EvalError::TooLarge {
            what: "dice count",
            size: count,
            limit: MAX_DICE,
        });
    }
    Ok((0..rolls).fold(0i64, |sum, _| sum.saturating_add(rng.roll(faces))))
}
