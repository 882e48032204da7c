//! Configuration for the parallel transform.
//!
//! All settings are explicit values handed to the transform call; the
//! environment overrides are read once, at construction, and validated
//! into `Config` errors before any communication happens.

use crate::error::{BandwagonError, Result};

/// Default side length of the square tiles the transform gathers the
/// distributed matrix in. Bounds the gather scratch at
/// `block_size^2` elements per rank.
pub const DEFAULT_BLOCK_SIZE: usize = 256;

/// Tuning knobs for [`transform`](crate::transform::transform).
#[derive(Debug, Clone)]
pub struct TransformConfig {
    /// Tile side length for the blocked gather of the matrix.
    pub block_size: usize,
    /// Print a performance summary (rank 0, stderr) after each transform.
    pub print_performance: bool,
    /// Caller intends to run the local multiply on an accelerator.
    /// Informational: the backend handed to the transform decides where
    /// the multiply actually runs.
    pub accelerator: bool,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            print_performance: false,
            accelerator: false,
        }
    }
}

impl TransformConfig {
    /// Configuration with environment overrides applied:
    /// `BANDWAGON_BLOCK_SIZE`, `BANDWAGON_PRINT_PERFORMANCE`,
    /// `BANDWAGON_USE_GPU`.
    pub fn from_env() -> Result<Self> {
        let block_size = parse_block_size(std::env::var("BANDWAGON_BLOCK_SIZE").ok().as_deref())?;
        let print_performance =
            parse_flag(std::env::var("BANDWAGON_PRINT_PERFORMANCE").ok().as_deref());
        let accelerator = parse_flag(std::env::var("BANDWAGON_USE_GPU").ok().as_deref());
        Ok(Self {
            block_size,
            print_performance,
            accelerator,
        })
    }

    pub fn with_block_size(mut self, block_size: usize) -> Result<Self> {
        if block_size == 0 {
            return Err(BandwagonError::Config(
                "transform block size must be positive".into(),
            ));
        }
        self.block_size = block_size;
        Ok(self)
    }
}

fn parse_block_size(raw: Option<&str>) -> Result<usize> {
    match raw {
        None => Ok(DEFAULT_BLOCK_SIZE),
        Some(s) => match s.trim().parse::<usize>() {
            Ok(v) if v > 0 => Ok(v),
            _ => Err(BandwagonError::Config(format!(
                "invalid block size {s:?}: expected a positive integer"
            ))),
        },
    }
}

fn parse_flag(raw: Option<&str>) -> bool {
    matches!(raw.map(str::trim), Some("1") | Some("true") | Some("yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_block_size_when_unset() {
        assert_eq!(parse_block_size(None).unwrap(), DEFAULT_BLOCK_SIZE);
    }

    #[test]
    fn block_size_parses_and_validates() {
        assert_eq!(parse_block_size(Some("64")).unwrap(), 64);
        assert!(parse_block_size(Some("0")).is_err());
        assert!(parse_block_size(Some("lots")).is_err());
        assert!(parse_block_size(Some("-3")).is_err());
    }

    #[test]
    fn flags_accept_common_spellings() {
        assert!(parse_flag(Some("1")));
        assert!(parse_flag(Some("true")));
        assert!(!parse_flag(Some("0")));
        assert!(!parse_flag(None));
    }

    #[test]
    fn with_block_size_rejects_zero() {
        let err = TransformConfig::default().with_block_size(0).unwrap_err();
        assert!(matches!(err, BandwagonError::Config(_)), "{err}");
    }
}
