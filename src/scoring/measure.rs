//! Wall-clock measurement of one benchmark workload.

use std::time::Instant;

use crate::error::AccelResult;

#[derive(Debug, Clone, Copy)]
pub struct MeasureConfig {
    /// Untimed runs before measuring; the first run on a device pays for
    /// lazy driver work.
    pub warmup_iters: usize,
    pub iters: usize,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        MeasureConfig {
            warmup_iters: 1,
            iters: 1,
        }
    }
}

impl MeasureConfig {
    /// Several timed runs, for reports that want a steadier number.
    pub fn steady() -> Self {
        MeasureConfig {
            warmup_iters: 2,
            iters: 5,
        }
    }
}

/// Median seconds per call of `f`. The first error aborts the measurement.
pub fn measure<F>(config: &MeasureConfig, mut f: F) -> AccelResult<f64>
where
    F: FnMut() -> AccelResult<()>,
{
    for _ in 0..config.warmup_iters {
        f()?;
    }
    let iters = config.iters.max(1);
    let mut times = Vec::with_capacity(iters);
    for _ in 0..iters {
        let start = Instant::now();
        f()?;
        times.push(start.elapsed().as_secs_f64());
    }
    Ok(median(&mut times))
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AccelError;

    #[test]
    fn test_median() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [4.0, 1.0, 2.0, 3.0]), 2.5);
    }

    #[test]
    fn test_counts_calls() {
        let mut calls = 0;
        let secs = measure(&MeasureConfig::steady(), || {
            calls += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(calls, 7);
        assert!(secs >= 0.0);
    }

    #[test]
    fn test_error_aborts() {
        let mut calls = 0;
        let result = measure(&MeasureConfig::default(), || {
            calls += 1;
            Err(AccelError::InvalidArgument("boom".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
