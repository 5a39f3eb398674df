use crate::{flush, flush_reload_time, maccess, reload_time};

use std::cmp::min;

const BUCKET_SIZE: usize = 5;
const BUCKET_NUMBER: usize = 250;
const SAMPLES: usize = 1 << 14;

/// Measure a hit/miss cutoff, in cycles, for `reload_time` on this machine.
///
/// Builds one latency histogram for a line kept hot and one for a line
/// flushed before every access, then places the threshold in the sparsest
/// bucket between the hit mode and the first miss mass.
///
/// Returns 0 when the two distributions overlap completely; callers should
/// treat that as a failed calibration.
pub fn calibrate_hit_threshold(array: &[u8]) -> u64 {
    let pointer = &array[0] as *const u8;
    assert_eq!(
        pointer as usize & 0x3f,
        0,
        "calibration buffer must be cache line aligned"
    );

    let mut hit_histogram = vec![0u32; BUCKET_NUMBER];
    let mut miss_histogram = vec![0u32; BUCKET_NUMBER];

    unsafe { maccess(pointer) };
    for _ in 0..SAMPLES {
        let d = unsafe { reload_time(pointer) } as usize;
        hit_histogram[min(BUCKET_NUMBER - 1, d / BUCKET_SIZE)] += 1;
    }

    unsafe { flush(pointer) };
    for _ in 0..SAMPLES {
        let d = unsafe { flush_reload_time(pointer) } as usize;
        miss_histogram[min(BUCKET_NUMBER - 1, d / BUCKET_SIZE)] += 1;
    }

    let mut hit_max: (usize, u32) = (0, 0);
    let mut miss_min = 0;
    for i in 0..BUCKET_NUMBER {
        if hit_histogram[i] > hit_max.1 {
            hit_max = (i, hit_histogram[i]);
        }
        // a couple of outliers do not count as the miss distribution
        if miss_min == 0 && miss_histogram[i] > 3 {
            miss_min = i;
        }
    }

    let mut threshold: (usize, u32) = (0, u32::MAX);
    for i in hit_max.0..miss_min {
        if hit_histogram[i] + miss_histogram[i] < threshold.1 {
            threshold = (i, hit_histogram[i] + miss_histogram[i]);
        }
    }

    (threshold.0 * BUCKET_SIZE) as u64
}
