//! # Pitch Detection Module
//!
//! Harmonic product spectrum and bin selection.
//!
//! A true fundamental has energy at integer multiples of its own bin, so
//! multiplying each bin by the magnitudes found at its multiples lifts the
//! fundamental above a loud overtone that lacks overtones of its own.
//!
//! All spectra here use the magnitude-spectrum indexing of [`crate::fft`]:
//! index `k` holds bin `k + 1`.

/// Builds the harmonic product spectrum of `magnitudes` into `hps`.
///
/// For every bin `b`, the magnitude of `b` is multiplied by the magnitude of
/// `b * j` for `j` in `2..=harmonics`, skipping factors whose bin lies past
/// the end of the spectrum or whose magnitude does not exceed `epsilon`.
/// A bin with no usable harmonics keeps its own magnitude.
pub fn harmonic_product_spectrum_into(
    magnitudes: &[f64],
    harmonics: usize,
    epsilon: f64,
    hps: &mut Vec<f64>,
) {
    let bins = magnitudes.len();
    hps.clear();
    hps.extend(magnitudes.iter().enumerate().map(|(index, &magnitude)| {
        let bin = index + 1;
        (2..=harmonics)
            .map(|j| bin * j)
            .take_while(|&harmonic_bin| harmonic_bin <= bins)
            .map(|harmonic_bin| magnitudes[harmonic_bin - 1])
            .filter(|&h| h > epsilon)
            .fold(magnitude, |product, h| product * h)
    }));
}

/// Allocating form of [`harmonic_product_spectrum_into`].
pub fn harmonic_product_spectrum(magnitudes: &[f64], harmonics: usize, epsilon: f64) -> Vec<f64> {
    let mut hps = Vec::with_capacity(magnitudes.len());
    harmonic_product_spectrum_into(magnitudes, harmonics, epsilon, &mut hps);
    hps
}

/// Returns the bin holding the largest value of `spectrum`.
///
/// Tracking starts at the first valid bin, so ties resolve to the lowest bin
/// and an all-zero spectrum yields bin 1. Returns `None` only for an empty
/// spectrum.
pub fn peak_bin(spectrum: &[f64]) -> Option<usize> {
    let (first, rest) = spectrum.split_first()?;
    let mut best_index = 0;
    let mut best_value = *first;
    for (offset, &value) in rest.iter().enumerate() {
        if value > best_value {
            best_index = offset + 1;
            best_value = value;
        }
    }
    Some(best_index + 1)
}

/// Centre frequency of `bin` in Hz.
pub fn bin_to_frequency(bin: usize, sample_rate: u32, block_size: usize) -> f32 {
    (bin as f64 * sample_rate as f64 / block_size as f64) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-5;

    #[test]
    fn no_harmonics_leaves_spectrum_unchanged() {
        let mut magnitudes = vec![0.0; 100];
        // Bins 31, 33 and 37 have nothing at their multiples; lower bins are zero.
        magnitudes[30] = 5.0;
        magnitudes[32] = 7.0;
        magnitudes[36] = 2.5;
        let hps = harmonic_product_spectrum(&magnitudes, 5, EPS);
        assert_eq!(hps, magnitudes);
    }

    #[test]
    fn harmonics_multiply_into_fundamental() {
        let mut magnitudes = vec![0.0; 40];
        magnitudes[4] = 2.0; // bin 5
        magnitudes[9] = 3.0; // bin 10
        magnitudes[14] = 4.0; // bin 15
        let hps = harmonic_product_spectrum(&magnitudes, 5, EPS);
        assert_eq!(hps[4], 24.0);
        assert_eq!(hps[9], 3.0);
        assert_eq!(hps[14], 4.0);
    }

    #[test]
    fn factors_past_the_end_are_skipped() {
        let magnitudes = vec![1.0, 2.0, 3.0, 4.0];
        let hps = harmonic_product_spectrum(&magnitudes, 5, EPS);
        // bin 1 * bins 2,3,4 (bin 5 out of range)
        assert_eq!(hps[0], 24.0);
        // bin 2 * bin 4
        assert_eq!(hps[1], 8.0);
        assert_eq!(hps[2], 3.0);
        assert_eq!(hps[3], 4.0);
    }

    #[test]
    fn near_zero_harmonics_do_not_erase_fundamental() {
        let mut magnitudes = vec![0.0; 20];
        magnitudes[1] = 9.0;
        magnitudes[3] = 1e-9;
        let hps = harmonic_product_spectrum(&magnitudes, 5, EPS);
        assert_eq!(hps[1], 9.0);
    }

    #[test]
    fn harmonic_count_limits_factors() {
        let magnitudes = vec![1.0, 2.0, 3.0, 4.0];
        let hps = harmonic_product_spectrum(&magnitudes, 2, EPS);
        assert_eq!(hps[0], 2.0);
        assert_eq!(hps[1], 8.0);
    }

    #[test]
    fn peak_bin_starts_at_first_valid_bin() {
        assert_eq!(peak_bin(&[]), None);
        assert_eq!(peak_bin(&[0.0; 16]), Some(1));
        assert_eq!(peak_bin(&[0.0, 3.0, 1.0, 3.0]), Some(2));
        assert_eq!(peak_bin(&[0.0, 1.0, 5.0]), Some(3));
    }

    #[test]
    fn bin_frequency_conversion() {
        assert_eq!(bin_to_frequency(0, 8000, 8192), 0.0);
        assert!((bin_to_frequency(451, 8000, 8192) - 440.43).abs() < 0.01);
        assert_eq!(bin_to_frequency(4096, 8000, 8192), 4000.0);
    }
}
