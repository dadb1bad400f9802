//! Display-only sample thinning.
//!
//! Selection is keyed to absolute sample indices, so whether a given index
//! survives decimation never depends on how the stream was chunked into
//! blocks. No smoothing is applied before selection: this is deliberate
//! display thinning, not anti-aliased downsampling, and aliases above the
//! decimated rate are accepted on screen.

/// Keeps every `factor`-th sample, counting from `phase_anchor` (the
/// enclosing segment's first index). Indices congruent to the anchor modulo
/// `factor` are selected; everything else is dropped.
pub fn decimate(
    indices: &[u32],
    values: &[f32],
    factor: usize,
    phase_anchor: u32,
) -> (Vec<u32>, Vec<f32>) {
    debug_assert_eq!(indices.len(), values.len());

    if factor <= 1 {
        return (indices.to_vec(), values.to_vec());
    }

    let factor = factor as u32;
    let phase = phase_anchor % factor;

    let mut kept_x = Vec::with_capacity(indices.len() / factor as usize + 1);
    let mut kept_y = Vec::with_capacity(kept_x.capacity());
    for (&index, &value) in indices.iter().zip(values) {
        if index % factor == phase {
            kept_x.push(index);
            kept_y.push(value);
        }
    }

    (kept_x, kept_y)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contiguous(first: u32, len: usize) -> (Vec<u32>, Vec<f32>) {
        let indices: Vec<u32> = (first..first + len as u32).collect();
        let values: Vec<f32> = indices.iter().map(|&i| i as f32 * 0.5).collect();
        (indices, values)
    }

    #[test]
    fn factor_one_is_identity() {
        let (indices, values) = contiguous(40, 10);
        let (x, y) = decimate(&indices, &values, 1, 7);
        assert_eq!(x, indices);
        assert_eq!(y, values);
    }

    #[test]
    fn selection_lands_on_anchor_grid() {
        let (indices, values) = contiguous(13, 23);
        let (x, y) = decimate(&indices, &values, 5, 2);

        assert_eq!(x, vec![17, 22, 27, 32]);
        for (&index, &value) in x.iter().zip(&y) {
            assert_eq!(value, index as f32 * 0.5);
        }
    }

    #[test]
    fn chunking_does_not_change_which_samples_survive() {
        let (indices, values) = contiguous(100, 64);
        let (whole_x, whole_y) = decimate(&indices, &values, 7, 100);

        for split in [1, 13, 31, 63] {
            let (ax, ay) = decimate(&indices[..split], &values[..split], 7, 100);
            let (bx, by) = decimate(&indices[split..], &values[split..], 7, 100);

            let mut chunked_x = ax;
            chunked_x.extend(bx);
            let mut chunked_y = ay;
            chunked_y.extend(by);

            assert_eq!(chunked_x, whole_x, "split at {split}");
            assert_eq!(chunked_y, whole_y, "split at {split}");
        }
    }

    #[test]
    fn anchor_phase_wraps_modulo_factor() {
        let (indices, values) = contiguous(0, 30);
        let (a, _) = decimate(&indices, &values, 10, 3);
        let (b, _) = decimate(&indices, &values, 10, 23);
        assert_eq!(a, b);
        assert_eq!(a, vec![3, 13, 23]);
    }
}
