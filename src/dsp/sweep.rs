//! Fixed-capacity sweep ring decomposed into redraw segments.
//!
//! One [`SweepRing`] holds a single channel's rolling window. Storage is the
//! per-segment rendered arrays themselves: every ring index belongs to
//! exactly one segment, segment x grids are fixed at construction, and
//! ingest overwrites y values in place. Nothing reallocates after
//! construction.

use super::decimate::decimate;

/// One contiguous index range `[start, end)` of the ring and its rendered
/// data. With decimation active the x grid keeps every `factor`-th index
/// counting from `start`.
#[derive(Debug, Clone)]
struct Segment {
    start: usize,
    end: usize,
    x: Vec<u32>,
    y: Vec<f32>,
}

impl Segment {
    fn new(start: usize, end: usize, factor: usize) -> Self {
        let x: Vec<u32> = (start..end).step_by(factor.max(1)).map(|i| i as u32).collect();
        let y = vec![0.0; x.len()];
        Self { start, end, x, y }
    }

    /// Writes `values` covering ring indices `[at, at + values.len())`; the
    /// caller guarantees that range lies inside this segment.
    fn write(&mut self, at: usize, values: &[f32], factor: usize) {
        if factor <= 1 {
            let offset = at - self.start;
            self.y[offset..offset + values.len()].copy_from_slice(values);
        } else {
            let indices: Vec<u32> = (at as u32..(at + values.len()) as u32).collect();
            let (kept_x, kept_y) = decimate(&indices, values, factor, self.start as u32);
            for (&index, &value) in kept_x.iter().zip(&kept_y) {
                self.y[(index as usize - self.start) / factor] = value;
            }
        }
    }
}

/// Circular sample history for one channel, partitioned into a fixed number
/// of segments so a tick only redraws the ranges it touched.
#[derive(Debug, Clone)]
pub struct SweepRing {
    capacity: usize,
    samples_per_segment: usize,
    decimation_factor: usize,
    write_cursor: usize,
    segments: Vec<Segment>,
}

impl SweepRing {
    /// Builds the ring with `segment_count` ranges partitioning
    /// `[0, capacity)`. The last segment absorbs the remainder; when the
    /// capacity is smaller than the segment count, trailing segments are
    /// empty and never reported dirty.
    pub fn new(capacity: usize, segment_count: usize, decimation_factor: usize) -> Self {
        let capacity = capacity.max(1);
        debug_assert!(capacity <= u32::MAX as usize);
        let segment_count = segment_count.max(1);
        let factor = decimation_factor.max(1);
        let samples_per_segment = capacity.div_ceil(segment_count);

        let segments = (0..segment_count)
            .map(|ix| {
                let start = (ix * samples_per_segment).min(capacity);
                let end = ((ix + 1) * samples_per_segment).min(capacity);
                Segment::new(start, end, factor)
            })
            .collect();

        Self {
            capacity,
            samples_per_segment,
            decimation_factor: factor,
            write_cursor: 0,
            segments,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn write_cursor(&self) -> usize {
        self.write_cursor
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Current rendered `(x, y)` pair for one segment.
    pub fn segment_view(&self, segment_index: usize) -> Option<(&[u32], &[f32])> {
        self.segments
            .get(segment_index)
            .map(|segment| (segment.x.as_slice(), segment.y.as_slice()))
    }

    /// Writes a block at the cursor and returns the indices of the segments
    /// the write touched, ascending.
    ///
    /// A block longer than the ring contributes only its most recent
    /// `capacity` samples; the front of the block is dropped. That is the
    /// bounded-display policy, not data loss: the cursor still advances by
    /// the full block length, so the final layout matches what a sequential
    /// write of every sample would have produced.
    pub fn ingest(&mut self, samples: &[f32]) -> Vec<usize> {
        if samples.is_empty() {
            return Vec::new();
        }

        let capacity = self.capacity;
        let n = samples.len();
        let (kept, start) = if n > capacity {
            let start = (self.write_cursor + (n - capacity)) % capacity;
            (&samples[n - capacity..], start)
        } else {
            (samples, self.write_cursor)
        };

        let mut dirty = Vec::new();
        let first_part = kept.len().min(capacity - start);
        self.write_span(start, &kept[..first_part], &mut dirty);
        if first_part < kept.len() {
            self.write_span(0, &kept[first_part..], &mut dirty);
        }

        self.write_cursor = (self.write_cursor + n) % capacity;

        dirty.sort_unstable();
        dirty.dedup();
        dirty
    }

    /// Zeroes every rendered segment and re-anchors the cursor. Segment
    /// geometry and x grids stay as built.
    pub fn clear(&mut self, anchor_sample: u64) {
        for segment in &mut self.segments {
            segment.y.fill(0.0);
        }
        self.write_cursor = (anchor_sample % self.capacity as u64) as usize;
    }

    /// Writes a span that does not wrap: `ring_start + values.len()` stays
    /// within capacity.
    fn write_span(&mut self, ring_start: usize, values: &[f32], dirty: &mut Vec<usize>) {
        if values.is_empty() {
            return;
        }

        let span_end = ring_start + values.len();
        let mut segment_ix = ring_start / self.samples_per_segment;
        while segment_ix < self.segments.len() {
            let segment = &mut self.segments[segment_ix];
            if segment.start >= span_end {
                break;
            }

            let overlap_start = ring_start.max(segment.start);
            let overlap_end = span_end.min(segment.end);
            if overlap_start < overlap_end {
                let offset = overlap_start - ring_start;
                segment.write(
                    overlap_start,
                    &values[offset..offset + (overlap_end - overlap_start)],
                    self.decimation_factor,
                );
                dirty.push(segment_ix);
            }
            segment_ix += 1;
        }
    }
}
