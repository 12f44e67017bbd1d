//! Coverage and heatmap analytics
//!
//! Pure functions over the index accumulators. Nothing here touches the
//! file or the host.
//!
//! | Function | Input | Output |
//! |----------|-------|--------|
//! | [`coverage`] | unique addresses, binary size | integer percent or `-1` |
//! | [`compute_color_steps`] | distinct hit counts | hit count to packed RGB |
//! | [`Heatmap::from_index`] | a [`TraceIndex`] | per-address colors |

use crate::index::TraceIndex;
use std::collections::{BTreeMap, BTreeSet};
use tracelens_core::Address;

/// Packed RGB white
pub const WHITE: u32 = 0xFF_FF_FF;

/// Coverage result when the instruction count of the binary is zero
pub const COVERAGE_UNKNOWN: i64 = -1;

const STEP_RANGE: u32 = 400;
const STEP_RANGE_WIDE: u32 = 510;
const WIDE_THRESHOLD: usize = 509;

/// Integer percentage of the binary's instructions seen in the trace
///
/// Returns [`COVERAGE_UNKNOWN`] when `total_instructions` is zero.
pub fn coverage(unique_addresses: usize, total_instructions: u64) -> i64 {
    if total_instructions == 0 {
        return COVERAGE_UNKNOWN;
    }
    let percent = (unique_addresses as u128 * 100) / total_instructions as u128;
    i64::try_from(percent).unwrap_or(i64::MAX)
}

/// Pack three channels into `0xRRGGBB`
pub fn rgb(r: u8, g: u8, b: u8) -> u32 {
    (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
}

/// Map every distinct hit count (and zero) to a gradient color
///
/// Values are stepped in ascending order: low counts stay near white, high
/// counts move through light blue toward deep blue. Zero is always white.
pub fn compute_color_steps(hit_counts: impl IntoIterator<Item = u64>) -> BTreeMap<u64, u32> {
    let mut values: BTreeSet<u64> = hit_counts.into_iter().collect();
    values.insert(0);

    let step = step_size(values.len());

    let mut steps = BTreeMap::new();
    for (i, value) in values.into_iter().enumerate() {
        let s = u32::try_from(i).unwrap_or(u32::MAX).saturating_mul(step);
        let color = if s > 255 {
            rgb(0, 0, channel(255u32.saturating_sub(s - 255)))
        } else {
            let c = channel(255 - s);
            rgb(c, c, 255)
        };
        steps.insert(value, color);
    }
    steps.insert(0, WHITE);
    steps
}

/// Gradient distance between neighbouring values when `n` values share it
fn step_size(n: usize) -> u32 {
    let range = if n <= WIDE_THRESHOLD {
        STEP_RANGE
    } else {
        STEP_RANGE_WIDE
    };
    // at most STEP_RANGE_WIDE, so the narrowing is lossless
    (range as usize / n.max(1)) as u32
}

fn channel(v: u32) -> u8 {
    u8::try_from(v).unwrap_or(u8::MAX)
}

/// Heatmap colors for one trace
#[derive(Debug, Clone)]
pub struct Heatmap<'a> {
    index: &'a TraceIndex,
    steps: BTreeMap<u64, u32>,
}

impl<'a> Heatmap<'a> {
    /// Build the color steps from an index's hit counts
    pub fn from_index(index: &'a TraceIndex) -> Self {
        Heatmap {
            index,
            steps: compute_color_steps(index.distinct_hit_counts()),
        }
    }

    /// Color for an address; white if it was never executed
    pub fn color_of(&self, address: Address) -> u32 {
        self.color_for_hits(self.index.hit_count_of(address))
    }

    /// Color for a hit count
    pub fn color_for_hits(&self, hits: u64) -> u32 {
        self.steps.get(&hits).copied().unwrap_or(WHITE)
    }

    /// The full hit count to color mapping
    pub fn steps(&self) -> &BTreeMap<u64, u32> {
        &self.steps
    }

    /// `(address, hits, color)` for every covered address, by address
    pub fn entries(&self) -> Vec<(Address, u64, u32)> {
        let mut entries: Vec<_> = self
            .index
            .hit_counts()
            .map(|(address, hits)| (address, hits, self.color_for_hits(hits)))
            .collect();
        entries.sort_unstable_by_key(|(address, _, _)| *address);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracelens_core::InstructionRecord;

    #[test]
    fn test_step_size() {
        assert_eq!(step_size(1), 400);
        assert_eq!(step_size(3), 133);
        assert_eq!(step_size(509), 0);
        assert_eq!(step_size(510), 1);
        assert_eq!(step_size(511), 0);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_step_size_beyond_u32() {
        assert_eq!(step_size(u32::MAX as usize + 1), 0);
        assert_eq!(step_size(u32::MAX as usize + 2), 0);
    }

    fn blue_distance(color: u32) -> u32 {
        let r = (color >> 16) & 0xFF;
        let g = (color >> 8) & 0xFF;
        let b = color & 0xFF;
        // white = 0, light blue grows with r/g loss, deep blue adds b loss
        (255 - r) + (255 - g) + (255 - b)
    }

    #[test]
    fn test_coverage() {
        assert_eq!(coverage(5, 0), COVERAGE_UNKNOWN);
        assert_eq!(coverage(50, 100), 50);
        assert_eq!(coverage(1, 3), 33);
        assert_eq!(coverage(0, 10), 0);
    }

    #[test]
    fn test_rgb() {
        assert_eq!(rgb(0x98, 0xFF, 0x98), 0x98FF98);
        assert_eq!(rgb(255, 255, 255), WHITE);
    }

    #[test]
    fn test_only_zero_is_white() {
        let steps = compute_color_steps([0]);
        assert_eq!(steps, BTreeMap::from([(0, WHITE)]));
        assert_eq!(compute_color_steps(std::iter::empty()), BTreeMap::from([(0, WHITE)]));
    }

    #[test]
    fn test_three_values_monotonic() {
        let steps = compute_color_steps([0, 1, 2]);
        // n = 3, step = 133
        assert_eq!(steps[&0], WHITE);
        assert_eq!(steps[&1], rgb(122, 122, 255));
        assert_eq!(steps[&2], rgb(0, 0, 244));
        assert!(blue_distance(steps[&0]) < blue_distance(steps[&1]));
        assert!(blue_distance(steps[&1]) < blue_distance(steps[&2]));
    }

    #[test]
    fn test_zero_forced_white_without_input_zero() {
        let steps = compute_color_steps([7, 3]);
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[&0], WHITE);
        assert!(blue_distance(steps[&3]) < blue_distance(steps[&7]));
    }

    #[test]
    fn test_independent_of_input_order() {
        let forward = compute_color_steps([1, 5, 9, 12]);
        let backward = compute_color_steps([12, 9, 5, 1]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_wide_range_threshold() {
        // 509 values including zero still use the narrow range
        let narrow = compute_color_steps(1u64..509);
        assert_eq!(narrow.len(), 509);
        assert_eq!(narrow[&1], rgb(255, 255, 255));

        // past the threshold each step is 510 / n == 0
        let wide = compute_color_steps(1u64..600);
        assert!(wide.values().all(|c| *c == WHITE));
    }

    #[test]
    fn test_heatmap_from_index() {
        let mut index = TraceIndex::new();
        let addresses = [0x10, 0x10, 0x20, 0x30, 0x20, 0x40, 0x10];
        let records = addresses
            .iter()
            .enumerate()
            .map(|(i, a)| InstructionRecord::new(i as u64, *a, "nop"))
            .collect();
        index.append(records, vec![]).unwrap();

        let heatmap = Heatmap::from_index(&index);
        assert_eq!(heatmap.steps().len(), 4);
        assert_eq!(heatmap.color_of(0x999), WHITE);
        assert_eq!(heatmap.color_of(0x20), heatmap.color_for_hits(2));
        assert!(blue_distance(heatmap.color_of(0x30)) < blue_distance(heatmap.color_of(0x20)));
        assert!(blue_distance(heatmap.color_of(0x20)) < blue_distance(heatmap.color_of(0x10)));

        let entries = heatmap.entries();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].0, 0x10);
        assert_eq!(entries[0].1, 3);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn steps_never_lighter_for_more_hits(
                values in proptest::collection::btree_set(1u64..10_000, 0..600)
            ) {
                let steps = compute_color_steps(values.iter().copied());
                prop_assert_eq!(steps[&0], WHITE);
                prop_assert_eq!(steps.len(), values.len() + 1);

                let distances: Vec<u32> = steps.values().map(|c| blue_distance(*c)).collect();
                for pair in distances.windows(2) {
                    prop_assert!(pair[0] <= pair[1]);
                }
            }
        }
    }
}
