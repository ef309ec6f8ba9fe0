//! Queue family classification.
//!
//! All queries here are pure scans over [`QueueFamily`] descriptors. A
//! single family may answer several queries at once; overlap is only ruled
//! out by the dedicated/separated variants.

use ash::vk;
use bitflags::bitflags;

bitflags! {
    /// Operations a queue family supports.
    ///
    /// PRESENT is not a Vulkan queue flag; it is resolved per family
    /// against a concrete surface at enumeration time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct QueueOps: u32 {
        const GRAPHICS = 1;
        const COMPUTE = 1 << 1;
        const TRANSFER = 1 << 2;
        const PRESENT = 1 << 3;
    }
}

/// The kinds of queues a device hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueType {
    Graphics,
    Compute,
    Transfer,
    Present,
}

/// Immutable description of one queue family.
///
/// Produced once during device enumeration and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamily {
    /// Index of the family on its physical device.
    pub index: u32,
    /// Operations the family supports.
    pub ops: QueueOps,
    /// Number of queues in the family.
    pub count: u32,
}

impl QueueFamily {
    /// Build a descriptor from raw family properties.
    ///
    /// `present` must be the result of probing this family against the
    /// surface the device will render to; pass `false` when there is no
    /// surface, so present queries can never match.
    pub fn from_properties(
        index: u32,
        properties: &vk::QueueFamilyProperties,
        present: bool,
    ) -> Self {
        let mut ops = QueueOps::empty();
        if properties.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            ops |= QueueOps::GRAPHICS;
        }
        if properties.queue_flags.contains(vk::QueueFlags::COMPUTE) {
            ops |= QueueOps::COMPUTE;
        }
        if properties.queue_flags.contains(vk::QueueFlags::TRANSFER) {
            ops |= QueueOps::TRANSFER;
        }
        if present {
            ops |= QueueOps::PRESENT;
        }

        Self {
            index,
            ops,
            count: properties.queue_count,
        }
    }

    /// Check whether the family supports all of `ops`.
    pub const fn supports(&self, ops: QueueOps) -> bool {
        self.ops.contains(ops)
    }
}

/// Index of the first family supporting graphics operations.
pub fn graphics_index(families: &[QueueFamily]) -> Option<u32> {
    families
        .iter()
        .find(|fam| fam.supports(QueueOps::GRAPHICS))
        .map(|fam| fam.index)
}

/// Index of the first family able to present to the enumeration surface.
///
/// Descriptors enumerated without a surface never carry the PRESENT bit,
/// so this returns `None` for them without probing anything.
pub fn present_index(families: &[QueueFamily]) -> Option<u32> {
    families
        .iter()
        .find(|fam| fam.supports(QueueOps::PRESENT))
        .map(|fam| fam.index)
}

/// Index of the first family doing compute and nothing else primary.
///
/// Graphics or transfer support disqualifies the family.
pub fn dedicated_compute_index(families: &[QueueFamily]) -> Option<u32> {
    families
        .iter()
        .find(|fam| {
            fam.supports(QueueOps::COMPUTE)
                && !fam.supports(QueueOps::GRAPHICS)
                && !fam.supports(QueueOps::TRANSFER)
        })
        .map(|fam| fam.index)
}

/// Index of the first family doing transfer and nothing else primary.
pub fn dedicated_transfer_index(families: &[QueueFamily]) -> Option<u32> {
    families
        .iter()
        .find(|fam| {
            fam.supports(QueueOps::TRANSFER)
                && !fam.supports(QueueOps::GRAPHICS)
                && !fam.supports(QueueOps::COMPUTE)
        })
        .map(|fam| fam.index)
}

/// Index of a family doing compute but not graphics.
///
/// Prefers a family that also avoids transfer; a transfer-capable family
/// is remembered as a fallback and only returned when no strict match
/// exists anywhere in the list.
pub fn separated_compute_index(families: &[QueueFamily]) -> Option<u32> {
    let mut fallback = None;
    for fam in families {
        if fam.supports(QueueOps::COMPUTE) && !fam.supports(QueueOps::GRAPHICS) {
            if !fam.supports(QueueOps::TRANSFER) {
                return Some(fam.index);
            }
            fallback = Some(fam.index);
        }
    }

    fallback
}

/// Index of a family doing transfer but not graphics.
///
/// Mirror of [`separated_compute_index`] with compute as the sibling
/// capability.
pub fn separated_transfer_index(families: &[QueueFamily]) -> Option<u32> {
    let mut fallback = None;
    for fam in families {
        if fam.supports(QueueOps::TRANSFER) && !fam.supports(QueueOps::GRAPHICS) {
            if !fam.supports(QueueOps::COMPUTE) {
                return Some(fam.index);
            }
            fallback = Some(fam.index);
        }
    }

    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(index: u32, ops: QueueOps) -> QueueFamily {
        QueueFamily {
            index,
            ops,
            count: 1,
        }
    }

    #[test]
    fn graphics_takes_first_match() {
        let families = [
            family(0, QueueOps::TRANSFER),
            family(1, QueueOps::GRAPHICS | QueueOps::COMPUTE),
            family(2, QueueOps::GRAPHICS),
        ];

        assert_eq!(graphics_index(&families), Some(1));
    }

    #[test]
    fn present_requires_probed_bit() {
        let families = [
            family(0, QueueOps::GRAPHICS),
            family(1, QueueOps::GRAPHICS | QueueOps::PRESENT),
        ];

        assert_eq!(present_index(&families), Some(1));
        // No surface at enumeration time means no PRESENT bit anywhere.
        assert_eq!(present_index(&families[..1]), None);
    }

    #[test]
    fn graphics_disqualifies_dedicated_compute() {
        let families = [
            family(0, QueueOps::GRAPHICS | QueueOps::COMPUTE),
            family(1, QueueOps::GRAPHICS | QueueOps::COMPUTE | QueueOps::TRANSFER),
        ];

        assert_eq!(dedicated_compute_index(&families), None);
    }

    #[test]
    fn dedicated_compute_excludes_transfer() {
        let families = [
            family(0, QueueOps::COMPUTE | QueueOps::TRANSFER),
            family(1, QueueOps::COMPUTE),
        ];

        assert_eq!(dedicated_compute_index(&families), Some(1));
    }

    #[test]
    fn dedicated_transfer_excludes_compute() {
        let families = [
            family(0, QueueOps::GRAPHICS | QueueOps::COMPUTE | QueueOps::TRANSFER),
            family(1, QueueOps::COMPUTE | QueueOps::TRANSFER),
            family(2, QueueOps::TRANSFER),
        ];

        assert_eq!(dedicated_transfer_index(&families), Some(2));
    }

    #[test]
    fn separated_compute_strict_match_beats_earlier_loose_match() {
        // Family 1 is loose (compute + transfer), family 2 is strict.
        let families = [
            family(0, QueueOps::GRAPHICS | QueueOps::COMPUTE),
            family(1, QueueOps::COMPUTE | QueueOps::TRANSFER),
            family(2, QueueOps::COMPUTE),
        ];

        assert_eq!(separated_compute_index(&families), Some(2));
    }

    #[test]
    fn separated_compute_falls_back_to_loose_match() {
        let families = [
            family(0, QueueOps::GRAPHICS | QueueOps::COMPUTE),
            family(1, QueueOps::COMPUTE | QueueOps::TRANSFER),
        ];

        assert_eq!(separated_compute_index(&families), Some(1));
    }

    #[test]
    fn separated_transfer_mirrors_compute_policy() {
        let families = [
            family(0, QueueOps::GRAPHICS | QueueOps::TRANSFER),
            family(1, QueueOps::TRANSFER | QueueOps::COMPUTE),
            family(2, QueueOps::TRANSFER),
        ];

        assert_eq!(separated_transfer_index(&families), Some(2));
        assert_eq!(separated_transfer_index(&families[..2]), Some(1));
    }

    #[test]
    fn one_family_can_answer_every_query() {
        let all = QueueOps::GRAPHICS | QueueOps::COMPUTE | QueueOps::TRANSFER | QueueOps::PRESENT;
        let families = [family(0, all)];

        assert_eq!(graphics_index(&families), Some(0));
        assert_eq!(present_index(&families), Some(0));
        // Dedicated and separated still refuse it.
        assert_eq!(dedicated_compute_index(&families), None);
        assert_eq!(separated_transfer_index(&families), None);
    }

    #[test]
    fn descriptor_from_raw_properties() {
        let properties = vk::QueueFamilyProperties {
            queue_flags: vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE,
            queue_count: 4,
            ..Default::default()
        };

        let fam = QueueFamily::from_properties(3, &properties, true);
        assert_eq!(fam.index, 3);
        assert_eq!(fam.count, 4);
        assert!(fam.supports(QueueOps::GRAPHICS | QueueOps::COMPUTE | QueueOps::PRESENT));
        assert!(!fam.supports(QueueOps::TRANSFER));
    }
}
