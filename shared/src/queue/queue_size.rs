/// The fixed menu of ring capacities a queue can be built with.
///
/// Requested sizes are rounded up to the nearest entry, so every ring is a
/// power of two and cursor-to-index mapping is a single mask.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(usize)]
pub enum QueueSize {
    K003 = 1 << 5,
    K01 = 1 << 7,
    K05 = 1 << 9,
    K1 = 1 << 10,
    K2 = 1 << 11,
    K4 = 1 << 12,
    K8 = 1 << 13,
    K16 = 1 << 14,
    K32 = 1 << 15,
    K65 = 1 << 16,
}

impl QueueSize {
    pub const ALL: [QueueSize; 10] = [
        QueueSize::K003,
        QueueSize::K01,
        QueueSize::K05,
        QueueSize::K1,
        QueueSize::K2,
        QueueSize::K4,
        QueueSize::K8,
        QueueSize::K16,
        QueueSize::K32,
        QueueSize::K65,
    ];

    pub const fn slots(self) -> usize {
        self as usize
    }

    /// Picks the smallest menu entry that holds `requested` items, clamping
    /// anything above the largest entry.
    pub fn proper(requested: usize) -> Self {
        for size in Self::ALL {
            if requested <= size.slots() {
                return size;
            }
        }
        QueueSize::K65
    }
}

impl From<QueueSize> for usize {
    fn from(size: QueueSize) -> Self {
        size.slots()
    }
}

/// Rounds `requested` up to a valid ring capacity.
pub fn proper_size(requested: usize) -> usize {
    QueueSize::proper(requested).slots()
}
