use serde::{Deserialize, Serialize};
use std::fmt;

/// Correlation key for one outbound request. Serialized as a bare integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tick(pub u32);

impl Tick {
    /// Reserved by the service for replies to requests it could not parse.
    pub const UNPARSEABLE: Self = Self(0);

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out ticks 1, 2, 3, ... for the lifetime of the process. Never reset
/// on reconnect.
#[derive(Debug, Default)]
pub struct TickAllocator {
    last: u32,
}

impl TickAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> Tick {
        self.last = self.last.saturating_add(1);
        Tick(self.last)
    }

    pub fn last(&self) -> Option<Tick> {
        if self.last == 0 {
            None
        } else {
            Some(Tick(self.last))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_starts_at_one_and_strictly_increases() {
        let mut allocator = TickAllocator::new();
        assert_eq!(allocator.last(), None);

        let issued: Vec<Tick> = (0..50).map(|_| allocator.next()).collect();
        assert_eq!(issued[0], Tick(1));
        assert!(issued.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(issued.windows(2).all(|pair| pair[1].0 == pair[0].0 + 1));
        assert_eq!(allocator.last(), Some(Tick(50)));
    }

    #[test]
    fn allocator_never_hands_out_the_unparseable_tick() {
        let mut allocator = TickAllocator::new();
        assert_ne!(allocator.next(), Tick::UNPARSEABLE);
    }

    #[test]
    fn tick_serializes_as_plain_integer() {
        let encoded = serde_json::to_string(&Tick(7)).expect("encode tick");
        assert_eq!(encoded, "7");
        let decoded: Tick = serde_json::from_str("12").expect("decode tick");
        assert_eq!(decoded, Tick(12));
    }
}
