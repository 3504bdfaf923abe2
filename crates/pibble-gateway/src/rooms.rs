use std::fmt;

/// A broadcast group. Not persisted: the public room is a constant and a
/// private room is derived from the two participants' credentials.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoomId {
    Public,
    /// Credentials sorted so both participants derive the same room.
    Private { low: String, high: String },
}

impl RoomId {
    pub fn private(a: &str, b: &str) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self::Private {
            low: low.to_string(),
            high: high.to_string(),
        }
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => f.write_str("main"),
            // lengths keep the rendering unambiguous for logs
            Self::Private { low, high } => write!(f, "private:{}:{}:{}", low.len(), low, high),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_room_is_symmetric() {
        assert_eq!(RoomId::private("k1", "k2"), RoomId::private("k2", "k1"));
        assert_ne!(RoomId::private("k1", "k2"), RoomId::private("k1", "k3"));
    }

    #[test]
    fn concatenation_ambiguity_does_not_collide() {
        // "ab" + "c" and "a" + "bc" concatenate to the same string
        assert_ne!(RoomId::private("ab", "c"), RoomId::private("a", "bc"));
        assert_ne!(
            RoomId::private("ab", "c").to_string(),
            RoomId::private("a", "bc").to_string()
        );
    }

    #[test]
    fn private_room_orders_participants() {
        assert_eq!(
            RoomId::private("k2", "k1"),
            RoomId::Private {
                low: "k1".into(),
                high: "k2".into()
            }
        );
    }
}
