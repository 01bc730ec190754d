//! Map-membership state machine for one connection.
//!
//! A connection is either **Unplaced** or **InMap(m)**. The state is the
//! map id recorded on the *sending connection*, not whatever the player
//! registry currently says, and every `update_player` is classified
//! against it:
//!
//! ```text
//!  Unplaced ──update(m)──→ InMap(m)          Enter
//!  InMap(m) ──update(m)──→ InMap(m)          Stay
//!  InMap(m) ──update(m')─→ InMap(m')         Switch (delete, then insert)
//!  InMap(m) ──close / update("")──→ Unplaced Leave
//!  Unplaced ──close / update("")──→ Unplaced Idle
//! ```

/// Where a connection's player currently is.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Membership {
    #[default]
    Unplaced,
    InMap(String),
}

/// What a router has to do to move from one [`Membership`] to the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// First placement: insert and announce.
    Enter { to: String },
    /// Same map: replace the entry and broadcast the new state.
    Stay { map: String },
    /// Leave `from`, then enter `to`. Never both at once.
    Switch { from: String, to: String },
    /// Leave `from` entirely.
    Leave { from: String },
    /// Nothing to do.
    Idle,
}

impl Membership {
    /// Builds the state from a connection's recorded map id. `None` and the
    /// empty string both mean unplaced.
    pub fn from_recorded(map_id: Option<&str>) -> Self {
        match map_id {
            Some(m) if !m.is_empty() => Self::InMap(m.to_owned()),
            _ => Self::Unplaced,
        }
    }

    pub fn map_id(&self) -> Option<&str> {
        match self {
            Self::InMap(m) => Some(m),
            Self::Unplaced => None,
        }
    }

    /// Classifies an update whose payload names `target` as its map.
    pub fn update(&self, target: &str) -> Transition {
        match (self, target.is_empty()) {
            (Self::Unplaced, true) => Transition::Idle,
            (Self::Unplaced, false) => Transition::Enter {
                to: target.to_owned(),
            },
            (Self::InMap(from), true) => Transition::Leave { from: from.clone() },
            (Self::InMap(from), false) if from == target => Transition::Stay {
                map: from.clone(),
            },
            (Self::InMap(from), false) => Transition::Switch {
                from: from.clone(),
                to: target.to_owned(),
            },
        }
    }

    /// Classifies a connection close.
    pub fn close(&self) -> Transition {
        match self {
            Self::Unplaced => Transition::Idle,
            Self::InMap(from) => Transition::Leave { from: from.clone() },
        }
    }
}

impl Transition {
    /// The map being left, if any.
    pub fn leaving(&self) -> Option<&str> {
        match self {
            Self::Switch { from, .. } | Self::Leave { from } => Some(from),
            _ => None,
        }
    }

    /// The map being entered, if any. `Stay` doesn't count.
    pub fn entering(&self) -> Option<&str> {
        match self {
            Self::Enter { to } | Self::Switch { to, .. } => Some(to),
            _ => None,
        }
    }
}
