use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SearchError;
use crate::record::TopoSpec;

// ---------------------------------------------------------------------------
// Communication — how replicas of a group synchronize
// ---------------------------------------------------------------------------

/// Synchronization mode for one op-group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Communication {
    /// Parameter server.
    Ps = 0,
    /// Collective all-reduce.
    Nccl = 1,
    /// Model partitioned: no replication, no batch split.
    Mp = 2,
}

impl Communication {
    pub const ALL: [Communication; 3] = [Communication::Ps, Communication::Nccl, Communication::Mp];

    pub fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<u8> for Communication {
    type Error = SearchError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Ps),
            1 => Ok(Self::Nccl),
            2 => Ok(Self::Mp),
            other => Err(SearchError::UnknownCommunication(other)),
        }
    }
}

impl fmt::Display for Communication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ps => "PS",
            Self::Nccl => "NCCL",
            Self::Mp => "MP",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Action — one decision for one group
// ---------------------------------------------------------------------------

/// Which tasks host a group, and how its replicas synchronize.
///
/// Immutable once built. The placement always selects at least one task.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawAction")]
pub struct Action {
    placement: Vec<bool>,
    communication: Communication,
}

/// Unchecked wire form; deserialization goes through `Action::new`.
#[derive(Deserialize)]
struct RawAction {
    placement: Vec<bool>,
    communication: Communication,
}

impl TryFrom<RawAction> for Action {
    type Error = SearchError;

    fn try_from(raw: RawAction) -> Result<Self, Self::Error> {
        Self::new(raw.placement, raw.communication)
    }
}

impl Action {
    pub fn new(placement: Vec<bool>, communication: Communication) -> Result<Self, SearchError> {
        if !placement.iter().any(|&p| p) {
            return Err(SearchError::EmptyPlacement);
        }
        Ok(Self {
            placement,
            communication,
        })
    }

    /// Every task selected. Used for the baseline strategies.
    pub fn all_tasks(n_tasks: usize, communication: Communication) -> Result<Self, SearchError> {
        Self::new(vec![true; n_tasks], communication)
    }

    /// Caller guarantees a non-empty placement.
    pub(crate) fn from_parts(placement: Vec<bool>, communication: Communication) -> Self {
        debug_assert!(placement.iter().any(|&p| p), "from_parts: empty placement");
        Self {
            placement,
            communication,
        }
    }

    pub fn placement(&self) -> &[bool] {
        &self.placement
    }

    pub fn communication(&self) -> Communication {
        self.communication
    }

    pub fn n_tasks(&self) -> usize {
        self.placement.len()
    }

    /// Indices of the selected tasks.
    pub fn selected_tasks(&self) -> impl Iterator<Item = usize> + '_ {
        self.placement
            .iter()
            .enumerate()
            .filter_map(|(i, &on)| on.then_some(i))
    }

    /// Total devices across the selected tasks.
    pub fn device_count(&self, topology: &TopoSpec) -> u64 {
        topology.device_count(&self.placement)
    }

    /// Encoding consumed by learned priors: a 0/1 placement column and a
    /// one-hot communication row.
    pub fn to_mask(&self) -> (Vec<f32>, [f32; 3]) {
        let placement = self
            .placement
            .iter()
            .map(|&on| if on { 1.0 } else { 0.0 })
            .collect();
        let mut communication = [0.0f32; 3];
        communication[self.communication.index()] = 1.0;
        (placement, communication)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for &on in &self.placement {
            f.write_str(if on { "1" } else { "0" })?;
        }
        write!(f, "]/{}", self.communication)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util;

    #[test]
    fn empty_placement_rejected() {
        let err = Action::new(vec![false, false], Communication::Ps).unwrap_err();
        assert!(matches!(err, SearchError::EmptyPlacement));

        let err = Action::new(Vec::new(), Communication::Nccl).unwrap_err();
        assert!(matches!(err, SearchError::EmptyPlacement));
    }

    #[test]
    fn all_tasks_selects_everything() {
        let action = Action::all_tasks(3, Communication::Nccl).unwrap();
        assert_eq!(action.placement(), &[true, true, true]);
        assert_eq!(action.communication(), Communication::Nccl);
        assert_eq!(action.selected_tasks().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn communication_from_u8() {
        assert_eq!(Communication::try_from(0).unwrap(), Communication::Ps);
        assert_eq!(Communication::try_from(1).unwrap(), Communication::Nccl);
        assert_eq!(Communication::try_from(2).unwrap(), Communication::Mp);
        assert!(matches!(
            Communication::try_from(3),
            Err(SearchError::UnknownCommunication(3))
        ));
    }

    #[test]
    fn mask_encoding() {
        let action = Action::new(vec![true, false, true], Communication::Mp).unwrap();
        let (placement, communication) = action.to_mask();
        assert_eq!(placement, vec![1.0, 0.0, 1.0]);
        assert_eq!(communication, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn device_count_sums_selected_tasks() {
        let record = test_util::record_with_devices(&[2, 2, 4], 3);
        let action = Action::new(vec![true, false, true], Communication::Nccl).unwrap();
        assert_eq!(action.device_count(&record.topology), 6);

        let single = Action::new(vec![false, true, false], Communication::Ps).unwrap();
        assert_eq!(single.device_count(&record.topology), 2);
    }

    #[test]
    fn display_format() {
        let action = Action::new(vec![true, false], Communication::Nccl).unwrap();
        assert_eq!(action.to_string(), "[10]/NCCL");
    }

    #[test]
    fn serde_uses_variant_names() {
        let action = Action::new(vec![false, true], Communication::Ps).unwrap();
        let json = serde_json::to_string(&action).unwrap();
        assert_eq!(json, r#"{"placement":[false,true],"communication":"Ps"}"#);
        let back: Action = serde_json::from_str(&json).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn serde_rejects_empty_placement() {
        let json = r#"{"placement":[false,false],"communication":"Nccl"}"#;
        assert!(serde_json::from_str::<Action>(json).is_err());
    }
}
