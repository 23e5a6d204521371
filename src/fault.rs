use serde::{Deserialize, Serialize};

/// Independent degradation flags of one truck.
///
/// Faults are reported in telemetry only; they do not alter the physics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultFlags {
    pub electrical: bool,
    pub hydraulic: bool,
}

impl FaultFlags {
    /// Overwrites only the flags that are present.
    pub fn set(&mut self, electrical: Option<bool>, hydraulic: Option<bool>) {
        if let Some(value) = electrical {
            self.electrical = value;
        }
        if let Some(value) = hydraulic {
            self.hydraulic = value;
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Text encoding used on the scalar fault signal topics.
pub fn flag_text(flag: bool) -> &'static str {
    if flag {
        "1"
    } else {
        "0"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_set_leaves_other_flag() {
        let mut faults = FaultFlags::default();
        faults.set(Some(true), None);
        faults.set(None, Some(true));
        assert!(faults.electrical && faults.hydraulic);

        faults.set(Some(false), None);
        assert!(!faults.electrical);
        assert!(faults.hydraulic);
    }

    #[test]
    fn test_clear() {
        let mut faults = FaultFlags { electrical: true, hydraulic: true };
        faults.clear();
        assert_eq!(faults, FaultFlags::default());
    }

    #[test]
    fn test_flag_text() {
        assert_eq!(flag_text(true), "1");
        assert_eq!(flag_text(false), "0");
    }
}
