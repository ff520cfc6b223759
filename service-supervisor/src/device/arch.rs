use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Resolved architecture of a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Architecture {
    pub tag: String,
    pub priority: i32,
}

/// Config-file form of one vendor device id mapping.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ArchEntry {
    pub device_id: u32,
    pub arch: String,
    pub priority: i32,
}

// (architecture, priority, vendor device ids)
const BUILTIN: &[(&str, i32, &[u32])] = &[
    ("bmg", 4, &[0xE20B, 0xE20C]),
    (
        "acm",
        3,
        &[0x56A0, 0x56A1, 0x56A2, 0x56A5, 0x56A6, 0x5690, 0x5691, 0x5692],
    ),
    ("arl_h", 2, &[0x7D51, 0x7DD1]),
    ("lnl", 1, &[0x6420, 0x64A0, 0x64B0]),
    ("mtl", 0, &[0x7D40, 0x7D45, 0x7D55, 0x7DD5]),
];

/// Maps vendor device ids to architecture tags and their ranking.
///
/// Device ids missing from the table resolve to `None` ("unknown").
#[derive(Debug, Clone, Default)]
pub struct ArchTable {
    by_device_id: HashMap<u32, Architecture>,
}

impl ArchTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut table = Self::empty();
        for (tag, priority, ids) in BUILTIN {
            for id in *ids {
                table.insert(*id, tag, *priority);
            }
        }
        table
    }

    /// Built-in table with `entries` layered on top (entries win).
    pub fn with_overrides(entries: &[ArchEntry]) -> Self {
        let mut table = Self::builtin();
        for entry in entries {
            table.insert(entry.device_id, &entry.arch, entry.priority);
        }
        table
    }

    pub fn insert(&mut self, device_id: u32, tag: &str, priority: i32) {
        self.by_device_id.insert(
            device_id,
            Architecture {
                tag: tag.to_string(),
                priority,
            },
        );
    }

    pub fn resolve(&self, device_id: u32) -> Option<&Architecture> {
        self.by_device_id.get(&device_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_ranking() {
        let table = ArchTable::builtin();
        let bmg = table.resolve(0xE20B).unwrap();
        let mtl = table.resolve(0x7D55).unwrap();
        assert_eq!(bmg.tag, "bmg");
        assert_eq!(mtl.tag, "mtl");
        assert!(bmg.priority > mtl.priority);
        assert!(table.resolve(0x1234).is_none());
    }

    #[test]
    fn test_overrides_replace_and_extend() {
        let table = ArchTable::with_overrides(&[
            ArchEntry {
                device_id: 0x7D55,
                arch: "mtl".into(),
                priority: 9,
            },
            ArchEntry {
                device_id: 0xBEEF,
                arch: "lab".into(),
                priority: 1,
            },
        ]);
        assert_eq!(table.resolve(0x7D55).unwrap().priority, 9);
        assert_eq!(table.resolve(0xBEEF).unwrap().tag, "lab");
        assert_eq!(table.resolve(0xE20B).unwrap().tag, "bmg");
    }
}
