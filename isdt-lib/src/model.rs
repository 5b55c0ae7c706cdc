//! Known charger models and their per-model label tables.
//!
//! The mode/chemistry/dimension ids in metrics packets map to different
//! strings depending on the model. The labels are decorative; an id missing
//! from a table resolves to `"unknown"`, never an error.

use crate::error::IsdtError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum_macros::Display;

/// A charger model, or [`Model::Ignore`] to skip model-specific enrichment
/// (used while the model is not yet known, e.g. during identity discovery).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum Model {
    #[strum(to_string = "A4")]
    A4,
    #[strum(to_string = "C4")]
    C4,
    #[strum(to_string = "C4EVO")]
    C4Evo,
    #[strum(to_string = "Q8")]
    Q8,
    #[strum(to_string = "ignore")]
    Ignore,
}

impl FromStr for Model {
    type Err = IsdtError;

    /// Parse a model name as the device reports it. Anything outside the
    /// known set is a hard error; callers that want best-effort decoding for
    /// an unknown device pass [`Model::Ignore`] explicitly instead.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim_end_matches('\0').to_ascii_uppercase().as_str() {
            "A4" => Ok(Model::A4),
            "C4" => Ok(Model::C4),
            "C4EVO" | "C4 EVO" => Ok(Model::C4Evo),
            "Q8" => Ok(Model::Q8),
            "IGNORE" => Ok(Model::Ignore),
            _ => Err(IsdtError::UnsupportedModel(name.to_string())),
        }
    }
}

/// The two operating modes of the charger firmware. Some commands are only
/// valid in one of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum Mode {
    #[strum(to_string = "app")]
    App,
    #[strum(to_string = "bootloader")]
    Bootloader,
}

const UNKNOWN: &str = "unknown";

impl Model {
    /// Label for a charging-mode id from a metrics packet.
    pub fn mode_label(self, id: u8) -> &'static str {
        match self {
            Model::A4 | Model::C4 => classic_mode_label(id),
            Model::C4Evo => match id {
                13 => "activate",
                15 => "destroy",
                17 => "Cut off",
                _ => classic_mode_label(id),
            },
            Model::Q8 => match id {
                3 => "charging",
                _ => UNKNOWN,
            },
            Model::Ignore => UNKNOWN,
        }
    }

    /// Label for a battery-chemistry id from a metrics packet.
    pub fn chemistry_label(self, id: u8) -> &'static str {
        match self {
            // Chemistry id 4 was never observed on these two.
            Model::A4 | Model::C4 => match id {
                0 => "auto",
                1 => "LiHv",
                2 => "Li-Ion",
                3 => "LiPO4",
                5 => "NiZn",
                6 => "NiMH!!!", // !!! means overcharged
                7 => "Eneloop",
                8 => "NiCd",
                9 => "NiMH",
                _ => UNKNOWN,
            },
            Model::C4Evo => match id {
                0 => "LiHv",
                1 => "LiIon",
                2 => "LiFe",
                3 => "NiZn",
                4 => "NiMH",
                _ => UNKNOWN,
            },
            Model::Q8 => match id {
                9 => "LiIon",
                _ => UNKNOWN,
            },
            Model::Ignore => UNKNOWN,
        }
    }

    /// Label for a cell form-factor id from a metrics packet. The C4EVO and
    /// Q8 do not report dimensions.
    pub fn dimensions_label(self, id: u8) -> &'static str {
        match self {
            Model::A4 => match id {
                0 => "AA(A)",
                _ => UNKNOWN,
            },
            Model::C4 => match id {
                0 => "AAA",
                1 => "AA",
                2 => "18650",
                3 => "26650",
                4 => "empty",
                _ => UNKNOWN,
            },
            Model::C4Evo | Model::Q8 | Model::Ignore => UNKNOWN,
        }
    }
}

fn classic_mode_label(id: u8) -> &'static str {
    match id {
        0 => "idling",
        1 => "waiting",
        2 => "reversed",
        3 => "charging",
        4 => "charged",
        5 => "discharging",
        6 => "discharged",
        7 => "storage",
        8 => "storage done",
        // Also reported while activating Ni cells.
        9 => "cycling",
        10 => "cycling done",
        11 => "analysis",
        12 => "analysis done",
        _ => UNKNOWN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_names_round_trip() {
        for model in [Model::A4, Model::C4, Model::C4Evo, Model::Q8] {
            assert_eq!(model.to_string().parse::<Model>().unwrap(), model);
        }
    }

    #[test]
    fn nul_padded_device_names_parse() {
        assert_eq!("C4\0\0\0\0".parse::<Model>().unwrap(), Model::C4);
    }

    #[test]
    fn unknown_model_is_an_error() {
        assert!(matches!(
            "P30".parse::<Model>(),
            Err(IsdtError::UnsupportedModel(_))
        ));
    }

    #[test]
    fn absent_table_entries_resolve_to_unknown() {
        assert_eq!(Model::Q8.mode_label(0), "unknown");
        assert_eq!(Model::C4Evo.dimensions_label(0), "unknown");
        assert_eq!(Model::Ignore.chemistry_label(9), "unknown");
    }

    #[test]
    fn evo_extends_the_classic_mode_table() {
        assert_eq!(Model::C4Evo.mode_label(3), "charging");
        assert_eq!(Model::C4Evo.mode_label(13), "activate");
        assert_eq!(Model::C4Evo.mode_label(15), "destroy");
        assert_eq!(Model::C4Evo.mode_label(17), "Cut off");
        assert_eq!(Model::C4.mode_label(13), "unknown");
    }
}
