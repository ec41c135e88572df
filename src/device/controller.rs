use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::serial::protocol::{MAX_BUTTON_CODE, MIN_BUTTON_CODE};
use crate::serial::{BromicCommand, BromicProtocol, Result};

/// Dimmer "Off" code; outside the normal button range, so it goes out as a bench frame
pub const OFF_BUTTON_CODE: u16 = 8;

/// Kind of receiver paired to a target id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControllerType {
    #[serde(rename = "onoff")]
    OnOff,
    #[serde(rename = "dimmer")]
    Dimmer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ButtonFunction {
    TurnOn,
    TurnOff,
    SetBrightness(u8),
    DimUp,
    DimDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ButtonSpec {
    pub code: u16,
    pub name: &'static str,
    pub function: ButtonFunction,
}

pub const ONOFF_BUTTONS: &[ButtonSpec] = &[
    ButtonSpec { code: 1, name: "ON", function: ButtonFunction::TurnOn },
    ButtonSpec { code: 2, name: "OFF", function: ButtonFunction::TurnOff },
];

pub const DIMMER_BUTTONS: &[ButtonSpec] = &[
    ButtonSpec { code: 1, name: "100%", function: ButtonFunction::SetBrightness(100) },
    ButtonSpec { code: 2, name: "75%", function: ButtonFunction::SetBrightness(75) },
    ButtonSpec { code: 3, name: "50%", function: ButtonFunction::SetBrightness(50) },
    ButtonSpec { code: 4, name: "25%", function: ButtonFunction::SetBrightness(25) },
    ButtonSpec { code: 5, name: "Dim Up", function: ButtonFunction::DimUp },
    ButtonSpec { code: 6, name: "Dim Down", function: ButtonFunction::DimDown },
    ButtonSpec { code: OFF_BUTTON_CODE, name: "Off", function: ButtonFunction::TurnOff },
];

/// Order in which buttons are taught to a new controller (Off last)
pub const BUTTON_SEQUENCE_ONOFF: &[u16] = &[1, 2];
pub const BUTTON_SEQUENCE_DIMMER: &[u16] = &[1, 2, 3, 4, 5, 6, OFF_BUTTON_CODE];

/// A discrete dimmer power level on a 0-255 brightness scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BrightnessLevel {
    pub brightness: u8,
    pub button: u16,
    pub name: &'static str,
}

pub const BRIGHTNESS_LEVELS: &[BrightnessLevel] = &[
    BrightnessLevel { brightness: 0, button: OFF_BUTTON_CODE, name: "off" },
    BrightnessLevel { brightness: 64, button: 4, name: "25" },
    BrightnessLevel { brightness: 128, button: 3, name: "50" },
    BrightnessLevel { brightness: 191, button: 2, name: "75" },
    BrightnessLevel { brightness: 255, button: 1, name: "100" },
];

impl ControllerType {
    pub fn buttons(&self) -> &'static [ButtonSpec] {
        match self {
            ControllerType::OnOff => ONOFF_BUTTONS,
            ControllerType::Dimmer => DIMMER_BUTTONS,
        }
    }

    pub fn button(&self, code: u16) -> Option<&'static ButtonSpec> {
        self.buttons().iter().find(|b| b.code == code)
    }

    pub fn learning_sequence(&self) -> &'static [u16] {
        match self {
            ControllerType::OnOff => BUTTON_SEQUENCE_ONOFF,
            ControllerType::Dimmer => BUTTON_SEQUENCE_DIMMER,
        }
    }

    /// Buttons that must be learned before the controller is usable
    pub fn required_buttons(&self) -> &'static [u16] {
        match self {
            ControllerType::OnOff => &[1, 2],
            ControllerType::Dimmer => &[1, 2, 3, 4, OFF_BUTTON_CODE],
        }
    }
}

/// Build the frame for `code` on target `id_location`
pub fn command_for(id_location: u16, code: u16) -> Result<BromicCommand> {
    if (MIN_BUTTON_CODE..=MAX_BUTTON_CODE).contains(&code) {
        BromicProtocol::encode_command(id_location, code)
    } else {
        BromicProtocol::encode_bench(id_location, code)
    }
}

/// A paired controller as kept in the host's options blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerEntry {
    pub controller_type: ControllerType,
    #[serde(default)]
    pub learned_buttons: BTreeMap<u16, bool>,
}

impl ControllerEntry {
    pub fn new(controller_type: ControllerType) -> Self {
        Self {
            controller_type,
            learned_buttons: BTreeMap::new(),
        }
    }

    pub fn is_learned(&self, code: u16) -> bool {
        self.learned_buttons.get(&code).copied().unwrap_or(false)
    }

    pub fn learned_count(&self) -> usize {
        self.learned_buttons.values().filter(|learned| **learned).count()
    }

    pub fn is_complete(&self) -> bool {
        self.controller_type
            .required_buttons()
            .iter()
            .all(|code| self.is_learned(*code))
    }

    /// Discrete level to use for a requested brightness.
    ///
    /// Zero means off and needs the Off button learned. Anything else picks the closest
    /// level whose button is learned, the lower one on a tie.
    pub fn closest_learned_level(&self, brightness: u8) -> Option<&'static BrightnessLevel> {
        if brightness == 0 {
            return BRIGHTNESS_LEVELS
                .iter()
                .find(|level| level.brightness == 0 && self.is_learned(level.button));
        }

        BRIGHTNESS_LEVELS
            .iter()
            .filter(|level| level.brightness > 0 && self.is_learned(level.button))
            .min_by_key(|level| (level.brightness as i16 - brightness as i16).abs())
    }

    /// Frame that puts a dimmer at the closest learned level to `brightness`
    pub fn brightness_command(&self, id_location: u16, brightness: u8) -> Option<Result<BromicCommand>> {
        if self.controller_type != ControllerType::Dimmer {
            return None;
        }
        let level = self.closest_learned_level(brightness)?;
        Some(command_for(id_location, level.button))
    }
}
