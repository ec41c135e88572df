use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ConfigError;
use crate::device::controller::{ControllerEntry, ControllerType};

/// The host platform's options blob for one bridge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubOptions {
    pub serial_port: Option<String>,
    #[serde(default)]
    pub controllers: BTreeMap<u16, ControllerEntry>,
}

impl HubOptions {
    /// Load from stored JSON.
    ///
    /// Stored maps carry their integer keys as strings. Keys that do not parse as
    /// integers are skipped with a warning rather than failing the whole blob.
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let object = value
            .as_object()
            .ok_or_else(|| ConfigError::Invalid("options must be a JSON object".to_string()))?;

        let serial_port = match object.get("serial_port") {
            None | Some(Value::Null) => None,
            Some(Value::String(port)) => Some(port.clone()),
            Some(other) => {
                return Err(ConfigError::Invalid(format!(
                    "serial_port must be a string, got {}",
                    other
                )))
            }
        };

        let mut controllers = BTreeMap::new();
        if let Some(stored) = object.get("controllers").and_then(Value::as_object) {
            for (key, info) in stored {
                let Ok(id_location) = key.parse::<u16>() else {
                    log::warn!("Skipping controller with non-numeric id {:?}", key);
                    continue;
                };
                controllers.insert(id_location, parse_controller(info)?);
            }
        }

        Ok(Self {
            serial_port,
            controllers,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(&value)
    }

    pub fn to_value(&self) -> Result<Value, ConfigError> {
        Ok(serde_json::to_value(self)?)
    }
}

fn parse_controller(info: &Value) -> Result<ControllerEntry, ConfigError> {
    let controller_type: ControllerType = info
        .get("controller_type")
        .cloned()
        .map(serde_json::from_value)
        .transpose()?
        .ok_or_else(|| ConfigError::Invalid("controller_type is required".to_string()))?;

    let mut entry = ControllerEntry::new(controller_type);
    if let Some(learned) = info.get("learned_buttons").and_then(Value::as_object) {
        for (key, flag) in learned {
            match key.parse::<u16>() {
                Ok(code) => {
                    entry.learned_buttons.insert(code, flag.as_bool().unwrap_or(false));
                }
                Err(_) => log::warn!("Skipping learned button with non-numeric code {:?}", key),
            }
        }
    }
    Ok(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalizes_string_keys() {
        let value = json!({
            "serial_port": "/dev/ttyUSB0",
            "controllers": {
                "5": {
                    "controller_type": "dimmer",
                    "learned_buttons": {"1": true, "8": true, "3": false, "x": true}
                },
                "bogus": {"controller_type": "onoff"}
            }
        });

        let options = HubOptions::from_value(&value).unwrap();
        assert_eq!(options.serial_port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(options.controllers.len(), 1);

        let dimmer = &options.controllers[&5];
        assert_eq!(dimmer.controller_type, ControllerType::Dimmer);
        assert!(dimmer.is_learned(1));
        assert!(dimmer.is_learned(8));
        assert!(!dimmer.is_learned(3));
        assert_eq!(dimmer.learned_buttons.len(), 3);
    }

    #[test]
    fn test_roundtrip_through_json() {
        let json = r#"{"serial_port":"COM3","controllers":{"2":{"controller_type":"onoff","learned_buttons":{"1":true,"2":true}}}}"#;
        let options = HubOptions::from_json(json).unwrap();
        let reloaded = HubOptions::from_value(&options.to_value().unwrap()).unwrap();
        assert_eq!(options, reloaded);
        assert!(reloaded.controllers[&2].is_complete());
    }

    #[test]
    fn test_rejects_bad_shapes() {
        assert!(HubOptions::from_value(&json!([1, 2])).is_err());
        assert!(HubOptions::from_value(&json!({"serial_port": 5})).is_err());
        assert!(HubOptions::from_value(&json!({"controllers": {"1": {}}})).is_err());
        assert!(HubOptions::from_value(&json!({"controllers": {"1": {"controller_type": "toaster"}}})).is_err());
        assert_eq!(HubOptions::from_value(&json!({})).unwrap(), HubOptions::default());
    }
}
