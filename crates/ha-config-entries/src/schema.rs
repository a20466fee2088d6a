//! Form schemas for flow steps
//!
//! Serialized the way the frontend expects a `data_schema`: one object per
//! field, with either a plain `type` or a `selector`.

use ha_core::ConfigData;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One field of a flow form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<Selector>,
}

impl FormField {
    /// A required free-text field
    pub fn text(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: Some("string".to_string()),
            required: true,
            default: None,
            selector: None,
        }
    }

    /// A required field rendered by a selector
    pub fn select(name: impl Into<String>, config: SelectSelectorConfig) -> Self {
        Self {
            name: name.into(),
            field_type: None,
            required: true,
            default: None,
            selector: Some(Selector::Select(config)),
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Check one submitted value against this field
    fn check(&self, value: &Value) -> Result<(), String> {
        let Some(text) = value.as_str() else {
            return Err(format!("expected a string for {}", self.name));
        };

        match &self.selector {
            Some(Selector::Select(config))
                if !config.custom_value && !config.options.iter().any(|o| o.value == text) =>
            {
                Err(format!("value '{}' is not a valid option for {}", text, self.name))
            }
            _ => Ok(()),
        }
    }
}

/// Field selectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    Select(SelectSelectorConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectSelectorConfig {
    pub options: Vec<SelectOption>,
    #[serde(default)]
    pub mode: SelectSelectorMode,
    /// Accept values that are not in `options`
    #[serde(default)]
    pub custom_value: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

impl SelectOption {
    /// Option whose label is its value
    pub fn plain(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            label: value.clone(),
            value,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectSelectorMode {
    #[default]
    Dropdown,
    List,
}

/// Validate submitted input against a form schema
///
/// The input must be an object without unknown keys; defaults fill in
/// missing fields and required fields must end up present.
pub fn validate_input(schema: &[FormField], input: &Value) -> Result<ConfigData, String> {
    let Value::Object(submitted) = input else {
        return Err("expected an object".to_string());
    };

    if let Some(unknown) = submitted
        .keys()
        .find(|key| !schema.iter().any(|field| &field.name == *key))
    {
        return Err(format!("extra keys not allowed: {}", unknown));
    }

    let mut validated = ConfigData::new();
    for field in schema {
        match submitted.get(&field.name).or(field.default.as_ref()) {
            Some(value) => {
                field.check(value)?;
                validated.insert(field.name.clone(), value.clone());
            }
            None if field.required => return Err(format!("required key not provided: {}", field.name)),
            None => {}
        }
    }

    Ok(validated)
}
