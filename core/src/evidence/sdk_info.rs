//! SDK metadata attached to every evidence bundle as `sdk_info`

use serde::{Deserialize, Serialize};

/// SDK flavour embedding this client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SdkType {
    #[default]
    Native,
    Flutter,
    ReactNative,
}

impl SdkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdkType::Native => "native",
            SdkType::Flutter => "flutter",
            SdkType::ReactNative => "react-native",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdkInfo {
    pub sdk_version: String,
    pub sdk_name: String,
    pub sdk_type: SdkType,
}

impl SdkInfo {
    pub fn new(sdk_type: SdkType) -> Self {
        Self {
            sdk_version: env!("CARGO_PKG_VERSION").to_string(),
            sdk_name: "rust".to_string(),
            sdk_type,
        }
    }
}

impl Default for SdkInfo {
    fn default() -> Self {
        Self::new(SdkType::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let info = SdkInfo::new(SdkType::ReactNative);
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["sdk_type"], json!("react-native"));
        assert_eq!(value["sdk_name"], json!("rust"));
        assert_eq!(value["sdk_version"], json!(env!("CARGO_PKG_VERSION")));
    }
}
