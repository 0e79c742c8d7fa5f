//! Backend environments

use crate::error::VerisoulError;
use serde::{Deserialize, Serialize};

/// Backend environment a client talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Staging,
    Sandbox,
    #[default]
    Prod,
}

impl Environment {
    pub const ALL: [Environment; 4] = [
        Environment::Dev,
        Environment::Staging,
        Environment::Sandbox,
        Environment::Prod,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Staging => "staging",
            Environment::Sandbox => "sandbox",
            Environment::Prod => "prod",
        }
    }

    /// Base URL of the ingest service
    pub fn ingest_base_url(&self) -> String {
        format!("https://ingest.{}.verisoul.ai", self.as_str())
    }

    /// Base URL serving the session handshake page
    pub fn webview_base_url(&self) -> String {
        format!("https://js.{}.verisoul.ai", self.as_str())
    }
}

impl std::str::FromStr for Environment {
    type Err = VerisoulError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Environment::Dev),
            "staging" => Ok(Environment::Staging),
            "sandbox" => Ok(Environment::Sandbox),
            "prod" => Ok(Environment::Prod),
            _ => Err(VerisoulError::InvalidEnvironment {
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
