use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Stage {
    #[default]
    Local,
    Development,
    Production,
}

impl Stage {
    /// Local and development stages also run the accelerated billing trigger.
    pub fn runs_accelerated_billing(self) -> bool {
        matches!(self, Stage::Local | Stage::Development)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let stage = match self {
            Stage::Local => "local",
            Stage::Development => "development",
            Stage::Production => "production",
        };

        write!(f, "{}", stage)
    }
}

impl TryFrom<&str> for Stage {
    type Error = anyhow::Error;

    fn try_from(stage: &str) -> Result<Self, Self::Error> {
        match stage.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Stage::Local),
            "development" | "dev" => Ok(Stage::Development),
            "production" | "prod" => Ok(Stage::Production),
            other => Err(anyhow::anyhow!("invalid stage: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_stages() {
        assert_eq!(Stage::try_from("Production").unwrap(), Stage::Production);
        assert_eq!(Stage::try_from(" dev ").unwrap(), Stage::Development);
        assert!(Stage::try_from("staging").is_err());
    }

    #[test]
    fn accelerated_billing_stays_out_of_production() {
        assert!(Stage::Local.runs_accelerated_billing());
        assert!(Stage::Development.runs_accelerated_billing());
        assert!(!Stage::Production.runs_accelerated_billing());
    }
}
