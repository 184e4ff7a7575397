use uuid::Uuid;

/// Workspace context every embed operation runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbedSettings {
    pub workspace_id: Uuid,
    /// Used when a report request names no report.
    pub default_report_id: Uuid,
}

/// Result of checking the configured workspace and report ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSettings {
    pub settings: EmbedSettings,
    /// First problem found, if any. When set, `settings` holds nil ids.
    pub error: Option<String>,
}

impl ValidatedSettings {
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }
}

/// Check the raw configured ids. The first failing rule wins.
pub fn validate(workspace_id: Option<&str>, report_id: Option<&str>) -> ValidatedSettings {
    match (
        parse_id("Workspace ID", "workspace_id", workspace_id),
        parse_id("Report ID", "report_id", report_id),
    ) {
        (Ok(workspace_id), Ok(default_report_id)) => ValidatedSettings {
            settings: EmbedSettings {
                workspace_id,
                default_report_id,
            },
            error: None,
        },
        (Err(e), _) | (_, Err(e)) => ValidatedSettings {
            settings: EmbedSettings {
                workspace_id: Uuid::nil(),
                default_report_id: Uuid::nil(),
            },
            error: Some(e),
        },
    }
}

fn parse_id(label: &str, key: &str, raw: Option<&str>) -> Result<Uuid, String> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(format!(
            "{label} is not set. Set {key} to the GUID of the Power BI {} to embed from.",
            if key == "workspace_id" { "workspace" } else { "report" }
        ));
    }

    match Uuid::parse_str(raw) {
        Ok(id) if !id.is_nil() => Ok(id),
        _ => Err(format!(
            "{label} must be a valid GUID. Check the value of {key} (got '{raw}')."
        )),
    }
}
