use crate::config::DiagnosticsConfig;
use faststr::FastStr;
use serde::Serialize;
use std::collections::BTreeMap;

const SET: &str = "Set";
const NOT_SET: &str = "Not Set";

/// Deployment sanity report. Reports presence only, never values or file
/// contents.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnvDiagnostics {
    pub env_file:          Option<FastStr>,
    pub env_file_contents: Option<&'static str>,
    pub secrets_dir:       Vec<FastStr>,
    #[serde(rename = "firebaseEnvVars")]
    pub env_vars:          BTreeMap<String, &'static str>,
    pub error:             Option<FastStr>,
}

pub async fn collect(config: &DiagnosticsConfig) -> EnvDiagnostics {
    // `Vars` is !Send, snapshot it before any await
    let vars: Vec<(String, String)> = std::env::vars().collect();
    collect_from(config, vars).await
}

pub async fn collect_from<I>(config: &DiagnosticsConfig, vars: I) -> EnvDiagnostics
where
    I: IntoIterator<Item = (String, String)> + Send,
    I::IntoIter: Send,
{
    let mut report = EnvDiagnostics {
        env_file: config.env_file.clone(),
        ..Default::default()
    };

    if let Some(path) = &config.env_file {
        match tokio::fs::read_to_string(path.as_str()).await {
            Ok(_) => report.env_file_contents = Some("File exists and is readable"),
            Err(e) => report.error = Some(format!("Error reading ENV_FILE: {e}").into()),
        }
    }

    match list_dir(&config.secrets_dir).await {
        Ok(entries) => report.secrets_dir = entries,
        Err(e) => {
            report.error = Some(format!("Error listing {}: {e}", config.secrets_dir).into());
        }
    }

    report.env_vars = vars
        .into_iter()
        .filter(|(key, _)| key.starts_with(config.env_prefix.as_str()))
        .map(|(key, value)| (key, if value.is_empty() { NOT_SET } else { SET }))
        .collect();

    report
}

async fn list_dir(dir: &str) -> std::io::Result<Vec<FastStr>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut names = vec![];
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned().into());
    }
    names.sort();
    Ok(names)
}
