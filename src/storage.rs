use crate::errors::AppError;
use crate::models::AppData;
use std::{env, path::Path, path::PathBuf};
use tokio::fs;
use tracing::{error, info};

pub fn resolve_data_path() -> PathBuf {
    env::var("APP_DATA_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data/state.json"))
}

pub async fn load_data(path: &Path) -> AppData {
    match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice::<AppData>(&bytes) {
            Ok(data) => {
                info!(
                    path = %path.display(),
                    servers = data.servers.len(),
                    records = data.records.len(),
                    runs = data.runs.len(),
                    "loaded state file"
                );
                data
            }
            Err(err) => {
                error!("failed to parse data file: {err}");
                AppData::default()
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => AppData::default(),
        Err(err) => {
            error!("failed to read data file: {err}");
            AppData::default()
        }
    }
}

pub async fn persist_data(path: &Path, data: &AppData) -> Result<(), AppError> {
    let payload = serde_json::to_vec_pretty(data).map_err(AppError::internal)?;
    fs::write(path, payload).await.map_err(AppError::internal)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyticsSettings;

    fn temp_path(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        env::temp_dir().join(format!("multiplex_stats_{name}_{}_{nanos}.json", std::process::id()))
    }

    #[tokio::test]
    async fn missing_file_loads_defaults() {
        let data = load_data(&temp_path("missing")).await;
        assert!(data.records.is_empty());
        assert_eq!(data.settings, AnalyticsSettings::default());
    }

    #[tokio::test]
    async fn corrupt_file_loads_defaults() {
        let path = temp_path("corrupt");
        fs::write(&path, b"{ not json").await.unwrap();
        let data = load_data(&path).await;
        assert!(data.servers.is_empty());
        let _ = fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn persisted_settings_survive_reload() {
        let path = temp_path("persist");
        let mut data = AppData::default();
        data.settings.top_users = 5;
        persist_data(&path, &data).await.unwrap();

        let loaded = load_data(&path).await;
        assert_eq!(loaded.settings.top_users, 5);
        let _ = fs::remove_file(&path).await;
    }
}
