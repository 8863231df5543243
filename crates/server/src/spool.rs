//! Spool-directory exposure source.
//!
//! The ingest side drops raw frames under `<spool>/<night>/<file>.fits`; each
//! poll reports every frame lexicographically beyond the cursor, so the
//! cursor doubles as a restart-safe high-water mark.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use nightwatch_core::{Exposure, ExposureSource, NewExposures, SourceError};

pub struct SpoolDirectorySource {
    root: PathBuf,
}

impl SpoolDirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn scan(&self) -> Result<Vec<Exposure>, SourceError> {
        let unavailable = |e: std::io::Error| SourceError::Unavailable(e.to_string());

        let mut exposures = Vec::new();
        let mut nights = tokio::fs::read_dir(&self.root).await.map_err(unavailable)?;
        while let Some(night_entry) = nights.next_entry().await.map_err(unavailable)? {
            if !night_entry.file_type().await.map_err(unavailable)?.is_dir() {
                continue;
            }
            let night = night_entry.file_name().to_string_lossy().into_owned();
            let mut files = tokio::fs::read_dir(night_entry.path())
                .await
                .map_err(unavailable)?;
            while let Some(file_entry) = files.next_entry().await.map_err(unavailable)? {
                let name = file_entry.file_name().to_string_lossy().into_owned();
                if !name.ends_with(".fits") {
                    continue;
                }
                exposures.push(Exposure::new(night.clone(), name));
            }
        }
        // Directory iteration order is unspecified; the cursor needs a total
        // order.
        exposures.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
        Ok(exposures)
    }
}

#[async_trait]
impl ExposureSource for SpoolDirectorySource {
    async fn get_new_exposures(&self, cursor: Option<&str>) -> Result<NewExposures, SourceError> {
        let all = self.scan().await?;
        let exposures: Vec<Exposure> = match cursor {
            Some(cursor) => all
                .into_iter()
                .filter(|e| e.to_string().as_str() > cursor)
                .collect(),
            None => all,
        };
        let next_cursor = exposures
            .last()
            .map(|e| e.to_string())
            .or_else(|| cursor.map(str::to_string));
        debug!(
            "Spool scan found {} exposures beyond {:?}",
            exposures.len(),
            cursor
        );
        Ok(NewExposures {
            exposures,
            cursor: next_cursor,
        })
    }
}
