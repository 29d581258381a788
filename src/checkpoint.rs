use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{DataType, DatasetId, ReadTopology};
use crate::error::YamasError;
use crate::fs_util;
use crate::qiita::QiitaInputs;
use crate::stage::Stage;

/// Persisted snapshot of a run. Read once when resuming, written after each stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointRecord {
    pub dataset_id: DatasetId,
    pub workspace_root: Utf8PathBuf,
    pub data_type: DataType,
    pub has_forward: bool,
    pub has_reverse: bool,
    #[serde(default)]
    pub completed_stages: Vec<Stage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qiita: Option<QiitaInputs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl CheckpointRecord {
    pub fn new(
        dataset_id: DatasetId,
        data_type: DataType,
        topology: &ReadTopology,
        completed_stages: Vec<Stage>,
    ) -> Self {
        Self {
            dataset_id,
            workspace_root: topology.root_directory().to_path_buf(),
            data_type,
            has_forward: topology.has_forward(),
            has_reverse: topology.has_reverse(),
            completed_stages,
            qiita: None,
            updated_at: None,
        }
    }

    /// Topology rooted at `root`, which wins over the recorded root when a workspace was moved.
    pub fn topology(&self, root: &Utf8Path) -> Result<ReadTopology, YamasError> {
        ReadTopology::from_flags(root, self.has_forward, self.has_reverse)
    }

    pub fn is_completed(&self, stage: Stage) -> bool {
        self.completed_stages.contains(&stage)
    }

    pub fn write(&mut self, path: &Utf8Path) -> Result<(), YamasError> {
        self.updated_at = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
        let content = serde_json::to_vec_pretty(self)
            .map_err(|err| YamasError::Storage(err.to_string()))?;
        fs_util::write_atomic(path, &content)?;
        tracing::debug!(
            checkpoint = %path,
            completed = ?self.completed_stages,
            "checkpoint written"
        );
        Ok(())
    }

    pub fn read(path: &Utf8Path) -> Result<Self, YamasError> {
        let content = match fs::read_to_string(path.as_std_path()) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(YamasError::Resumption(format!(
                    "no checkpoint at {path}; use --from-reads to re-derive it from converted reads"
                )));
            }
            Err(err) => {
                return Err(YamasError::Resumption(format!(
                    "unreadable checkpoint {path}: {err}"
                )));
            }
        };
        serde_json::from_str(&content)
            .map_err(|err| YamasError::Resumption(format!("invalid checkpoint {path}: {err}")))
    }

    /// Rejects a record written for another dataset or data type.
    pub fn validate(&self, dataset: &DatasetId, data_type: DataType) -> Result<(), YamasError> {
        if &self.dataset_id != dataset {
            return Err(YamasError::Resumption(format!(
                "checkpoint belongs to dataset {}, not {dataset}",
                self.dataset_id
            )));
        }
        if self.data_type != data_type {
            return Err(YamasError::Resumption(format!(
                "checkpoint records data type {}, but {data_type} was requested",
                self.data_type
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn minimal_record_without_stage_list_parses() {
        let json = r#"{
            "datasetId": "PRJNA1",
            "workspaceRoot": "/data/PRJNA1",
            "dataType": "18S",
            "hasForward": true,
            "hasReverse": false
        }"#;
        let record: CheckpointRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.data_type, DataType::Amplicon18S);
        assert!(record.completed_stages.is_empty());
    }

    #[test]
    fn unknown_data_type_is_rejected() {
        let json = r#"{
            "datasetId": "PRJNA1",
            "workspaceRoot": "/data/PRJNA1",
            "dataType": "ITS",
            "hasForward": true,
            "hasReverse": false
        }"#;
        assert!(serde_json::from_str::<CheckpointRecord>(json).is_err());
    }

    #[test]
    fn validate_checks_data_type() {
        let topology = ReadTopology::new("/data/PRJNA1", true);
        let id: DatasetId = "PRJNA1".parse().unwrap();
        let record = CheckpointRecord::new(id.clone(), DataType::Shotgun, &topology, Vec::new());
        assert!(record.validate(&id, DataType::Shotgun).is_ok());
        assert_matches!(
            record.validate(&id, DataType::Amplicon16S),
            Err(YamasError::Resumption(_))
        );
    }
}
